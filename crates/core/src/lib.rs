#![warn(clippy::all, missing_docs)]

//! Core orchestration logic for multi-modal freight simulation.
//!
//! This crate hosts the region and network registries, vehicle
//! collections, the simulation configuration store, the per-mode
//! engine clients with their worker contexts, the orchestration
//! controller, and the path comparison model used by any frontend.

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod logger;
pub mod network;
pub mod path;
pub mod region;
pub mod simulation;
pub mod vehicle;

pub use config::{ConfigStore, ConfigValue};
pub use controller::{ControllerEvent, SimulationOrchestrator};
pub use error::{CoreError, CoreResult};
pub use logger::{ClientKind, LoggerSink, Severity};
pub use path::{Path, PathComparisonModel, TransportationMode};
pub use region::{Region, RegionRegistry};
pub use simulation::{SimulationJob, SimulationKind};
pub use vehicle::{Ship, ShipRegistry, Train, TrainRegistry};
