//! Ship and train definitions and the registries that index them.

mod models;
mod registry;

pub use models::{Ship, Train, Vehicle};
pub use registry::{ShipRegistry, TrainRegistry, VehicleEvent, VehicleRegistry};
