//! Per-mode simulation clients and their cooperative worker contexts.
//!
//! Each external simulation engine gets one client living on its own worker
//! task; requests are serialized through the task's inbox so blocking I/O
//! against an engine never stalls the GUI context.

mod client;
mod job;
mod process;
mod ship;
mod terminal;
mod train;
mod truck;

pub use client::{
    ClientContext, ClientEvent, ClientHandle, ClientRequest, ClientState, SimulationKind,
    SimulatorClient,
};
pub use job::{JobOutcome, SimulationJob};
pub use process::SimulatorProcess;
pub use ship::ShipSimulationClient;
pub use terminal::TerminalSimulationClient;
pub use train::TrainSimulationClient;
pub use truck::{TruckSimulationClient, TruckSimulationManager};
