//! Paths, segments, and the predicted/simulated cost comparison model.

mod comparison;
mod model;

pub use comparison::{
    format_cost, format_emissions, format_percent_difference, format_risk, percent_difference,
    PathComparisonModel, PathData, PathModelEvent, NOT_SIMULATED,
};
pub use model::{CostMetrics, Path, Segment, Terminal, TransportationMode};
