//! Regions and the registry that owns them.

mod registry;

#[allow(clippy::module_inception)]
mod region;

pub use region::Region;
pub use registry::{RegionEvent, RegionRegistry};
