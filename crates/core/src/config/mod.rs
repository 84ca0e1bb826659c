//! Typed, file-backed configuration.
//!
//! The document is persisted as XML with fixed top-level sections; every
//! leaf keeps its declared scalar type across save/load round-trips.

mod store;
mod value;
mod xml;

pub use store::{ConfigEvent, ConfigStore};
pub use value::{ConfigDocument, ConfigSection, ConfigValue};
