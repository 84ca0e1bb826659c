//! Error taxonomy surfaced by the registries and the configuration store.
//!
//! The simulation worker layer keeps using `anyhow` for external-process
//! failures; everything a registry caller can act on is a `CoreError`.

use thiserror::Error;

/// Errors returned by the orchestration core's registries and stores.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A network name already exists within the region (train and truck
    /// names share one namespace per region).
    #[error("network name '{name}' already exists in region '{region}'")]
    NameConflict {
        /// Region in which the conflict occurred.
        region: String,
        /// The conflicting network name.
        name: String,
    },

    /// The network controller refused to register a network under the
    /// given key.
    #[error("failed to register network '{name}' under region '{region}'")]
    NetworkRegistration {
        /// Region the registration targeted.
        region: String,
        /// Name the registration targeted.
        name: String,
    },

    /// An invariant-restoring rollback failed; the registry can no longer
    /// guarantee a consistent state. Surfaced, never swallowed.
    #[error("unrecoverable registry state: {0}")]
    CriticalState(String),

    /// The configuration document on disk is malformed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Reading or writing the configuration document failed.
    #[error("configuration I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// The named region does not exist.
    #[error("region '{0}' not found")]
    RegionNotFound(String),

    /// Lookup by user-facing identifier failed.
    #[error("unknown {kind} id '{id}'")]
    UnknownId {
        /// What sort of object was looked up (e.g. `"ship"`).
        kind: &'static str,
        /// The identifier that missed.
        id: String,
    },

    /// A path violated its construction invariants.
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Shorthand result alias used throughout the crate.
pub type CoreResult<T> = Result<T, CoreError>;
