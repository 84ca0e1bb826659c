//! The cross-region network side table.
//!
//! Network objects are owned here, keyed by `(region, name)`. A [`Region`]
//! keeps only a name mirror; every name in a region's mirror must have a
//! matching entry in this controller.
//!
//! [`Region`]: crate::region::Region

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// Which mode a network belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkKind {
    /// Rail network loaded from node + link files.
    Train,
    /// Truck network described by a single configuration document.
    Truck,
}

/// A rail network. Content is opaque to the core; only identity and the
/// backing files matter here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainNetwork {
    name: String,
    node_file: PathBuf,
    link_file: PathBuf,
}

impl TrainNetwork {
    /// Construct from a node file and a link file, validating that both
    /// exist.
    pub fn load(
        name: impl Into<String>,
        node_file: impl Into<PathBuf>,
        link_file: impl Into<PathBuf>,
    ) -> CoreResult<Self> {
        let node_file = node_file.into();
        let link_file = link_file.into();
        for file in [&node_file, &link_file] {
            if !file.is_file() {
                return Err(CoreError::ConfigIo(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("network file {} not found", file.display()),
                )));
            }
        }
        Ok(Self {
            name: name.into(),
            node_file,
            link_file,
        })
    }

    /// Placeholder without backing files, used when a registry snapshot is
    /// restored from names alone.
    pub fn placeholder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_file: PathBuf::new(),
            link_file: PathBuf::new(),
        }
    }

    /// Network name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path to the node file.
    pub fn node_file(&self) -> &Path {
        &self.node_file
    }

    /// Path to the link file.
    pub fn link_file(&self) -> &Path {
        &self.link_file
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

/// A truck network configuration. Opaque beyond identity and its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruckNetworkConfig {
    name: String,
    config_file: PathBuf,
}

impl TruckNetworkConfig {
    /// Construct from a master configuration file, validating existence.
    pub fn load(name: impl Into<String>, config_file: impl Into<PathBuf>) -> CoreResult<Self> {
        let config_file = config_file.into();
        if !config_file.is_file() {
            return Err(CoreError::ConfigIo(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("network file {} not found", config_file.display()),
            )));
        }
        Ok(Self {
            name: name.into(),
            config_file,
        })
    }

    /// Placeholder without a backing file.
    pub fn placeholder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config_file: PathBuf::new(),
        }
    }

    /// Network name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path to the configuration file.
    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

/// Owned network object of either mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeNetwork {
    /// Rail network.
    Train(TrainNetwork),
    /// Truck network configuration.
    Truck(TruckNetworkConfig),
}

impl ModeNetwork {
    /// Network name.
    pub fn name(&self) -> &str {
        match self {
            ModeNetwork::Train(network) => network.name(),
            ModeNetwork::Truck(network) => network.name(),
        }
    }

    /// Mode of this network.
    pub fn kind(&self) -> NetworkKind {
        match self {
            ModeNetwork::Train(_) => NetworkKind::Train,
            ModeNetwork::Truck(_) => NetworkKind::Truck,
        }
    }

    pub(crate) fn set_name(&mut self, name: String) {
        match self {
            ModeNetwork::Train(network) => network.set_name(name),
            ModeNetwork::Truck(network) => network.set_name(name),
        }
    }
}

/// Exclusive owner of all network objects, keyed by `(region, name)`.
#[derive(Debug, Default)]
pub struct NetworkController {
    entries: HashMap<(String, String), ModeNetwork>,
}

impl NetworkController {
    /// Empty controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a network under `(region, network.name())`.
    ///
    /// When the slot is already occupied the network is handed back to the
    /// caller unchanged.
    pub fn register(&mut self, region: &str, network: ModeNetwork) -> Result<(), ModeNetwork> {
        let key = (region.to_string(), network.name().to_string());
        if self.entries.contains_key(&key) {
            return Err(network);
        }
        self.entries.insert(key, network);
        Ok(())
    }

    /// Remove and return the network at `(region, name)`.
    pub fn deregister(&mut self, region: &str, name: &str) -> Option<ModeNetwork> {
        self.entries
            .remove(&(region.to_string(), name.to_string()))
    }

    /// Non-owning lookup.
    pub fn get(&self, region: &str, name: &str) -> Option<&ModeNetwork> {
        self.entries.get(&(region.to_string(), name.to_string()))
    }

    /// Whether `(region, name)` is registered.
    pub fn contains(&self, region: &str, name: &str) -> bool {
        self.entries
            .contains_key(&(region.to_string(), name.to_string()))
    }

    /// Move every entry of `old_region` under `new_region`, preserving
    /// network names. Used by region rename.
    pub fn rekey_region(&mut self, old_region: &str, new_region: &str) {
        let keys: Vec<(String, String)> = self
            .entries
            .keys()
            .filter(|(region, _)| region == old_region)
            .cloned()
            .collect();
        for key in keys {
            if let Some(network) = self.entries.remove(&key) {
                self.entries
                    .insert((new_region.to_string(), key.1), network);
            }
        }
    }

    /// Names of every network registered under `region`, sorted.
    pub fn names_in(&self, region: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .keys()
            .filter(|(entry_region, _)| entry_region == region)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Total number of registered networks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the controller holds no networks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn train(name: &str) -> ModeNetwork {
        ModeNetwork::Train(TrainNetwork::placeholder(name))
    }

    fn truck(name: &str) -> ModeNetwork {
        ModeNetwork::Truck(TruckNetworkConfig::placeholder(name))
    }

    #[test]
    fn register_rejects_occupied_slots() {
        let mut controller = NetworkController::new();
        assert!(controller.register("R", train("N")).is_ok());
        // Same key, even with a different mode, is refused and the object
        // is handed back.
        let rejected = controller.register("R", truck("N")).unwrap_err();
        assert_eq!(rejected.name(), "N");
        assert_eq!(controller.len(), 1);
    }

    #[test]
    fn same_name_under_other_region_is_fine() {
        let mut controller = NetworkController::new();
        assert!(controller.register("R1", train("N")).is_ok());
        assert!(controller.register("R2", train("N")).is_ok());
        assert!(controller.contains("R1", "N"));
        assert!(controller.contains("R2", "N"));
    }

    #[test]
    fn rekey_moves_every_network_of_the_region() {
        let mut controller = NetworkController::new();
        controller.register("old", train("A")).unwrap();
        controller.register("old", truck("B")).unwrap();
        controller.register("other", train("C")).unwrap();

        controller.rekey_region("old", "new");

        assert!(controller.contains("new", "A"));
        assert!(controller.contains("new", "B"));
        assert!(!controller.contains("old", "A"));
        assert!(controller.contains("other", "C"));
        assert_eq!(controller.names_in("new"), vec!["A", "B"]);
    }

    #[test]
    fn deregister_returns_ownership() {
        let mut controller = NetworkController::new();
        controller.register("R", train("N")).unwrap();
        let network = controller.deregister("R", "N").expect("owned network");
        assert_eq!(network.kind(), NetworkKind::Train);
        assert!(controller.is_empty());
        assert!(controller.deregister("R", "N").is_none());
    }

    #[test]
    fn load_requires_existing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nodes = dir.path().join("nodes.dat");
        let links = dir.path().join("links.dat");
        std::fs::write(&nodes, "n").unwrap();

        assert!(TrainNetwork::load("N", &nodes, &links).is_err());
        std::fs::write(&links, "l").unwrap();
        let network = TrainNetwork::load("N", &nodes, &links).expect("load");
        assert_eq!(network.name(), "N");
    }
}
