//! A named grouping of networks sharing a coordinate space.

use std::collections::BTreeMap;

use crate::config::ConfigValue;
use crate::network::NetworkKind;

/// One region. Network objects live in the
/// [`NetworkController`](crate::network::NetworkController); the region
/// keeps name mirrors per mode plus a free-form variables map.
///
/// Train and truck network names share a single namespace within a region.
/// All mutations that touch the controller go through
/// [`RegionRegistry`](crate::region::RegionRegistry) so the mirror and the
/// controller stay consistent.
#[derive(Debug, Clone)]
pub struct Region {
    name: String,
    train_networks: Vec<String>,
    truck_networks: Vec<String>,
    variables: BTreeMap<String, ConfigValue>,
}

impl Region {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            train_networks: Vec::new(),
            truck_networks: Vec::new(),
            variables: BTreeMap::new(),
        }
    }

    /// Region name. Names are opaque to this layer; emptiness checks belong
    /// to callers.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the train networks owned by this region.
    pub fn train_network_names(&self) -> &[String] {
        &self.train_networks
    }

    /// Names of the truck networks owned by this region.
    pub fn truck_network_names(&self) -> &[String] {
        &self.truck_networks
    }

    /// Union of train and truck network names.
    pub fn network_names(&self) -> Vec<String> {
        let mut names = self.train_networks.clone();
        names.extend(self.truck_networks.iter().cloned());
        names
    }

    /// Whether `name` exists in either mode's mirror.
    pub fn has_network(&self, name: &str) -> bool {
        self.network_kind(name).is_some()
    }

    /// Which mode owns `name`, if any.
    pub fn network_kind(&self, name: &str) -> Option<NetworkKind> {
        if self.train_networks.iter().any(|entry| entry == name) {
            Some(NetworkKind::Train)
        } else if self.truck_networks.iter().any(|entry| entry == name) {
            Some(NetworkKind::Truck)
        } else {
            None
        }
    }

    /// Set or replace a region variable.
    pub fn set_variable(&mut self, key: impl Into<String>, value: ConfigValue) {
        self.variables.insert(key.into(), value);
    }

    /// Look up a region variable.
    pub fn variable(&self, key: &str) -> Option<&ConfigValue> {
        self.variables.get(key)
    }

    /// Remove a region variable; returns whether it existed.
    pub fn remove_variable(&mut self, key: &str) -> bool {
        self.variables.remove(key).is_some()
    }

    /// Whether a region variable exists.
    pub fn has_variable(&self, key: &str) -> bool {
        self.variables.contains_key(key)
    }

    /// All region variables.
    pub fn variables(&self) -> &BTreeMap<String, ConfigValue> {
        &self.variables
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn mirror_add(&mut self, kind: NetworkKind, name: String) {
        match kind {
            NetworkKind::Train => self.train_networks.push(name),
            NetworkKind::Truck => self.truck_networks.push(name),
        }
    }

    pub(crate) fn mirror_remove(&mut self, name: &str) -> Option<NetworkKind> {
        if let Some(index) = self.train_networks.iter().position(|entry| entry == name) {
            self.train_networks.remove(index);
            return Some(NetworkKind::Train);
        }
        if let Some(index) = self.truck_networks.iter().position(|entry| entry == name) {
            self.truck_networks.remove(index);
            return Some(NetworkKind::Truck);
        }
        None
    }

    pub(crate) fn mirror_rename(&mut self, old: &str, new: String) -> Option<NetworkKind> {
        if let Some(slot) = self.train_networks.iter_mut().find(|entry| *entry == old) {
            *slot = new;
            return Some(NetworkKind::Train);
        }
        if let Some(slot) = self.truck_networks.iter_mut().find(|entry| *entry == old) {
            *slot = new;
            return Some(NetworkKind::Truck);
        }
        None
    }

    pub(crate) fn set_variables(&mut self, variables: BTreeMap<String, ConfigValue>) {
        self.variables = variables;
    }
}
