//! Generic indexed vehicle collection with change events.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};
use crate::events::EventChannel;

use super::models::{Ship, Train, Vehicle};

/// Change notifications emitted per registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VehicleEvent {
    /// A file load replaced the collection with this many vehicles.
    Loaded(usize),
    /// A vehicle was added.
    Added(String),
    /// A vehicle was removed.
    Removed(String),
    /// A vehicle was replaced by id.
    Updated(String),
    /// The collection was cleared.
    Cleared,
}

/// Indexed collection of one vehicle kind, keyed by user id.
#[derive(Debug)]
pub struct VehicleRegistry<V: Vehicle> {
    vehicles: BTreeMap<String, V>,
    events: EventChannel<VehicleEvent>,
}

/// Registry of ship definitions.
pub type ShipRegistry = VehicleRegistry<Ship>;

/// Registry of train definitions.
pub type TrainRegistry = VehicleRegistry<Train>;

impl<V: Vehicle> Default for VehicleRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Vehicle> VehicleRegistry<V> {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            vehicles: BTreeMap::new(),
            events: EventChannel::new(),
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&mut self) -> UnboundedReceiver<VehicleEvent> {
        self.events.subscribe()
    }

    /// Non-owning lookup by user id.
    pub fn get(&self, user_id: &str) -> Option<&V> {
        self.vehicles.get(user_id)
    }

    /// All vehicles, ordered by user id.
    pub fn get_all(&self) -> Vec<&V> {
        self.vehicles.values().collect()
    }

    /// Number of vehicles held.
    pub fn count(&self) -> usize {
        self.vehicles.len()
    }

    /// Add a vehicle; returns `false` when its id is taken.
    pub fn add(&mut self, vehicle: V) -> bool {
        let id = vehicle.user_id().to_string();
        if self.vehicles.contains_key(&id) {
            return false;
        }
        self.vehicles.insert(id.clone(), vehicle);
        self.events.emit(VehicleEvent::Added(id));
        true
    }

    /// Remove a vehicle by id; returns whether it existed.
    pub fn remove(&mut self, user_id: &str) -> bool {
        if self.vehicles.remove(user_id).is_none() {
            return false;
        }
        self.events
            .emit(VehicleEvent::Removed(user_id.to_string()));
        true
    }

    /// Replace an existing vehicle by id; returns `false` when the id is
    /// unknown.
    pub fn update(&mut self, vehicle: V) -> bool {
        let id = vehicle.user_id().to_string();
        if !self.vehicles.contains_key(&id) {
            return false;
        }
        self.vehicles.insert(id.clone(), vehicle);
        self.events.emit(VehicleEvent::Updated(id));
        true
    }

    /// Reconcile the collection against `list`: ids missing from `list` are
    /// removed, new ids are added, overlapping ids are updated. Returns the
    /// conjunction of the individual results.
    pub fn update_batch(&mut self, list: Vec<V>) -> bool {
        let incoming: Vec<String> = list
            .iter()
            .map(|vehicle| vehicle.user_id().to_string())
            .collect();
        let stale: Vec<String> = self
            .vehicles
            .keys()
            .filter(|id| !incoming.contains(id))
            .cloned()
            .collect();

        let mut all_ok = true;
        for id in stale {
            all_ok &= self.remove(&id);
        }
        for vehicle in list {
            if self.vehicles.contains_key(vehicle.user_id()) {
                all_ok &= self.update(vehicle);
            } else {
                all_ok &= self.add(vehicle);
            }
        }
        all_ok
    }

    /// Drop every vehicle.
    pub fn clear(&mut self) {
        self.vehicles.clear();
        self.events.emit(VehicleEvent::Cleared);
    }
}

impl<V: Vehicle + DeserializeOwned> VehicleRegistry<V> {
    /// Replace the collection with the vehicles parsed from `path` (a JSON
    /// array, one object per vehicle). Duplicate ids within the file keep
    /// the last occurrence, with a warning.
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> CoreResult<usize> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let parsed: Vec<V> = serde_json::from_str(&text).map_err(|err| {
            CoreError::ConfigParse(format!("{}: {err}", path.display()))
        })?;

        self.vehicles.clear();
        for vehicle in parsed {
            let id = vehicle.user_id().to_string();
            if self.vehicles.insert(id.clone(), vehicle).is_some() {
                warn!("duplicate {} id '{id}' in {}", V::KIND, path.display());
            }
        }
        let count = self.vehicles.len();
        info!("loaded {count} {}s from {}", V::KIND, path.display());
        self.events.emit(VehicleEvent::Loaded(count));
        Ok(count)
    }
}
