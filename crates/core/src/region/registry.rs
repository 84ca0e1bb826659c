//! The registry owning all regions, their networks and the shared
//! variable maps.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::warn;

use crate::config::ConfigValue;
use crate::error::{CoreError, CoreResult};
use crate::events::EventChannel;
use crate::network::{
    ModeNetwork, NetworkController, NetworkKind, TrainNetwork, TruckNetworkConfig,
};

use super::Region;

/// Change notifications emitted by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionEvent {
    /// A region was created (or restored via `from_map`).
    RegionAdded(String),
    /// A region and its networks were removed.
    RegionRemoved(String),
    /// A region changed name; its networks moved with it.
    RegionRenamed {
        /// Previous name.
        old: String,
        /// New name.
        new: String,
    },
    /// The active region selection changed (`None` = cleared).
    CurrentRegionChanged(Option<String>),
    /// A network was added to a region.
    NetworkAdded {
        /// Owning region.
        region: String,
        /// Network name.
        name: String,
        /// Network mode.
        kind: NetworkKind,
    },
    /// A network was removed from a region.
    NetworkRemoved {
        /// Owning region.
        region: String,
        /// Network name.
        name: String,
        /// Network mode.
        kind: NetworkKind,
    },
    /// A network changed name within its region.
    NetworkRenamed {
        /// Owning region.
        region: String,
        /// Previous name.
        old: String,
        /// New name.
        new: String,
        /// Network mode.
        kind: NetworkKind,
    },
    /// A global variable was set or replaced.
    GlobalVariableSet(String),
    /// A global variable was removed.
    GlobalVariableRemoved(String),
}

/// Owns every [`Region`] plus the [`NetworkController`], the active-region
/// selection and the global variables map.
///
/// All mutators run on the GUI context; no interleaving with the simulation
/// workers. Each mutator either succeeds and emits its event, or fails and
/// leaves state untouched.
#[derive(Debug)]
pub struct RegionRegistry {
    regions: BTreeMap<String, Region>,
    controller: NetworkController,
    current_region: Option<String>,
    global_variables: BTreeMap<String, ConfigValue>,
    events: EventChannel<RegionEvent>,
}

impl Default for RegionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            regions: BTreeMap::new(),
            controller: NetworkController::new(),
            current_region: None,
            global_variables: BTreeMap::new(),
            events: EventChannel::new(),
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&mut self) -> UnboundedReceiver<RegionEvent> {
        self.events.subscribe()
    }

    // Regions ---------------------------------------------------------------

    /// Add an empty region. Returns `false` when the name exists.
    pub fn add_region(&mut self, name: &str) -> bool {
        if self.regions.contains_key(name) {
            return false;
        }
        self.regions.insert(name.to_string(), Region::new(name));
        self.events.emit(RegionEvent::RegionAdded(name.to_string()));
        true
    }

    /// Atomically rename a region, moving its networks within the
    /// controller. `rename_region(n, n)` is a silent no-op. Returns `false`
    /// when `old` is missing or `new` is taken.
    pub fn rename_region(&mut self, old: &str, new: &str) -> bool {
        if old == new {
            return true;
        }
        if self.regions.contains_key(new) {
            return false;
        }
        let Some(mut region) = self.regions.remove(old) else {
            return false;
        };
        region.set_name(new.to_string());
        self.controller.rekey_region(old, new);
        self.regions.insert(new.to_string(), region);
        self.events.emit(RegionEvent::RegionRenamed {
            old: old.to_string(),
            new: new.to_string(),
        });

        if self.current_region.as_deref() == Some(old) {
            self.current_region = Some(new.to_string());
            self.events
                .emit(RegionEvent::CurrentRegionChanged(Some(new.to_string())));
        }
        true
    }

    /// Remove a region and every network it owns. Per-network
    /// deregistration failures are logged and do not abort the removal.
    pub fn remove_region(&mut self, name: &str) -> bool {
        let Some(region) = self.regions.remove(name) else {
            return false;
        };
        for network in region.network_names() {
            if self.controller.deregister(name, &network).is_none() {
                warn!("network '{network}' of region '{name}' was missing from the controller");
            }
        }
        if self.current_region.as_deref() == Some(name) {
            self.current_region = None;
            self.events.emit(RegionEvent::CurrentRegionChanged(None));
        }
        self.events
            .emit(RegionEvent::RegionRemoved(name.to_string()));
        true
    }

    /// Select the active region; an empty name clears the selection. Emits
    /// only when the value actually changes.
    pub fn set_current_region(&mut self, name: &str) -> bool {
        let next = if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        };
        if next == self.current_region {
            return false;
        }
        self.current_region = next.clone();
        self.events.emit(RegionEvent::CurrentRegionChanged(next));
        true
    }

    /// The active region, if any.
    pub fn current_region(&self) -> Option<&str> {
        self.current_region.as_deref()
    }

    /// Non-owning region lookup.
    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.get(name)
    }

    /// Mutable region lookup, for region-variable edits.
    pub fn region_mut(&mut self, name: &str) -> Option<&mut Region> {
        self.regions.get_mut(name)
    }

    /// Names of all regions, sorted.
    pub fn region_names(&self) -> Vec<String> {
        self.regions.keys().cloned().collect()
    }

    /// Read access to the network side table.
    pub fn controller(&self) -> &NetworkController {
        &self.controller
    }

    #[cfg(test)]
    pub(crate) fn controller_mut(&mut self) -> &mut NetworkController {
        &mut self.controller
    }

    // Networks --------------------------------------------------------------

    /// Add a train network to `region`, loading it from a node file and a
    /// link file.
    pub fn add_train_network(
        &mut self,
        region: &str,
        name: &str,
        node_file: impl Into<std::path::PathBuf>,
        link_file: impl Into<std::path::PathBuf>,
    ) -> CoreResult<()> {
        self.check_name_free(region, name)?;
        let network = ModeNetwork::Train(TrainNetwork::load(name, node_file, link_file)?);
        self.attach_network(region, network)
    }

    /// Add a truck network to `region`, loading its configuration document.
    pub fn add_truck_network(
        &mut self,
        region: &str,
        name: &str,
        config_file: impl Into<std::path::PathBuf>,
    ) -> CoreResult<()> {
        self.check_name_free(region, name)?;
        let network = ModeNetwork::Truck(TruckNetworkConfig::load(name, config_file)?);
        self.attach_network(region, network)
    }

    /// Rename a train network within its region.
    pub fn rename_train_network(&mut self, region: &str, old: &str, new: &str) -> CoreResult<()> {
        self.rename_network(region, old, new, NetworkKind::Train)
    }

    /// Rename a truck network within its region.
    pub fn rename_truck_network(&mut self, region: &str, old: &str, new: &str) -> CoreResult<()> {
        self.rename_network(region, old, new, NetworkKind::Truck)
    }

    /// Remove a network of either mode from `region`. The controller owns
    /// destruction; the object is dropped here.
    pub fn remove_network(&mut self, region_name: &str, name: &str) -> CoreResult<()> {
        let region = self
            .regions
            .get_mut(region_name)
            .ok_or_else(|| CoreError::RegionNotFound(region_name.to_string()))?;
        let Some(kind) = region.mirror_remove(name) else {
            return Err(CoreError::UnknownId {
                kind: "network",
                id: name.to_string(),
            });
        };
        if self.controller.deregister(region_name, name).is_none() {
            // Mirror said the network existed; dropping the stale mirror
            // entry restores consistency, so log rather than fail.
            warn!("network '{name}' of region '{region_name}' was missing from the controller");
        }
        self.events.emit(RegionEvent::NetworkRemoved {
            region: region_name.to_string(),
            name: name.to_string(),
            kind,
        });
        Ok(())
    }

    /// Non-owning train network lookup.
    pub fn train_network(&self, region: &str, name: &str) -> Option<&TrainNetwork> {
        match self.controller.get(region, name) {
            Some(ModeNetwork::Train(network)) => Some(network),
            _ => None,
        }
    }

    /// Non-owning truck network lookup.
    pub fn truck_network(&self, region: &str, name: &str) -> Option<&TruckNetworkConfig> {
        match self.controller.get(region, name) {
            Some(ModeNetwork::Truck(network)) => Some(network),
            _ => None,
        }
    }

    fn check_name_free(&self, region_name: &str, name: &str) -> CoreResult<()> {
        let region = self
            .regions
            .get(region_name)
            .ok_or_else(|| CoreError::RegionNotFound(region_name.to_string()))?;
        if region.has_network(name) {
            return Err(CoreError::NameConflict {
                region: region_name.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn attach_network(&mut self, region_name: &str, network: ModeNetwork) -> CoreResult<()> {
        let name = network.name().to_string();
        let kind = network.kind();
        if self.controller.register(region_name, network).is_err() {
            // The constructed object is dropped with the Err payload.
            return Err(CoreError::NetworkRegistration {
                region: region_name.to_string(),
                name,
            });
        }
        let region = self
            .regions
            .get_mut(region_name)
            .expect("region checked before registration");
        region.mirror_add(kind, name.clone());
        self.events.emit(RegionEvent::NetworkAdded {
            region: region_name.to_string(),
            name,
            kind,
        });
        Ok(())
    }

    fn rename_network(
        &mut self,
        region_name: &str,
        old: &str,
        new: &str,
        kind: NetworkKind,
    ) -> CoreResult<()> {
        let region = self
            .regions
            .get(region_name)
            .ok_or_else(|| CoreError::RegionNotFound(region_name.to_string()))?;
        if region.network_kind(old) != Some(kind) {
            return Err(CoreError::UnknownId {
                kind: "network",
                id: old.to_string(),
            });
        }
        if region.has_network(new) {
            return Err(CoreError::NameConflict {
                region: region_name.to_string(),
                name: new.to_string(),
            });
        }

        let Some(mut network) = self.controller.deregister(region_name, old) else {
            return Err(CoreError::CriticalState(format!(
                "network '{old}' of region '{region_name}' missing from the controller"
            )));
        };
        network.set_name(new.to_string());
        if let Err(mut rejected) = self.controller.register(region_name, network) {
            // Best-effort restore under the old key; if even that fails the
            // object is dropped and the caller sees a fatal error.
            rejected.set_name(old.to_string());
            return match self.controller.register(region_name, rejected) {
                Ok(()) => Err(CoreError::NetworkRegistration {
                    region: region_name.to_string(),
                    name: new.to_string(),
                }),
                Err(_) => Err(CoreError::CriticalState(format!(
                    "lost network '{old}' of region '{region_name}' during rename"
                ))),
            };
        }

        let region = self
            .regions
            .get_mut(region_name)
            .expect("region checked above");
        region.mirror_rename(old, new.to_string());
        self.events.emit(RegionEvent::NetworkRenamed {
            region: region_name.to_string(),
            old: old.to_string(),
            new: new.to_string(),
            kind,
        });
        Ok(())
    }

    // Global variables ------------------------------------------------------

    /// Set or replace a global variable.
    pub fn set_global_variable(&mut self, key: impl Into<String>, value: ConfigValue) {
        let key = key.into();
        self.global_variables.insert(key.clone(), value);
        self.events.emit(RegionEvent::GlobalVariableSet(key));
    }

    /// Look up a global variable.
    pub fn global_variable(&self, key: &str) -> Option<&ConfigValue> {
        self.global_variables.get(key)
    }

    /// Remove a global variable; returns whether it existed.
    pub fn remove_global_variable(&mut self, key: &str) -> bool {
        if self.global_variables.remove(key).is_none() {
            return false;
        }
        self.events
            .emit(RegionEvent::GlobalVariableRemoved(key.to_string()));
        true
    }

    /// Whether a global variable exists.
    pub fn has_global_variable(&self, key: &str) -> bool {
        self.global_variables.contains_key(key)
    }

    // Round-trip ------------------------------------------------------------

    /// Serialize the registry (regions, selection, global variables) into a
    /// tagged map. Network objects are referenced by name only.
    pub fn to_map(&self) -> Value {
        let regions: Vec<Value> = self
            .regions
            .values()
            .map(|region| {
                json!({
                    "region": region.name(),
                    "train_networks": region.train_network_names(),
                    "truck_networks": region.truck_network_names(),
                    "variables": variables_to_json(region.variables()),
                })
            })
            .collect();
        json!({
            "regions": regions,
            "current_region": self.current_region,
            "global_variables": variables_to_json(&self.global_variables),
        })
    }

    /// Restore the registry from a map produced by [`to_map`]. Clears the
    /// current state first, then emits one `RegionAdded` per restored
    /// region. Controller entries are recreated as placeholders; the GUI's
    /// readers reload file contents separately.
    ///
    /// [`to_map`]: RegionRegistry::to_map
    pub fn from_map(&mut self, map: &Value) -> CoreResult<()> {
        let regions = map
            .get("regions")
            .and_then(Value::as_array)
            .ok_or_else(|| CoreError::ConfigParse("missing 'regions' list".to_string()))?;

        self.regions.clear();
        self.controller = NetworkController::new();
        self.current_region = None;
        self.global_variables.clear();

        for entry in regions {
            let name = entry
                .get("region")
                .and_then(Value::as_str)
                .ok_or_else(|| CoreError::ConfigParse("region entry without name".to_string()))?;
            let mut region = Region::new(name);
            for network in string_list(entry.get("train_networks")) {
                let placeholder = ModeNetwork::Train(TrainNetwork::placeholder(&network));
                if self.controller.register(name, placeholder).is_err() {
                    return Err(CoreError::ConfigParse(format!(
                        "duplicate network '{network}' in region '{name}'"
                    )));
                }
                region.mirror_add(NetworkKind::Train, network);
            }
            for network in string_list(entry.get("truck_networks")) {
                let placeholder = ModeNetwork::Truck(TruckNetworkConfig::placeholder(&network));
                if self.controller.register(name, placeholder).is_err() {
                    return Err(CoreError::ConfigParse(format!(
                        "duplicate network '{network}' in region '{name}'"
                    )));
                }
                region.mirror_add(NetworkKind::Truck, network);
            }
            if let Some(variables) = entry.get("variables").and_then(Value::as_object) {
                region.set_variables(variables_from_json(variables));
            }
            self.regions.insert(name.to_string(), region);
            self.events.emit(RegionEvent::RegionAdded(name.to_string()));
        }

        self.current_region = map
            .get("current_region")
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(globals) = map.get("global_variables").and_then(Value::as_object) {
            self.global_variables = variables_from_json(globals);
        }
        Ok(())
    }
}

fn variables_to_json(variables: &BTreeMap<String, ConfigValue>) -> Value {
    Value::Object(
        variables
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect(),
    )
}

fn variables_from_json(object: &Map<String, Value>) -> BTreeMap<String, ConfigValue> {
    object
        .iter()
        .filter_map(|(key, value)| {
            ConfigValue::from_json(value).map(|parsed| (key.clone(), parsed))
        })
        .collect()
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
