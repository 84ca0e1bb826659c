//! File-backed configuration store with defaulting.

use std::fs;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

use crate::error::CoreResult;
use crate::events::EventChannel;

use super::value::{ConfigDocument, ConfigSection};
use super::xml;

/// Change notifications emitted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigEvent {
    /// The on-disk document replaced the in-memory one.
    Loaded,
    /// The in-memory document was written to disk.
    Saved,
    /// The in-memory document was replaced wholesale without a write.
    Updated,
}

/// Durable typed configuration keyed by a file path.
///
/// Opening a store against a missing file materializes the built-in default
/// document and writes it, so callers never observe "no config".
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    document: ConfigDocument,
    events: EventChannel<ConfigEvent>,
}

impl ConfigStore {
    /// Open the store, loading the file at `path` or materializing defaults.
    pub fn open(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        let mut store = Self {
            path,
            document: ConfigDocument::default(),
            events: EventChannel::new(),
        };

        if store.path.exists() {
            store.document = xml::parse_document(&fs::read_to_string(&store.path)?)?;
        } else {
            info!(
                "configuration file {} missing, writing defaults",
                store.path.display()
            );
            store.write_to_disk()?;
        }
        Ok(store)
    }

    /// Path this store reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&mut self) -> UnboundedReceiver<ConfigEvent> {
        self.events.subscribe()
    }

    /// Re-read the document from disk, replacing the in-memory copy only on
    /// a successful parse.
    pub fn load(&mut self) -> CoreResult<()> {
        let text = fs::read_to_string(&self.path)?;
        let parsed = xml::parse_document(&text)?;
        self.document = parsed;
        self.events.emit(ConfigEvent::Loaded);
        Ok(())
    }

    /// Write the in-memory document to disk.
    pub fn save(&mut self) -> CoreResult<()> {
        self.write_to_disk()?;
        self.events.emit(ConfigEvent::Saved);
        Ok(())
    }

    /// Replace the in-memory document without touching the disk.
    pub fn update_config(&mut self, document: ConfigDocument) {
        self.document = document;
        self.events.emit(ConfigEvent::Updated);
    }

    /// Borrow the current document.
    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    /// Copy of the `simulation` section.
    pub fn simulation(&self) -> ConfigSection {
        self.document.simulation.clone()
    }

    /// Copy of the `fuel_energy` section.
    pub fn fuel_energy(&self) -> ConfigSection {
        self.document.fuel_energy.clone()
    }

    /// Copy of the `fuel_carbon_content` section.
    pub fn fuel_carbon_content(&self) -> ConfigSection {
        self.document.fuel_carbon_content.clone()
    }

    /// Copy of the `fuel_prices` section.
    pub fn fuel_prices(&self) -> ConfigSection {
        self.document.fuel_prices.clone()
    }

    /// Copy of the `carbon_taxes` section.
    pub fn carbon_taxes(&self) -> ConfigSection {
        self.document.carbon_taxes.clone()
    }

    /// Copy of one `transport_modes` submap (`"ship"`, `"train"`, `"truck"`).
    pub fn transport_mode(&self, mode: &str) -> Option<ConfigSection> {
        self.document.transport_modes.get(mode).cloned()
    }

    fn write_to_disk(&self) -> CoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, xml::write_document(&self.document))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigValue;
    use crate::error::CoreError;
    use tempfile::tempdir;

    #[test]
    fn missing_file_materializes_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.xml");

        let store = ConfigStore::open(&path).expect("open");
        assert!(path.exists());
        assert_eq!(
            store.simulation().get("time_step"),
            Some(&ConfigValue::Int(15))
        );
        assert_eq!(
            store.fuel_prices().get("HFO"),
            Some(&ConfigValue::Real(580.0))
        );
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.xml");

        let mut store = ConfigStore::open(&path).expect("open");
        let mut doc = store.document().clone();
        doc.simulation
            .insert("time_step".to_string(), ConfigValue::Int(30));
        doc.simulation
            .insert("use_mode_specific".to_string(), ConfigValue::Bool(true));
        store.update_config(doc.clone());
        store.save().expect("save");

        let mut fresh = ConfigStore::open(&path).expect("reopen");
        fresh.load().expect("load");
        assert_eq!(fresh.document(), &doc);
    }

    #[test]
    fn malformed_file_fails_load_and_keeps_document() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.xml");

        let mut store = ConfigStore::open(&path).expect("open");
        let before = store.document().clone();
        std::fs::write(&path, "<configuration><simulation>").expect("write");

        let err = store.load().unwrap_err();
        assert!(matches!(err, CoreError::ConfigParse(_)));
        assert_eq!(store.document(), &before);
    }

    #[test]
    fn events_fire_for_successful_mutations_only() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.xml");

        let mut store = ConfigStore::open(&path).expect("open");
        let mut events = store.subscribe();

        store.update_config(ConfigDocument::default());
        store.save().expect("save");
        std::fs::write(&path, "not xml at all").expect("write");
        assert!(store.load().is_err());

        assert_eq!(events.try_recv().ok(), Some(ConfigEvent::Updated));
        assert_eq!(events.try_recv().ok(), Some(ConfigEvent::Saved));
        assert!(events.try_recv().is_err());
    }
}
