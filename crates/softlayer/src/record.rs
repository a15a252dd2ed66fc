//! Machine records and their persistence.
//!
//! A record is saved after every state transition so that a process that
//! dies mid-poll resumes from the last saved state instead of ordering
//! again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::Instance;
use crate::family::InstanceFamily;

/// Provisioning progress tracked by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProvisionState {
    /// Order placed, instance not yet confirmed.
    Init,
    /// Instance confirmed present and addressable.
    Done,
}

impl ProvisionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Done => "DONE",
        }
    }
}

impl std::fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted state of one machine.
///
/// The provision state only moves INIT → DONE through the transition
/// methods; [`MachineRecord::request_reload`] is the only way back to INIT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRecord {
    /// Machine name, the store key.
    pub name: String,
    /// Family the machine was allocated as.
    pub instance_family: Option<InstanceFamily>,
    /// Numeric instance id.
    pub id: Option<u64>,
    /// Global identifier (bare metal servers are tracked by it).
    pub global_identifier: Option<String>,
    provision_state: Option<ProvisionState>,
    /// Primary IP address.
    pub ip_address: Option<String>,
    /// OS username.
    pub username: Option<String>,
    /// OS password.
    pub password: Option<String>,
    /// Provisioning timeout in seconds.
    pub provision_timeout: Option<u64>,
    /// Account SSH key label installed on the machine.
    pub key_name: Option<String>,
    /// Requested datacenter.
    pub datacenter: Option<String>,
    /// Timestamp of the last save.
    pub updated_at: Option<String>,
}

impl MachineRecord {
    /// Empty record for `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance_family: None,
            id: None,
            global_identifier: None,
            provision_state: None,
            ip_address: None,
            username: None,
            password: None,
            provision_timeout: None,
            key_name: None,
            datacenter: None,
            updated_at: None,
        }
    }

    /// Current provision state; `None` before an order was placed.
    #[must_use]
    pub fn state(&self) -> Option<ProvisionState> {
        self.provision_state
    }

    /// Whether the record references a provider instance.
    #[must_use]
    pub fn has_instance(&self) -> bool {
        self.id.is_some() || self.global_identifier.is_some()
    }

    /// Whether an order must be placed for this record.
    #[must_use]
    pub fn needs_order(&self) -> bool {
        self.provision_state.is_none() || !self.has_instance()
    }

    /// Record a placed order.
    pub fn mark_ordered(&mut self, id: Option<u64>, global_identifier: Option<String>) {
        self.id = id;
        self.global_identifier = global_identifier;
        self.provision_state = Some(ProvisionState::Init);
    }

    /// Record a materialized instance. Credentials the provider did not
    /// report keep their previous values.
    pub fn mark_done(&mut self, instance: &Instance) {
        self.id = Some(instance.id);
        if instance.global_identifier.is_some() {
            self.global_identifier.clone_from(&instance.global_identifier);
        }
        if instance.ip_address.is_some() {
            self.ip_address.clone_from(&instance.ip_address);
        }
        if instance.username.is_some() {
            self.username.clone_from(&instance.username);
        }
        if instance.password.is_some() {
            self.password.clone_from(&instance.password);
        }
        self.provision_state = Some(ProvisionState::Done);
    }

    /// Reset to INIT for an operating system reload.
    pub fn request_reload(&mut self) {
        self.provision_state = Some(ProvisionState::Init);
    }

    /// Stamp the record before saving.
    pub fn touch(&mut self) {
        self.updated_at = Some(chrono::Utc::now().to_rfc3339());
    }
}

/// Persistence collaborator for machine records.
pub trait RecordStore: Send + Sync {
    /// Load the record named `name`, if any.
    ///
    /// # Errors
    /// Returns an error if the record exists but cannot be read.
    fn load(&self, name: &str) -> Result<Option<MachineRecord>>;

    /// Save `record`, replacing any previous version.
    ///
    /// # Errors
    /// Returns an error if the record cannot be written.
    fn save(&self, record: &MachineRecord) -> Result<()>;

    /// Remove the record named `name`. Removing a missing record succeeds.
    ///
    /// # Errors
    /// Returns an error if the record exists but cannot be removed.
    fn remove(&self, name: &str) -> Result<()>;
}

/// One pretty-printed JSON file per machine in a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Store records under `dir`; the directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the records.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            bail!("Invalid machine name '{name}'");
        }
        Ok(self.dir.join(format!("{name}.json")))
    }
}

impl RecordStore for JsonFileStore {
    fn load(&self, name: &str) -> Result<Option<MachineRecord>> {
        let path = self.path(name)?;
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read record {}", path.display()))?;
        let record: MachineRecord = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse record {}", path.display()))?;

        debug!(machine = %name, state = ?record.state(), "Loaded machine record");
        Ok(Some(record))
    }

    fn save(&self, record: &MachineRecord) -> Result<()> {
        let path = self.path(&record.name)?;
        std::fs::create_dir_all(&self.dir).context("Failed to create record directory")?;

        let content = serde_json::to_string_pretty(record).context("Failed to serialize record")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write record {}", path.display()))?;

        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let path = self.path(name)?;
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove record {}", path.display()))?;
            info!(machine = %name, "Removed machine record");
        }
        Ok(())
    }
}

/// In-process store. Keeps every saved version for inspection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Vec<MachineRecord>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every saved version of `name`, oldest first. Emptied by `remove`.
    #[must_use]
    pub fn history(&self, name: &str) -> Vec<MachineRecord> {
        self.records
            .lock()
            .map(|records| records.get(name).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

impl RecordStore for MemoryStore {
    fn load(&self, name: &str) -> Result<Option<MachineRecord>> {
        let records = self.records.lock().map_err(|_| anyhow!("record store poisoned"))?;
        Ok(records.get(name).and_then(|versions| versions.last().cloned()))
    }

    fn save(&self, record: &MachineRecord) -> Result<()> {
        let mut records = self.records.lock().map_err(|_| anyhow!("record store poisoned"))?;
        records
            .entry(record.name.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let mut records = self.records.lock().map_err(|_| anyhow!("record store poisoned"))?;
        records.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PowerState;

    fn instance() -> Instance {
        Instance {
            id: 1234,
            global_identifier: Some("gid-1".to_string()),
            hostname: Some("node.example.com".to_string()),
            ip_address: Some("10.0.0.5".to_string()),
            username: Some("root".to_string()),
            password: None,
            power: PowerState::Running,
            active: true,
        }
    }

    #[test]
    fn test_transitions() {
        let mut record = MachineRecord::new("node");
        assert!(record.needs_order());
        assert_eq!(record.state(), None);

        record.mark_ordered(Some(1234), None);
        assert_eq!(record.state(), Some(ProvisionState::Init));
        assert!(!record.needs_order());

        record.password = Some("kept".to_string());
        record.mark_done(&instance());
        assert_eq!(record.state(), Some(ProvisionState::Done));
        assert_eq!(record.ip_address.as_deref(), Some("10.0.0.5"));
        assert_eq!(record.password.as_deref(), Some("kept"));

        record.request_reload();
        assert_eq!(record.state(), Some(ProvisionState::Init));
        assert_eq!(record.id, Some(1234));
    }

    #[test]
    fn test_state_serializes_uppercase() {
        let mut record = MachineRecord::new("node");
        record.mark_ordered(None, Some("gid-1".to_string()));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["provision_state"], "INIT");
    }

    #[test]
    fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nodes"));

        assert!(store.load("node").unwrap().is_none());

        let mut record = MachineRecord::new("node");
        record.mark_ordered(Some(7), None);
        record.touch();
        store.save(&record).unwrap();

        let loaded = store.load("node").unwrap().unwrap();
        assert_eq!(loaded, record);

        store.remove("node").unwrap();
        assert!(store.load("node").unwrap().is_none());
        store.remove("node").unwrap();
    }

    #[test]
    fn test_json_store_rejects_path_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.save(&MachineRecord::new("../escape")).is_err());
        assert!(store.load("").is_err());
    }

    #[test]
    fn test_memory_store_history() {
        let store = MemoryStore::new();
        let mut record = MachineRecord::new("node");
        store.save(&record).unwrap();
        record.mark_ordered(Some(1), None);
        store.save(&record).unwrap();

        let history = store.history("node");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].state(), None);
        assert_eq!(store.load("node").unwrap().unwrap().state(), Some(ProvisionState::Init));

        store.remove("node").unwrap();
        assert!(store.history("node").is_empty());
    }
}
