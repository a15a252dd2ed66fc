//! Provisioning driver: lifecycle operations over one instance family.
//!
//! Every operation takes the machine's [`MachineRecord`] and saves it
//! through the [`RecordStore`] after each state transition. Remote calls
//! run under the shared [`ApiLock`]; poll sleeps run outside it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::models::SshKey;
use crate::api::{ApiError, Instance, SoftLayerApi};
use crate::catalog::CatalogCache;
use crate::config::DriverConfig;
use crate::error::{DriverError, Result};
use crate::family::InstanceFamily;
use crate::lock::ApiLock;
use crate::matcher;
use crate::order::{CancellationReason, OrderBuilder};
use crate::poll::{
    PollBudget, Reachability, Sleeper, TcpProbe, TokioSleeper, POLL_INTERVAL, READY_TIMEOUT_SECS,
    SSH_PORT,
};
use crate::record::{MachineRecord, ProvisionState, RecordStore};
use crate::spec::DesiredSpec;
use crate::validate::validate;

/// How to authenticate to a ready machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionStrategy {
    /// Private key of the named account SSH key.
    KeyPair { key_name: String },
    /// OS password reported by the provider.
    Password { password: String },
}

/// A machine ready to be connected to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDescriptor {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub username: String,
    pub strategy: ConnectionStrategy,
}

/// Provisions machines of one instance family.
pub struct SoftLayerDriver {
    api: Arc<dyn SoftLayerApi>,
    catalog: CatalogCache,
    lock: ApiLock,
    store: Arc<dyn RecordStore>,
    sleeper: Arc<dyn Sleeper>,
    probe: Arc<dyn Reachability>,
}

impl std::fmt::Debug for SoftLayerDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftLayerDriver")
            .field("family", &self.catalog.family())
            .field("lock", &self.lock)
            .finish_non_exhaustive()
    }
}

impl SoftLayerDriver {
    /// Create a driver for `family`, loading its catalog.
    ///
    /// # Errors
    /// Returns [`DriverError::CatalogLoad`] if the catalog cannot be loaded.
    pub async fn new(
        api: Arc<dyn SoftLayerApi>,
        family: InstanceFamily,
        lock: ApiLock,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self> {
        let catalog = {
            let _guard = lock.acquire().await;
            CatalogCache::load(api.as_ref(), family).await?
        };
        Ok(Self::with_catalog(api, catalog, lock, store))
    }

    /// Create a driver from configuration, talking to the configured
    /// endpoint.
    ///
    /// # Errors
    /// Returns [`DriverError::Config`] or [`DriverError::CatalogLoad`].
    pub async fn from_config(
        config: &DriverConfig,
        lock: ApiLock,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self> {
        let client = config.client()?;
        Self::new(Arc::new(client), config.instance_family, lock, store).await
    }

    /// Create a driver around an already loaded catalog.
    #[must_use]
    pub fn with_catalog(
        api: Arc<dyn SoftLayerApi>,
        catalog: CatalogCache,
        lock: ApiLock,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            api,
            catalog,
            lock,
            store,
            sleeper: Arc::new(TokioSleeper),
            probe: Arc::new(TcpProbe::default()),
        }
    }

    /// Replace the source of poll delays.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Replace the reachability probe.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn Reachability>) -> Self {
        self.probe = probe;
        self
    }

    /// Family this driver provisions.
    #[must_use]
    pub fn family(&self) -> InstanceFamily {
        self.catalog.family()
    }

    /// The cached catalog.
    #[must_use]
    pub fn catalog(&self) -> &CatalogCache {
        &self.catalog
    }

    /// Load the stored record of `name`, or a fresh one.
    ///
    /// # Errors
    /// Returns [`DriverError::Persistence`] if the store fails.
    pub fn load_record(&self, name: &str) -> Result<MachineRecord> {
        let record = self
            .store
            .load(name)
            .map_err(|source| DriverError::Persistence {
                machine: name.to_string(),
                source,
            })?;
        Ok(record.unwrap_or_else(|| MachineRecord::new(name)))
    }

    // ========================================================================
    // Lifecycle operations
    // ========================================================================

    /// Validate `spec` and order the machine if the record has no instance
    /// yet. A record that already has one is left alone unless
    /// `spec.reload_os` is set.
    ///
    /// With `apply` unset the order is matched, built and verified but not
    /// placed, and nothing is saved.
    ///
    /// # Errors
    /// Returns [`DriverError::Validation`], [`DriverError::Match`],
    /// [`DriverError::Order`] or a persistence/remote failure.
    pub async fn allocate(
        &self,
        record: &mut MachineRecord,
        spec: &DesiredSpec,
        apply: bool,
    ) -> Result<()> {
        let family = self.family();
        info!(machine = %record.name, family = %family, apply, "Allocating machine");

        self.check_family("allocate", record)?;
        validate(spec, family, self.catalog.datacenters()).map_err(|source| {
            DriverError::Validation {
                machine: record.name.clone(),
                source,
            }
        })?;

        record.instance_family = Some(family);
        record.datacenter.clone_from(&spec.datacenter);
        record.provision_timeout = Some(spec.provision_timeout_secs(family));
        if apply {
            record.key_name.clone_from(&spec.key_name);
            self.persist(record)?;
        }

        if !record.needs_order() {
            info!(machine = %record.name, state = ?record.state(), "Machine already allocated");
            if spec.reload_os {
                self.reload_os(record, apply).await?;
            }
            return Ok(());
        }

        let resolution =
            matcher::resolve(spec, self.catalog.catalog()).map_err(|source| DriverError::Match {
                machine: record.name.clone(),
                source,
            })?;

        let _guard = self.lock.acquire().await;
        let builder = OrderBuilder::new(self.api.as_ref(), &self.catalog, &record.name);
        let order = builder.build(spec, resolution).await?;
        let Some(receipt) = builder.submit(&order, apply).await? else {
            return Ok(());
        };

        let ordered = builder.ordered_instance(&receipt, family)?;
        let (id, global_identifier) = match family {
            // Only the global identifier exists until the server is provisioned.
            InstanceFamily::BareMetalServer => (None, ordered.global_identifier),
            InstanceFamily::VirtualServer | InstanceFamily::BareMetalInstance => {
                (ordered.id, ordered.global_identifier)
            }
        };
        let trackable = match family {
            InstanceFamily::VirtualServer => id.is_some(),
            InstanceFamily::BareMetalInstance => id.is_some() || global_identifier.is_some(),
            InstanceFamily::BareMetalServer => global_identifier.is_some(),
        };
        if !trackable {
            return Err(DriverError::Order {
                machine: record.name.clone(),
                stage: "place",
                source: ApiError::UnexpectedResponse {
                    call: "placeOrder".to_string(),
                    detail: "ordered instance has no identifier to track".to_string(),
                },
            });
        }

        record.mark_ordered(id, global_identifier);
        self.persist(record)?;
        info!(
            machine = %record.name,
            id = ?record.id,
            global_identifier = ?record.global_identifier,
            "Instance initialized"
        );

        if let Some(notes) = spec.notes.as_deref() {
            match ordered.id {
                Some(instance_id) => self
                    .api
                    .edit_notes(family.service(), instance_id, notes)
                    .await
                    .map_err(|source| self.remote("edit notes", record, source))?,
                None => {
                    warn!(machine = %record.name, "Ordered instance has no id yet, notes not set");
                }
            }
        }

        Ok(())
    }

    /// Drive the machine to a connectable state.
    ///
    /// An INIT record is polled until the provider reports the instance
    /// active. A DONE record is powered on if needed and waited on until it
    /// accepts connections. Returns `None` when `apply` is unset.
    ///
    /// # Errors
    /// Returns [`DriverError::ProvisionTimeout`],
    /// [`DriverError::Unreachable`] or [`DriverError::State`].
    pub async fn ready(
        &self,
        record: &mut MachineRecord,
        apply: bool,
    ) -> Result<Option<MachineDescriptor>> {
        info!(machine = %record.name, state = ?record.state(), "Readying machine");
        if !apply {
            info!(machine = %record.name, "Simulate mode, ready skipped");
            return Ok(None);
        }
        self.check_family("ready", record)?;

        match record.state() {
            Some(ProvisionState::Init) => self.wait_provisioned(record).await?,
            Some(ProvisionState::Done) => {
                let instance = self
                    .query("ready", record)
                    .await?
                    .ok_or_else(|| self.state_error("ready", record, "instance not found"))?;
                if instance.power.is_on() {
                    info!(machine = %record.name, "Machine is powered on, waiting until reachable");
                } else {
                    info!(machine = %record.name, power = %instance.power, "Starting machine");
                    self.start(record, apply).await?;
                }
                self.wait_reachable(record).await?;
            }
            None => return Err(self.state_error("ready", record, "machine is not allocated")),
        }

        info!(machine = %record.name, "Machine ready");
        self.connect(record).map(Some)
    }

    /// Power the machine on.
    ///
    /// # Errors
    /// Returns [`DriverError::State`] if the record has no instance id.
    pub async fn start(&self, record: &MachineRecord, apply: bool) -> Result<()> {
        self.power("start", record, apply, true).await
    }

    /// Power the machine off: soft for virtual servers, hard for hardware.
    ///
    /// # Errors
    /// Returns [`DriverError::State`] if the record has no instance id.
    pub async fn stop(&self, record: &MachineRecord, apply: bool) -> Result<()> {
        self.power("stop", record, apply, false).await
    }

    async fn power(
        &self,
        operation: &'static str,
        record: &MachineRecord,
        apply: bool,
        on: bool,
    ) -> Result<()> {
        self.check_family(operation, record)?;
        let id = record
            .id
            .ok_or_else(|| self.state_error(operation, record, "no instance id"))?;
        info!(machine = %record.name, id, operation, apply, "Changing power state");
        if !apply {
            return Ok(());
        }

        let service = self.family().service();
        let _guard = self.lock.acquire().await;
        let result = if on {
            self.api.power_on(service, id).await
        } else {
            self.api.power_off(service, id).await
        };
        result.map_err(|source| self.remote(operation, record, source))
    }

    /// Delete the machine and clear its record.
    ///
    /// Virtual servers and bare metal instances are deleted directly; bare
    /// metal servers are cancelled through their billing item.
    ///
    /// # Errors
    /// Returns [`DriverError::State`], without any remote call, unless the
    /// record is DONE.
    pub async fn destroy(&self, record: &mut MachineRecord, apply: bool) -> Result<()> {
        info!(machine = %record.name, "Destroying machine");
        if record.state() != Some(ProvisionState::Done) {
            return Err(self.state_error("destroy", record, "machine is not provisioned"));
        }
        self.check_family("destroy", record)?;
        let id = record
            .id
            .ok_or_else(|| self.state_error("destroy", record, "no instance id"))?;
        if !apply {
            return Ok(());
        }

        let family = self.family();
        {
            let _guard = self.lock.acquire().await;
            match family {
                InstanceFamily::VirtualServer | InstanceFamily::BareMetalInstance => self
                    .api
                    .delete_instance(family.service(), id)
                    .await
                    .map_err(|source| self.remote("destroy", record, source))?,
                InstanceFamily::BareMetalServer => {
                    let billing = self
                        .api
                        .billing_item(id)
                        .await
                        .map_err(|source| self.remote("destroy", record, source))?;
                    self.api
                        .cancel_billing_item(billing.id, CancellationReason::Unneeded.as_str())
                        .await
                        .map_err(|source| self.remote("destroy", record, source))?;
                }
            }
        }

        self.store
            .remove(&record.name)
            .map_err(|source| DriverError::Persistence {
                machine: record.name.clone(),
                source,
            })?;
        *record = MachineRecord::new(record.name.clone());
        info!(machine = %record.name, "Machine destroyed");
        Ok(())
    }

    /// Reload the current operating system. The record returns to INIT and
    /// the next `ready` polls until the reload finishes.
    ///
    /// # Errors
    /// Returns [`DriverError::State`] if the machine was never ordered.
    pub async fn reload_os(&self, record: &mut MachineRecord, apply: bool) -> Result<()> {
        info!(machine = %record.name, apply, "Reloading operating system");
        if record.state().is_none() || !record.has_instance() {
            return Err(self.state_error("reload os", record, "machine is not allocated"));
        }
        self.check_family("reload os", record)?;
        if !apply {
            return Ok(());
        }

        record.request_reload();
        self.persist(record)?;

        let service = self.family().service();
        let _guard = self.lock.acquire().await;
        let id = match record.id {
            Some(id) => id,
            None => {
                let instance = self
                    .lookup("reload os", record)
                    .await?
                    .filter(|instance| instance.active)
                    .ok_or_else(|| {
                        self.state_error("reload os", record, "instance not found or not active")
                    })?;
                instance.id
            }
        };
        self.api
            .reload_os(service, id)
            .await
            .map_err(|source| self.remote("reload os", record, source))?;
        info!(machine = %record.name, id, "Operating system reload submitted");
        Ok(())
    }

    /// Describe how to reach a provisioned machine. No remote call.
    ///
    /// # Errors
    /// Returns [`DriverError::State`] if the record is not DONE or lacks an
    /// address or credentials.
    pub fn connect(&self, record: &MachineRecord) -> Result<MachineDescriptor> {
        if record.state() != Some(ProvisionState::Done) {
            return Err(self.state_error("connect", record, "machine is not provisioned"));
        }
        let address = record
            .ip_address
            .clone()
            .ok_or_else(|| self.state_error("connect", record, "no ip address"))?;

        let strategy = match (&record.key_name, &record.password) {
            (Some(key_name), _) => ConnectionStrategy::KeyPair {
                key_name: key_name.clone(),
            },
            (None, Some(password)) => ConnectionStrategy::Password {
                password: password.clone(),
            },
            (None, None) => {
                return Err(self.state_error("connect", record, "no key name or password"))
            }
        };

        Ok(MachineDescriptor {
            name: record.name.clone(),
            address,
            port: SSH_PORT,
            username: record.username.clone().unwrap_or_else(|| "root".to_string()),
            strategy,
        })
    }

    /// Register a public key on the account under `label`. An existing key
    /// with the same label is reused if its public key matches.
    ///
    /// # Errors
    /// Returns [`DriverError::State`] if the label holds a different key.
    pub async fn register_ssh_key(&self, label: &str, public_key: &str) -> Result<SshKey> {
        let remote = |source: ApiError| DriverError::RemoteApi {
            operation: "register ssh key",
            machine: label.to_string(),
            source,
        };

        let _guard = self.lock.acquire().await;
        let keys = self.api.ssh_keys().await.map_err(remote)?;
        if let Some(existing) = keys.into_iter().find(|key| key.label == label) {
            let same = existing
                .key
                .as_deref()
                .is_some_and(|key| key.trim() == public_key.trim());
            if !same {
                return Err(DriverError::State {
                    operation: "register ssh key",
                    machine: label.to_string(),
                    state: None,
                    reason: "a different public key is registered under this label".to_string(),
                });
            }
            info!(label, id = existing.id, "SSH key already registered");
            return Ok(existing);
        }

        let key = self
            .api
            .create_ssh_key(label, public_key.trim())
            .await
            .map_err(remote)?;
        info!(label, id = key.id, "Registered SSH key");
        Ok(key)
    }

    // ========================================================================
    // Polling
    // ========================================================================

    async fn wait_provisioned(&self, record: &mut MachineRecord) -> Result<()> {
        let timeout_secs = record
            .provision_timeout
            .unwrap_or_else(|| self.family().default_provision_timeout_secs());
        let budget = PollBudget::from_timeout(timeout_secs);
        info!(machine = %record.name, timeout_secs, attempts = budget.attempts(), "Waiting for instance");

        for attempt in budget {
            let found = self.query("provision poll", record).await?;
            if let Some(instance) = found.filter(|instance| instance.active) {
                record.mark_done(&instance);
                self.persist(record)?;
                info!(machine = %record.name, id = instance.id, attempt, "Instance created");
                return Ok(());
            }

            info!(machine = %record.name, attempt, "Transaction in progress");
            if !budget.is_last(attempt) {
                self.sleeper.sleep(POLL_INTERVAL).await;
            }
        }

        Err(DriverError::ProvisionTimeout {
            machine: record.name.clone(),
            minutes: timeout_secs / POLL_INTERVAL.as_secs(),
            timeout_secs,
        })
    }

    async fn wait_reachable(&self, record: &MachineRecord) -> Result<()> {
        let address = record
            .ip_address
            .clone()
            .ok_or_else(|| self.state_error("ready", record, "no ip address"))?;
        let budget = PollBudget::from_timeout(READY_TIMEOUT_SECS);

        for attempt in budget {
            let powered = self
                .query("ready", record)
                .await?
                .is_some_and(|instance| instance.power.is_on());
            if powered && self.probe.is_reachable(&address).await {
                return Ok(());
            }

            info!(machine = %record.name, attempt, powered, "Waiting until reachable");
            if !budget.is_last(attempt) {
                self.sleeper.sleep(POLL_INTERVAL).await;
            }
        }

        Err(DriverError::Unreachable {
            machine: record.name.clone(),
            address,
            minutes: READY_TIMEOUT_SECS / POLL_INTERVAL.as_secs(),
        })
    }

    /// One locked instance lookup.
    async fn query(&self, operation: &'static str, record: &MachineRecord) -> Result<Option<Instance>> {
        let _guard = self.lock.acquire().await;
        self.lookup(operation, record).await
    }

    /// Find the record's instance. Bare metal servers are looked up by
    /// global identifier, the others by numeric id. Callers hold the lock.
    async fn lookup(&self, operation: &'static str, record: &MachineRecord) -> Result<Option<Instance>> {
        let family = self.family();
        let result = match (family, record.id, record.global_identifier.as_deref()) {
            (InstanceFamily::BareMetalServer, _, Some(gid))
            | (InstanceFamily::BareMetalInstance, None, Some(gid)) => {
                self.api.hardware_by_global_identifier(gid).await
            }
            (InstanceFamily::VirtualServer | InstanceFamily::BareMetalInstance, Some(id), _) => {
                self.api.instance(family.service(), id).await
            }
            _ => return Err(self.state_error(operation, record, "no instance identifier")),
        };
        result.map_err(|source| self.remote(operation, record, source))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn persist(&self, record: &mut MachineRecord) -> Result<()> {
        record.touch();
        self.store
            .save(record)
            .map_err(|source| DriverError::Persistence {
                machine: record.name.clone(),
                source,
            })
    }

    fn check_family(&self, operation: &'static str, record: &MachineRecord) -> Result<()> {
        match record.instance_family {
            Some(family) if family != self.family() => Err(self.state_error(
                operation,
                record,
                &format!("machine was allocated as {family}, driver provisions {}", self.family()),
            )),
            _ => Ok(()),
        }
    }

    fn state_error(&self, operation: &'static str, record: &MachineRecord, reason: &str) -> DriverError {
        DriverError::State {
            operation,
            machine: record.name.clone(),
            state: record.state(),
            reason: reason.to_string(),
        }
    }

    fn remote(&self, operation: &'static str, record: &MachineRecord, source: ApiError) -> DriverError {
        DriverError::RemoteApi {
            operation,
            machine: record.name.clone(),
            source,
        }
    }
}
