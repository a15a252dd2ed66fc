//! Remote API trait and common types for the SoftLayer services.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::models::{
    BillingItem, ConfigurationEntry, CreateObjectOptions, Datacenter, ItemPrice, OrderReceipt,
    ProductPackage, SshKey,
};

/// Errors that can occur while talking to the SoftLayer API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Object not found.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The response parsed but did not carry what the call promises.
    #[error("Unexpected response from {call}: {detail}")]
    UnexpectedResponse { call: String, detail: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// SoftLayer service an instance family is ordered and managed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Service {
    /// `SoftLayer_Virtual_Guest`.
    VirtualGuest,
    /// `SoftLayer_Hardware_Server`.
    HardwareServer,
}

impl Service {
    /// Service name as used in REST paths.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::VirtualGuest => "SoftLayer_Virtual_Guest",
            Self::HardwareServer => "SoftLayer_Hardware_Server",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Power state reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    Running,
    Halted,
    Paused,
    On,
    Off,
    Unknown(String),
}

impl PowerState {
    /// Parse a provider power key name (`RUNNING`, `on`, ...).
    #[must_use]
    pub fn parse(key_name: &str) -> Self {
        match key_name.trim().to_uppercase().as_str() {
            "RUNNING" => Self::Running,
            "HALTED" => Self::Halted,
            "PAUSED" => Self::Paused,
            "ON" => Self::On,
            "OFF" => Self::Off,
            _ => Self::Unknown(key_name.to_string()),
        }
    }

    /// Whether the machine is powered on.
    #[must_use]
    pub fn is_on(&self) -> bool {
        matches!(self, Self::Running | Self::On)
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "RUNNING"),
            Self::Halted => write!(f, "HALTED"),
            Self::Paused => write!(f, "PAUSED"),
            Self::On => write!(f, "ON"),
            Self::Off => write!(f, "OFF"),
            Self::Unknown(raw) => write!(f, "{raw}"),
        }
    }
}

/// A provisioned (or provisioning) instance as seen by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Numeric instance id.
    pub id: u64,
    /// Global identifier assigned at order time.
    pub global_identifier: Option<String>,
    /// Fully qualified domain name.
    pub hostname: Option<String>,
    /// Primary public IP address.
    pub ip_address: Option<String>,
    /// Operating system username.
    pub username: Option<String>,
    /// Operating system password.
    pub password: Option<String>,
    /// Current power state.
    pub power: PowerState,
    /// False while the provider still has transactions running against the
    /// instance or the hardware is not `ACTIVE`.
    pub active: bool,
}

/// Trait over the subset of the SoftLayer API the driver uses.
///
/// Every method is a single logical remote interaction. Serialization of
/// calls is the caller's concern (see [`crate::lock::ApiLock`]).
#[async_trait]
pub trait SoftLayerApi: Send + Sync {
    /// `getCreateObjectOptions` of the given service.
    async fn create_object_options(&self, service: Service)
        -> Result<CreateObjectOptions, ApiError>;

    /// All orderable bare-metal-server packages.
    async fn bare_metal_packages(&self) -> Result<Vec<ProductPackage>, ApiError>;

    /// Number of drive bays a package offers.
    async fn available_storage_units(&self, package_id: u64) -> Result<u32, ApiError>;

    /// Category configuration (with required flags) of a package.
    async fn package_configuration(
        &self,
        package_id: u64,
    ) -> Result<Vec<ConfigurationEntry>, ApiError>;

    /// Priced items of a package with their category associations.
    async fn package_item_prices(&self, package_id: u64) -> Result<Vec<ItemPrice>, ApiError>;

    /// All datacenters.
    async fn datacenters(&self) -> Result<Vec<Datacenter>, ApiError>;

    /// SSH keys registered on the account.
    async fn ssh_keys(&self) -> Result<Vec<SshKey>, ApiError>;

    /// Register a public key on the account.
    async fn create_ssh_key(&self, label: &str, public_key: &str) -> Result<SshKey, ApiError>;

    /// Expand a create-object template into an order container.
    async fn generate_order_template(
        &self,
        service: Service,
        template: &Value,
    ) -> Result<Value, ApiError>;

    /// Dry-run verification of an order container.
    async fn verify_order(&self, order: &Value) -> Result<Value, ApiError>;

    /// Place an order.
    async fn place_order(&self, order: &Value) -> Result<OrderReceipt, ApiError>;

    /// Set the notes of an instance.
    async fn edit_notes(&self, service: Service, id: u64, notes: &str) -> Result<(), ApiError>;

    /// Look up an instance by numeric id. `Ok(None)` if it does not exist yet.
    async fn instance(&self, service: Service, id: u64) -> Result<Option<Instance>, ApiError>;

    /// Look up account hardware by global identifier.
    async fn hardware_by_global_identifier(
        &self,
        global_identifier: &str,
    ) -> Result<Option<Instance>, ApiError>;

    /// Power an instance on.
    async fn power_on(&self, service: Service, id: u64) -> Result<(), ApiError>;

    /// Power an instance off: soft power-off for virtual guests, hard
    /// power-off for hardware.
    async fn power_off(&self, service: Service, id: u64) -> Result<(), ApiError>;

    /// Delete an instance directly.
    async fn delete_instance(&self, service: Service, id: u64) -> Result<(), ApiError>;

    /// Billing item of a hardware server.
    async fn billing_item(&self, hardware_id: u64) -> Result<BillingItem, ApiError>;

    /// Cancel a billing item immediately.
    async fn cancel_billing_item(&self, billing_item_id: u64, reason: &str)
        -> Result<(), ApiError>;

    /// Reload the current operating system configuration.
    async fn reload_os(&self, service: Service, id: u64) -> Result<(), ApiError>;
}
