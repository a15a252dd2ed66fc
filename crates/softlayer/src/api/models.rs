//! SoftLayer REST request and response models.
//!
//! Field names follow the provider's camelCase JSON. Only the attributes the
//! driver reads are modelled; everything else is ignored on deserialization.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Common wrapper types
// ============================================================================

/// Request body wrapper: every REST call takes positional parameters.
#[derive(Debug, Serialize)]
pub struct Parameters<T: Serialize> {
    /// Positional method parameters.
    pub parameters: T,
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    /// Human readable error.
    pub error: String,
    /// Exception class (e.g. `SoftLayer_Exception_ObjectNotFound`).
    pub code: Option<String>,
}

/// An object that only carries a `keyName`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyNamed {
    /// Key name.
    pub key_name: String,
}

/// Accept `true`/`false`, `0`/`1` and `"0"`/`"1"` as a flag; the provider is
/// not consistent about it.
fn de_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        Value::String(s) => matches!(s.as_str(), "1" | "true" | "TRUE"),
        _ => false,
    })
}

// ============================================================================
// Create object options (virtual server / bare metal instance)
// ============================================================================

/// Response of `getCreateObjectOptions`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateObjectOptions {
    /// Block device fragments (virtual guests only).
    pub block_devices: Vec<OptionFragment>,
    /// Datacenter fragments.
    pub datacenters: Vec<OptionFragment>,
    /// Memory fragments (virtual guests only).
    pub memory: Vec<OptionFragment>,
    /// Network component fragments.
    pub network_components: Vec<OptionFragment>,
    /// Operating system fragments.
    pub operating_systems: Vec<OptionFragment>,
    /// Processor fragments.
    pub processors: Vec<OptionFragment>,
    /// Hard drive fragments (hardware only).
    pub hard_drives: Vec<OptionFragment>,
}

/// One orderable option: a template fragment plus its price item.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptionFragment {
    /// Price item describing the option.
    pub item_price: Option<ItemPrice>,
    /// Template fragment merged into the order.
    pub template: Map<String, Value>,
}

// ============================================================================
// Product packages (bare metal server)
// ============================================================================

/// Product package.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPackage {
    /// Package id.
    pub id: u64,
    /// Package name.
    #[serde(default)]
    pub name: Option<String>,
    /// Package type.
    #[serde(rename = "type", default)]
    pub package_type: Option<KeyNamed>,
}

/// Package type key names that identify bare metal server packages.
pub const BARE_METAL_PACKAGE_TYPES: [&str; 2] = ["BARE_METAL_CPU", "BARE_METAL_CORE"];

impl ProductPackage {
    /// Whether this is an orderable bare metal server package.
    #[must_use]
    pub fn is_bare_metal(&self) -> bool {
        self.package_type
            .as_ref()
            .is_some_and(|t| BARE_METAL_PACKAGE_TYPES.contains(&t.key_name.as_str()))
    }
}

/// Entry of `SoftLayer_Product_Package::getConfiguration`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationEntry {
    /// Category of the entry.
    pub item_category: ItemCategory,
    /// Whether the package requires an item of this category.
    #[serde(default, deserialize_with = "de_flag")]
    pub is_required: bool,
}

/// Item category.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCategory {
    /// Category id.
    pub id: u64,
    /// Category name.
    #[serde(default)]
    pub name: String,
}

/// Category reference on a price.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CategoryRef {
    /// Category id.
    pub id: u64,
}

/// A priced item.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemPrice {
    /// Price id (what orders reference).
    pub id: Option<u64>,
    /// Item being priced.
    pub item: Option<Item>,
    /// Categories the price is offered in.
    pub categories: Option<Vec<CategoryRef>>,
}

impl ItemPrice {
    /// Item description, if present.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.item.as_ref()?.description.as_deref()
    }
}

/// Product item.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Item {
    /// Free-text description, the only stable handle for some attributes.
    pub description: Option<String>,
}

// ============================================================================
// Account objects
// ============================================================================

/// Datacenter location.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Datacenter {
    /// Location id.
    pub id: u64,
    /// Short name (e.g. `wdc01`).
    pub name: String,
    /// Long name (e.g. `Washington 1`).
    #[serde(default)]
    pub long_name: String,
}

/// SSH key registered on the account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SshKey {
    /// Key id.
    pub id: u64,
    /// Key label.
    #[serde(default)]
    pub label: String,
    /// Public key text.
    #[serde(default)]
    pub key: Option<String>,
}

/// Billing item.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BillingItem {
    /// Billing item id.
    pub id: u64,
}

// ============================================================================
// Orders
// ============================================================================

/// Receipt returned by `placeOrder`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderReceipt {
    /// Order id.
    pub order_id: Option<u64>,
    /// Order details.
    pub order_details: OrderDetails,
}

/// Details of a placed order.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderDetails {
    /// Ordered virtual guests.
    pub virtual_guests: Vec<OrderedInstance>,
    /// Ordered hardware.
    pub hardware: Vec<OrderedInstance>,
}

/// Instance as it appears in an order receipt.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderedInstance {
    /// Numeric id, if already assigned.
    pub id: Option<u64>,
    /// Global identifier.
    pub global_identifier: Option<String>,
    /// Hostname.
    pub hostname: Option<String>,
}

// ============================================================================
// Instances
// ============================================================================

/// OS credentials.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Password {
    /// Username.
    pub username: Option<String>,
    /// Password.
    pub password: Option<String>,
}

/// Operating system with passwords.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OperatingSystem {
    /// Credentials.
    pub passwords: Vec<Password>,
}

impl OperatingSystem {
    /// First credential pair.
    #[must_use]
    pub fn first_password(&self) -> Option<&Password> {
        self.passwords.first()
    }
}

/// `SoftLayer_Virtual_Guest` object.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualGuestObject {
    /// Guest id.
    pub id: u64,
    /// Global identifier.
    #[serde(default)]
    pub global_identifier: Option<String>,
    /// FQDN.
    #[serde(default)]
    pub fully_qualified_domain_name: Option<String>,
    /// Primary IP.
    #[serde(default)]
    pub primary_ip_address: Option<String>,
    /// Power state.
    #[serde(default)]
    pub power_state: Option<KeyNamed>,
    /// Transactions still running against the guest.
    #[serde(default)]
    pub active_transactions: Vec<Value>,
    /// Operating system.
    #[serde(default)]
    pub operating_system: Option<OperatingSystem>,
}

/// Hardware status.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HardwareStatus {
    /// Status (e.g. `ACTIVE`).
    pub status: String,
}

/// `SoftLayer_Hardware_Server` object.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareObject {
    /// Hardware id.
    pub id: u64,
    /// Global identifier.
    #[serde(default)]
    pub global_identifier: Option<String>,
    /// FQDN.
    #[serde(default)]
    pub fully_qualified_domain_name: Option<String>,
    /// Primary IP.
    #[serde(default)]
    pub primary_ip_address: Option<String>,
    /// Hardware status.
    #[serde(default)]
    pub hardware_status: Option<HardwareStatus>,
    /// Operating system.
    #[serde(default)]
    pub operating_system: Option<OperatingSystem>,
}

impl HardwareObject {
    /// Whether provisioning has finished.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.hardware_status
            .as_ref()
            .is_some_and(|s| s.status == "ACTIVE")
    }
}
