//! Order builder.
//!
//! Turns a matcher [`Resolution`] into the order container the provider
//! verifies and places:
//!
//! - create-object templates get hostname, domain, billing and SSH keys
//!   merged in, then are expanded with `generateOrderTemplate`
//! - bare metal server selections are wrapped in a hardware order envelope
//!   carrying the matched price ids

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::api::models::{OrderReceipt, OrderedInstance};
use crate::api::{ApiError, SoftLayerApi};
use crate::catalog::CatalogCache;
use crate::error::{DriverError, Result};
use crate::family::InstanceFamily;
use crate::matcher::{MatchError, PackageSelection, Resolution};
use crate::spec::DesiredSpec;
use crate::validate::{Field, ValidationError};

/// Complex type of a bare metal server order.
pub const HARDWARE_ORDER_TYPE: &str = "SoftLayer_Container_Product_Order_Hardware_Server";

/// Billing cancellation reasons accepted by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationReason {
    Unneeded,
    Closing,
    Cost,
    MigrateLarger,
    MigrateSmaller,
    Datacenter,
    Performance,
    Support,
    Sales,
    Moving,
}

impl CancellationReason {
    /// Reason text sent with the cancellation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unneeded => "No longer needed",
            Self::Closing => "Business closing down",
            Self::Cost => "Server / Upgrade Costs",
            Self::MigrateLarger => "Migrating to larger server",
            Self::MigrateSmaller => "Migrating to smaller server",
            Self::Datacenter => "Migrating to a different SoftLayer datacenter",
            Self::Performance => "Network performance / latency",
            Self::Support => "Support response / timing",
            Self::Sales => "Sales process / upgrades",
            Self::Moving => "Moving to competitor",
        }
    }
}

/// Builds, verifies and places orders for one machine.
pub struct OrderBuilder<'a> {
    api: &'a dyn SoftLayerApi,
    catalog: &'a CatalogCache,
    machine: &'a str,
}

impl<'a> OrderBuilder<'a> {
    #[must_use]
    pub fn new(api: &'a dyn SoftLayerApi, catalog: &'a CatalogCache, machine: &'a str) -> Self {
        Self {
            api,
            catalog,
            machine,
        }
    }

    fn order_error(&self, stage: &'static str) -> impl FnOnce(ApiError) -> DriverError + '_ {
        move |source| DriverError::Order {
            machine: self.machine.to_string(),
            stage,
            source,
        }
    }

    /// Resolve an account SSH key label to its id.
    ///
    /// # Errors
    /// Returns [`DriverError::Match`] if no key has the label.
    pub async fn ssh_key_id(&self, label: &str) -> Result<u64> {
        let keys = self
            .api
            .ssh_keys()
            .await
            .map_err(|source| DriverError::RemoteApi {
                operation: "ssh key lookup",
                machine: self.machine.to_string(),
                source,
            })?;
        keys.iter()
            .find(|key| key.label == label)
            .map(|key| key.id)
            .ok_or_else(|| DriverError::Match {
                machine: self.machine.to_string(),
                source: MatchError::UnknownSshKey(label.to_string()),
            })
    }

    /// Compose the order container for `resolution`.
    ///
    /// # Errors
    /// Returns [`DriverError::Order`] if template generation fails and
    /// [`DriverError::Match`] for an unknown SSH key.
    pub async fn build(&self, spec: &DesiredSpec, resolution: Resolution) -> Result<Value> {
        let key_id = match spec.key_name.as_deref() {
            Some(label) => Some(self.ssh_key_id(label).await?),
            None => None,
        };

        match resolution {
            Resolution::Template(template) => self.generate(spec, template, key_id).await,
            Resolution::Package(selection) => self.hardware_order(spec, &selection, key_id),
        }
    }

    async fn generate(
        &self,
        spec: &DesiredSpec,
        mut template: Map<String, Value>,
        key_id: Option<u64>,
    ) -> Result<Value> {
        template.insert("hostname".to_string(), json!(spec.hostname()));
        template.insert("domain".to_string(), json!(spec.domain()));
        template.insert("hourlyBillingFlag".to_string(), json!(spec.is_hourly()));
        if let Some(id) = key_id {
            template.insert("sshKeys".to_string(), json!([{ "id": id }]));
        }

        let service = self.catalog.family().service();
        debug!(machine = %self.machine, service = %service, "Generating order template");
        self.api
            .generate_order_template(service, &Value::Object(template))
            .await
            .map_err(self.order_error("generate"))
    }

    fn hardware_order(
        &self,
        spec: &DesiredSpec,
        selection: &PackageSelection,
        key_id: Option<u64>,
    ) -> Result<Value> {
        let requested = spec.datacenter.as_deref().unwrap_or_default();
        let location = self
            .catalog
            .datacenter_id(requested)
            .ok_or_else(|| DriverError::Validation {
                machine: self.machine.to_string(),
                source: ValidationError::Invalid {
                    field: Field::Datacenter,
                    value: requested.to_string(),
                    reason: "unknown datacenter",
                },
            })?;

        let prices: Vec<Value> = selection
            .price_ids
            .iter()
            .map(|id| json!({ "id": id }))
            .collect();

        let mut order = json!({
            "complexType": HARDWARE_ORDER_TYPE,
            "quantity": 1,
            "packageId": selection.package_id,
            "prices": prices,
            "hardware": [{ "hostname": spec.hostname(), "domain": spec.domain() }],
            "location": location,
            "useHourlyPricing": spec.is_hourly(),
        });

        if let Some(object) = order.as_object_mut() {
            if let Some(template_id) = spec.template_id.as_deref() {
                object.insert("imageTemplateGlobalIdentifier".to_string(), json!(template_id));
            }
            if let Some(id) = key_id {
                object.insert("sshKeys".to_string(), json!([{ "sshKeyIds": [id] }]));
            }
            if let Some(groups) = &selection.storage_groups {
                object.insert("storageGroups".to_string(), json!(groups));
            }
        }

        debug!(
            machine = %self.machine,
            package_id = selection.package_id,
            prices = selection.price_ids.len(),
            "Built hardware order"
        );
        Ok(order)
    }

    /// Verify `order` and, when `apply` is set, place it.
    ///
    /// # Errors
    /// Returns [`DriverError::Order`] with the provider's message if
    /// verification or placement is rejected.
    pub async fn submit(&self, order: &Value, apply: bool) -> Result<Option<OrderReceipt>> {
        self.api
            .verify_order(order)
            .await
            .map_err(self.order_error("verify"))?;
        info!(machine = %self.machine, "Order verified");

        if !apply {
            info!(machine = %self.machine, "Simulate mode, order not placed");
            return Ok(None);
        }

        let receipt = self
            .api
            .place_order(order)
            .await
            .map_err(self.order_error("place"))?;
        info!(machine = %self.machine, order_id = ?receipt.order_id, "Order placed");
        Ok(Some(receipt))
    }

    /// The instance a receipt created for `family`.
    ///
    /// # Errors
    /// Returns [`DriverError::Order`] if the receipt lists no instance.
    pub fn ordered_instance(
        &self,
        receipt: &OrderReceipt,
        family: InstanceFamily,
    ) -> Result<OrderedInstance> {
        let instances = match family {
            InstanceFamily::VirtualServer => &receipt.order_details.virtual_guests,
            InstanceFamily::BareMetalInstance | InstanceFamily::BareMetalServer => {
                &receipt.order_details.hardware
            }
        };
        instances.first().cloned().ok_or_else(|| {
            self.order_error("place")(ApiError::UnexpectedResponse {
                call: "placeOrder".to_string(),
                detail: "receipt lists no ordered instance".to_string(),
            })
        })
    }
}
