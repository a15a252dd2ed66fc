//! SoftLayer REST API client implementation.
//!
//! Uses the SoftLayer REST endpoint (`/rest/v3.1/<Service>/<id>/<method>.json`)
//! with HTTP basic authentication (username + API key).
//! API Documentation: <https://sldn.softlayer.com/reference/softlayerapi/>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::models::{
    ApiErrorBody, BillingItem, ConfigurationEntry, CreateObjectOptions, Datacenter,
    HardwareObject, ItemPrice, OrderReceipt, Parameters, ProductPackage, SshKey,
    VirtualGuestObject,
};
use super::traits::{ApiError, Instance, PowerState, Service, SoftLayerApi};

/// Base URL for the SoftLayer REST API.
pub const API_BASE_URL: &str = "https://api.softlayer.com/rest/v3.1";

/// Default timeout for API requests. Catalog calls on large packages are slow.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

const VIRTUAL_GUEST_MASK: &str = "mask[id,globalIdentifier,fullyQualifiedDomainName,\
primaryIpAddress,powerState.keyName,activeTransactions.id,operatingSystem.passwords]";

const HARDWARE_MASK: &str = "mask[id,globalIdentifier,fullyQualifiedDomainName,\
primaryIpAddress,hardwareStatus.status,operatingSystem.passwords]";

const ACCOUNT_HARDWARE_MASK: &str =
    "mask[id,globalIdentifier,fullyQualifiedDomainName,primaryIpAddress,hardwareStatus.status]";

/// SoftLayer API client.
#[derive(Clone)]
pub struct SoftLayerClient {
    /// HTTP client.
    client: Client,
    /// REST endpoint without trailing slash.
    endpoint: String,
    /// API username.
    username: String,
    /// API key.
    api_key: String,
}

impl SoftLayerClient {
    /// Create a client against the public endpoint.
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn new(username: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_endpoint(
            username,
            api_key,
            API_BASE_URL,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Create a client against a specific endpoint.
    ///
    /// # Arguments
    /// * `username` - SoftLayer API username
    /// * `api_key` - SoftLayer API key
    /// * `endpoint` - REST base URL (e.g. the private network endpoint)
    /// * `timeout` - per-request timeout
    ///
    /// # Errors
    /// Returns error if HTTP client cannot be created.
    pub fn with_endpoint(
        username: impl Into<String>,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            username: username.into(),
            api_key: api_key.into(),
        })
    }

    /// Make an authenticated GET request, optionally with an object mask.
    async fn get<T: DeserializeOwned>(&self, path: &str, mask: Option<&str>) -> Result<T, ApiError> {
        let url = format!("{}{path}", self.endpoint);
        debug!(url = %url, mask = ?mask, "GET request");

        let mut request = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.api_key));
        if let Some(mask) = mask {
            request = request.query(&[("objectMask", mask)]);
        }

        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// Make an authenticated POST request with positional parameters.
    async fn post<T, P>(&self, path: &str, parameters: P) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        P: Serialize,
    {
        let url = format!("{}{path}", self.endpoint);
        debug!(url = %url, "POST request");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.api_key))
            .json(&Parameters { parameters })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Make an authenticated DELETE request.
    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let url = format!("{}{path}", self.endpoint);
        debug!(url = %url, "DELETE request");

        let response = self
            .client
            .delete(&url)
            .basic_auth(&self.username, Some(&self.api_key))
            .send()
            .await?;

        let result: Value = self.handle_response(response).await?;
        expect_true(path, &result)
    }

    /// Handle API response, parsing JSON or the provider error body.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&text).map_err(|e| {
                warn!(error = %e, body = %text, "Failed to parse response");
                ApiError::Serialization(e)
            });
        }

        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .map(|body| match body.code {
                Some(code) => format!("{code}: {}", body.error),
                None => body.error,
            })
            .unwrap_or(text);

        if status == StatusCode::NOT_FOUND {
            Err(ApiError::NotFound(message))
        } else {
            Err(ApiError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    fn from_virtual_guest(guest: VirtualGuestObject) -> Instance {
        let credentials = guest
            .operating_system
            .as_ref()
            .and_then(|os| os.first_password())
            .cloned()
            .unwrap_or_default();

        Instance {
            id: guest.id,
            global_identifier: guest.global_identifier,
            hostname: guest.fully_qualified_domain_name,
            ip_address: guest.primary_ip_address,
            username: credentials.username,
            password: credentials.password,
            power: guest
                .power_state
                .map_or(PowerState::Unknown(String::new()), |p| {
                    PowerState::parse(&p.key_name)
                }),
            active: guest.active_transactions.is_empty(),
        }
    }

    fn from_hardware(hardware: HardwareObject, power: PowerState) -> Instance {
        let active = hardware.is_active();
        let credentials = hardware
            .operating_system
            .as_ref()
            .and_then(|os| os.first_password())
            .cloned()
            .unwrap_or_default();

        Instance {
            id: hardware.id,
            global_identifier: hardware.global_identifier,
            hostname: hardware.fully_qualified_domain_name,
            ip_address: hardware.primary_ip_address,
            username: credentials.username,
            password: credentials.password,
            power,
            active,
        }
    }

    async fn hardware_power_state(&self, id: u64) -> Result<PowerState, ApiError> {
        let raw: String = self
            .get(&format!("/SoftLayer_Hardware_Server/{id}/getServerPowerState.json"), None)
            .await?;
        Ok(PowerState::parse(&raw))
    }
}

/// Methods returning a bare boolean must return `true`.
fn expect_true(call: &str, value: &Value) -> Result<(), ApiError> {
    match value {
        Value::Bool(false) => Err(ApiError::UnexpectedResponse {
            call: call.to_string(),
            detail: "provider returned false".to_string(),
        }),
        _ => Ok(()),
    }
}

#[async_trait]
impl SoftLayerApi for SoftLayerClient {
    async fn create_object_options(
        &self,
        service: Service,
    ) -> Result<CreateObjectOptions, ApiError> {
        self.get(&format!("/{service}/getCreateObjectOptions.json"), None)
            .await
    }

    async fn bare_metal_packages(&self) -> Result<Vec<ProductPackage>, ApiError> {
        let packages: Vec<ProductPackage> = self
            .get(
                "/SoftLayer_Product_Package/getAllObjects.json",
                Some("mask[id,name,type.keyName]"),
            )
            .await?;

        Ok(packages.into_iter().filter(ProductPackage::is_bare_metal).collect())
    }

    async fn available_storage_units(&self, package_id: u64) -> Result<u32, ApiError> {
        let units: Value = self
            .get(
                &format!("/SoftLayer_Product_Package/{package_id}/getAvailableStorageUnits.json"),
                None,
            )
            .await?;

        // Returned as a number or a numeric string depending on the package.
        let parsed = match &units {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| ApiError::UnexpectedResponse {
                call: "getAvailableStorageUnits".to_string(),
                detail: units.to_string(),
            })
    }

    async fn package_configuration(
        &self,
        package_id: u64,
    ) -> Result<Vec<ConfigurationEntry>, ApiError> {
        self.get(
            &format!("/SoftLayer_Product_Package/{package_id}/getConfiguration.json"),
            Some("mask[itemCategory,isRequired]"),
        )
        .await
    }

    async fn package_item_prices(&self, package_id: u64) -> Result<Vec<ItemPrice>, ApiError> {
        self.get(
            &format!("/SoftLayer_Product_Package/{package_id}/getItemPrices.json"),
            Some("mask[id,item.description,categories.id]"),
        )
        .await
    }

    async fn datacenters(&self) -> Result<Vec<Datacenter>, ApiError> {
        self.get("/SoftLayer_Location_Datacenter/getDatacenters.json", None)
            .await
    }

    async fn ssh_keys(&self) -> Result<Vec<SshKey>, ApiError> {
        self.get("/SoftLayer_Account/getSshKeys.json", None).await
    }

    async fn create_ssh_key(&self, label: &str, public_key: &str) -> Result<SshKey, ApiError> {
        info!(label = %label, "Creating SSH key");
        self.post(
            "/SoftLayer_Security_Ssh_Key/createObject.json",
            [json!({ "key": public_key, "label": label })],
        )
        .await
    }

    async fn generate_order_template(
        &self,
        service: Service,
        template: &Value,
    ) -> Result<Value, ApiError> {
        self.post(&format!("/{service}/generateOrderTemplate.json"), [template])
            .await
    }

    async fn verify_order(&self, order: &Value) -> Result<Value, ApiError> {
        self.post("/SoftLayer_Product_Order/verifyOrder.json", [order])
            .await
    }

    async fn place_order(&self, order: &Value) -> Result<OrderReceipt, ApiError> {
        let receipt: OrderReceipt = self
            .post("/SoftLayer_Product_Order/placeOrder.json", [order])
            .await?;
        info!(order_id = ?receipt.order_id, "Order placed");
        Ok(receipt)
    }

    async fn edit_notes(&self, service: Service, id: u64, notes: &str) -> Result<(), ApiError> {
        let result: Value = self
            .post(
                &format!("/{service}/{id}/editObject.json"),
                [json!({ "notes": notes })],
            )
            .await?;
        expect_true("editObject", &result)
    }

    async fn instance(&self, service: Service, id: u64) -> Result<Option<Instance>, ApiError> {
        let path = format!("/{service}/{id}/getObject.json");
        match service {
            Service::VirtualGuest => {
                match self.get::<VirtualGuestObject>(&path, Some(VIRTUAL_GUEST_MASK)).await {
                    Ok(guest) => Ok(Some(Self::from_virtual_guest(guest))),
                    Err(ApiError::NotFound(_)) => Ok(None),
                    Err(e) => Err(e),
                }
            }
            Service::HardwareServer => {
                let hardware = match self.get::<HardwareObject>(&path, Some(HARDWARE_MASK)).await {
                    Ok(hardware) => hardware,
                    Err(ApiError::NotFound(_)) => return Ok(None),
                    Err(e) => return Err(e),
                };
                let power = self.hardware_power_state(id).await?;
                Ok(Some(Self::from_hardware(hardware, power)))
            }
        }
    }

    async fn hardware_by_global_identifier(
        &self,
        global_identifier: &str,
    ) -> Result<Option<Instance>, ApiError> {
        let hardware: Vec<HardwareObject> = self
            .get("/SoftLayer_Account/getHardware.json", Some(ACCOUNT_HARDWARE_MASK))
            .await?;

        let Some(found) = hardware
            .into_iter()
            .find(|hw| hw.global_identifier.as_deref() == Some(global_identifier))
        else {
            return Ok(None);
        };

        if !found.is_active() {
            return Ok(Some(Self::from_hardware(
                found,
                PowerState::Unknown(String::new()),
            )));
        }

        self.instance(Service::HardwareServer, found.id).await
    }

    async fn power_on(&self, service: Service, id: u64) -> Result<(), ApiError> {
        info!(service = %service, id, "Powering on");
        let result: Value = self
            .get(&format!("/{service}/{id}/powerOn.json"), None)
            .await?;
        expect_true("powerOn", &result)
    }

    async fn power_off(&self, service: Service, id: u64) -> Result<(), ApiError> {
        let method = match service {
            Service::VirtualGuest => "powerOffSoft",
            Service::HardwareServer => "powerOff",
        };
        info!(service = %service, id, method, "Powering off");
        let result: Value = self
            .get(&format!("/{service}/{id}/{method}.json"), None)
            .await?;
        expect_true(method, &result)
    }

    async fn delete_instance(&self, service: Service, id: u64) -> Result<(), ApiError> {
        info!(service = %service, id, "Deleting instance");
        self.delete(&format!("/{service}/{id}.json")).await
    }

    async fn billing_item(&self, hardware_id: u64) -> Result<BillingItem, ApiError> {
        self.get(
            &format!("/SoftLayer_Hardware_Server/{hardware_id}/getBillingItem.json"),
            None,
        )
        .await
    }

    async fn cancel_billing_item(
        &self,
        billing_item_id: u64,
        reason: &str,
    ) -> Result<(), ApiError> {
        info!(billing_item_id, reason = %reason, "Cancelling billing item");
        // cancelImmediately = false, cancelAssociatedBillingItems = true
        let result: Value = self
            .post(
                &format!("/SoftLayer_Billing_Item/{billing_item_id}/cancelItem.json"),
                json!([false, true, reason]),
            )
            .await?;
        expect_true("cancelItem", &result)
    }

    async fn reload_os(&self, service: Service, id: u64) -> Result<(), ApiError> {
        info!(service = %service, id, "Reloading operating system");
        let _: Value = self
            .post(
                &format!("/{service}/{id}/reloadCurrentOperatingSystemConfiguration.json"),
                ["FORCE"],
            )
            .await?;
        Ok(())
    }
}
