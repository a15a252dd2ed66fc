//! Shared fixtures for driver integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use softlayer_driver::api::models::{
    BillingItem, CategoryRef, ConfigurationEntry, CreateObjectOptions, Datacenter, Item,
    ItemCategory, ItemPrice, OrderDetails, OrderReceipt, OrderedInstance, ProductPackage, SshKey,
};
use softlayer_driver::{
    ApiError, ApiLock, DesiredSpec, Instance, InstanceFamily, MemoryStore, PowerState,
    Reachability, Service, Sleeper, SoftLayerApi, SoftLayerDriver,
};

pub const WDC01_ID: u64 = 37473;
pub const BMS_PACKAGE_ID: u64 = 251;

/// Install a test subscriber when `RUST_LOG` is set.
pub fn init_tracing() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

// ============================================================================
// Fake provider
// ============================================================================

/// Scripted in-memory provider that records every call.
pub struct FakeApi {
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    pub fail_datacenters: bool,
    pub virtual_guest_options: CreateObjectOptions,
    pub hardware_options: CreateObjectOptions,
    pub package_configuration: Vec<ConfigurationEntry>,
    pub package_prices: Vec<ItemPrice>,
    pub ssh_keys: Mutex<Vec<SshKey>>,
    pub receipt: OrderReceipt,
    /// Answers of successive instance lookups; `settled` once drained.
    pub lookups: Mutex<VecDeque<Option<Instance>>>,
    pub settled: Mutex<Option<Instance>>,
    pub verified: Mutex<Vec<Value>>,
    pub cancel_reasons: Mutex<Vec<String>>,
    pub notes: Mutex<Vec<(u64, String)>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            fail_datacenters: false,
            virtual_guest_options: virtual_guest_options(),
            hardware_options: hardware_options(),
            package_configuration: package_configuration(),
            package_prices: package_prices(),
            ssh_keys: Mutex::new(vec![SshKey {
                id: 77,
                label: "deploy".to_string(),
                key: Some("ssh-rsa AAAA deploy@host".to_string()),
            }]),
            receipt: receipt_for(InstanceFamily::VirtualServer),
            lookups: Mutex::new(VecDeque::new()),
            settled: Mutex::new(None),
            verified: Mutex::new(Vec::new()),
            cancel_reasons: Mutex::new(Vec::new()),
            notes: Mutex::new(Vec::new()),
        }
    }

    pub fn for_family(family: InstanceFamily) -> Self {
        Self {
            receipt: receipt_for(family),
            ..Self::new()
        }
    }

    /// A provider whose datacenter listing fails.
    pub fn failing_datacenters() -> Self {
        Self {
            fail_datacenters: true,
            ..Self::new()
        }
    }

    /// Queue lookup answers, returned in order.
    pub fn script(&self, answers: Vec<Option<Instance>>) {
        self.lookups.lock().unwrap().extend(answers);
    }

    /// Answer every lookup after the scripted ones.
    pub fn settle(&self, instance: Option<Instance>) {
        *self.settled.lock().unwrap() = instance;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Most calls ever in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn next_lookup(&self) -> Option<Instance> {
        let scripted = self.lookups.lock().unwrap().pop_front();
        match scripted {
            Some(answer) => answer,
            None => self.settled.lock().unwrap().clone(),
        }
    }
}

#[async_trait]
impl SoftLayerApi for FakeApi {
    async fn create_object_options(
        &self,
        service: Service,
    ) -> Result<CreateObjectOptions, ApiError> {
        self.enter("create_object_options").await;
        Ok(match service {
            Service::VirtualGuest => self.virtual_guest_options.clone(),
            Service::HardwareServer => self.hardware_options.clone(),
        })
    }

    async fn bare_metal_packages(&self) -> Result<Vec<ProductPackage>, ApiError> {
        self.enter("bare_metal_packages").await;
        Ok(serde_json::from_value(json!([
            {"id": BMS_PACKAGE_ID, "name": "Dual Xeon 2600", "type": {"keyName": "BARE_METAL_CPU"}}
        ]))?)
    }

    async fn available_storage_units(&self, _package_id: u64) -> Result<u32, ApiError> {
        self.enter("available_storage_units").await;
        Ok(4)
    }

    async fn package_configuration(
        &self,
        _package_id: u64,
    ) -> Result<Vec<ConfigurationEntry>, ApiError> {
        self.enter("package_configuration").await;
        Ok(self.package_configuration.clone())
    }

    async fn package_item_prices(&self, _package_id: u64) -> Result<Vec<ItemPrice>, ApiError> {
        self.enter("package_item_prices").await;
        Ok(self.package_prices.clone())
    }

    async fn datacenters(&self) -> Result<Vec<Datacenter>, ApiError> {
        self.enter("datacenters").await;
        if self.fail_datacenters {
            return Err(ApiError::Api {
                status: 500,
                message: "SoftLayer_Exception_Public: internal error".to_string(),
            });
        }
        Ok(datacenters())
    }

    async fn ssh_keys(&self) -> Result<Vec<SshKey>, ApiError> {
        self.enter("ssh_keys").await;
        Ok(self.ssh_keys.lock().unwrap().clone())
    }

    async fn create_ssh_key(&self, label: &str, public_key: &str) -> Result<SshKey, ApiError> {
        self.enter("create_ssh_key").await;
        let key = SshKey {
            id: 88,
            label: label.to_string(),
            key: Some(public_key.to_string()),
        };
        self.ssh_keys.lock().unwrap().push(key.clone());
        Ok(key)
    }

    async fn generate_order_template(
        &self,
        service: Service,
        template: &Value,
    ) -> Result<Value, ApiError> {
        self.enter("generate_order_template").await;
        let complex_type = match service {
            Service::VirtualGuest => "SoftLayer_Container_Product_Order_Virtual_Guest",
            Service::HardwareServer => "SoftLayer_Container_Product_Order_Hardware_Server",
        };
        Ok(json!({ "complexType": complex_type, "orderTemplate": template }))
    }

    async fn verify_order(&self, order: &Value) -> Result<Value, ApiError> {
        self.enter("verify_order").await;
        self.verified.lock().unwrap().push(order.clone());
        Ok(order.clone())
    }

    async fn place_order(&self, _order: &Value) -> Result<OrderReceipt, ApiError> {
        self.enter("place_order").await;
        Ok(self.receipt.clone())
    }

    async fn edit_notes(&self, _service: Service, id: u64, notes: &str) -> Result<(), ApiError> {
        self.enter("edit_notes").await;
        self.notes.lock().unwrap().push((id, notes.to_string()));
        Ok(())
    }

    async fn instance(&self, _service: Service, _id: u64) -> Result<Option<Instance>, ApiError> {
        self.enter("instance").await;
        Ok(self.next_lookup())
    }

    async fn hardware_by_global_identifier(
        &self,
        _global_identifier: &str,
    ) -> Result<Option<Instance>, ApiError> {
        self.enter("hardware_by_global_identifier").await;
        Ok(self.next_lookup())
    }

    async fn power_on(&self, _service: Service, _id: u64) -> Result<(), ApiError> {
        self.enter("power_on").await;
        let mut settled = self.settled.lock().unwrap();
        if let Some(instance) = settled.as_mut() {
            instance.power = PowerState::Running;
        }
        Ok(())
    }

    async fn power_off(&self, _service: Service, _id: u64) -> Result<(), ApiError> {
        self.enter("power_off").await;
        Ok(())
    }

    async fn delete_instance(&self, _service: Service, _id: u64) -> Result<(), ApiError> {
        self.enter("delete_instance").await;
        Ok(())
    }

    async fn billing_item(&self, _hardware_id: u64) -> Result<BillingItem, ApiError> {
        self.enter("billing_item").await;
        Ok(BillingItem { id: 4242 })
    }

    async fn cancel_billing_item(
        &self,
        _billing_item_id: u64,
        reason: &str,
    ) -> Result<(), ApiError> {
        self.enter("cancel_billing_item").await;
        self.cancel_reasons.lock().unwrap().push(reason.to_string());
        Ok(())
    }

    async fn reload_os(&self, _service: Service, _id: u64) -> Result<(), ApiError> {
        self.enter("reload_os").await;
        Ok(())
    }
}

// ============================================================================
// Time and reachability
// ============================================================================

/// Records requested delays instead of sleeping.
#[derive(Default)]
pub struct CountingSleeper {
    sleeps: AtomicUsize,
}

impl CountingSleeper {
    pub fn sleeps(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sleeper for CountingSleeper {
    async fn sleep(&self, duration: Duration) {
        assert_eq!(duration, Duration::from_secs(60));
        self.sleeps.fetch_add(1, Ordering::SeqCst);
    }
}

/// Reachability answer set by the test.
pub struct FakeProbe {
    reachable: AtomicBool,
    probes: AtomicUsize,
}

impl FakeProbe {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reachability for FakeProbe {
    async fn is_reachable(&self, _address: &str) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.reachable.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub api: Arc<FakeApi>,
    pub store: Arc<MemoryStore>,
    pub sleeper: Arc<CountingSleeper>,
    pub probe: Arc<FakeProbe>,
    pub driver: SoftLayerDriver,
}

impl Harness {
    pub async fn new(family: InstanceFamily) -> Self {
        Self::with_api(FakeApi::for_family(family), family, ApiLock::serialized()).await
    }

    pub async fn with_api(api: FakeApi, family: InstanceFamily, lock: ApiLock) -> Self {
        init_tracing();
        let api = Arc::new(api);
        let store = Arc::new(MemoryStore::new());
        let sleeper = Arc::new(CountingSleeper::default());
        let probe = Arc::new(FakeProbe::new(true));

        let driver = SoftLayerDriver::new(api.clone(), family, lock, store.clone())
            .await
            .expect("catalog loads")
            .with_sleeper(sleeper.clone())
            .with_probe(probe.clone());
        api.clear_calls();

        Self {
            api,
            store,
            sleeper,
            probe,
            driver,
        }
    }
}

// ============================================================================
// Catalog fixtures
// ============================================================================

pub fn datacenters() -> Vec<Datacenter> {
    vec![
        Datacenter {
            id: 265_592,
            name: "ams01".to_string(),
            long_name: "Amsterdam 1".to_string(),
        },
        Datacenter {
            id: WDC01_ID,
            name: "wdc01".to_string(),
            long_name: "Washington 1".to_string(),
        },
    ]
}

pub fn virtual_guest_options() -> CreateObjectOptions {
    serde_json::from_value(json!({
        "datacenters": [
            {"template": {"datacenter": {"name": "ams01"}}},
            {"template": {"datacenter": {"name": "wdc01"}}}
        ],
        "memory": [
            {"template": {"maxMemory": 4096}},
            {"template": {"maxMemory": 8192}}
        ],
        "processors": [
            {"template": {"startCpus": 2}},
            {"template": {"startCpus": 4}}
        ],
        "networkComponents": [
            {"template": {"networkComponents": [{"maxSpeed": 100}]}}
        ],
        "operatingSystems": [{
            "itemPrice": {"item": {"description": "Ubuntu Linux 14.04 LTS Trusty Tahr - Minimal Install (64 bit)"}},
            "template": {"operatingSystemReferenceCode": "UBUNTU_14_64"}
        }],
        "blockDevices": [
            {"template": {"blockDevices": [{"device": "0", "diskImage": {"capacity": 25}}], "localDiskFlag": true}},
            {"template": {"blockDevices": [{"device": "0", "diskImage": {"capacity": 100}}], "localDiskFlag": true}},
            {"template": {"blockDevices": [{"device": "2", "diskImage": {"capacity": 25}}], "localDiskFlag": true}},
            {"template": {"blockDevices": [{"device": "2", "diskImage": {"capacity": 100}}], "localDiskFlag": true}}
        ]
    }))
    .unwrap()
}

pub fn hardware_options() -> CreateObjectOptions {
    serde_json::from_value(json!({
        "datacenters": [{"template": {"datacenter": {"name": "wdc01"}}}],
        "processors": [
            {"template": {"processorCoreAmount": 4, "memoryCapacity": 8}}
        ],
        "operatingSystems": [{
            "itemPrice": {"item": {"description": "Ubuntu Linux 14.04 LTS Trusty Tahr (64 bit)"}},
            "template": {"operatingSystemReferenceCode": "UBUNTU_14_64"}
        }],
        "hardDrives": [{"template": {"hardDrives": [{"capacity": 500}]}}]
    }))
    .unwrap()
}

fn category(id: u64, name: &str, required: bool) -> ConfigurationEntry {
    ConfigurationEntry {
        item_category: ItemCategory {
            id,
            name: name.to_string(),
        },
        is_required: required,
    }
}

fn price(id: u64, categories: &[u64], description: &str) -> ItemPrice {
    ItemPrice {
        id: Some(id),
        item: Some(Item {
            description: Some(description.to_string()),
        }),
        categories: Some(categories.iter().map(|&id| CategoryRef { id }).collect()),
    }
}

pub fn package_configuration() -> Vec<ConfigurationEntry> {
    vec![
        category(1, "Server", true),
        category(3, "RAM", true),
        category(12, "Operating System", true),
        category(26, "Uplink Port Speeds", true),
        category(10, "Public Bandwidth", true),
        category(46, "Remote Management", true),
        category(13, "Primary IP Addresses", true),
        category(20, "Monitoring", true),
        category(22, "Response", true),
        category(21, "Notification", true),
        category(31, "VPN Management - Private Network", true),
        category(32, "Vulnerability Assessments & Management", true),
        category(4, "First Hard Drive", true),
        category(5, "Second Hard Drive", false),
        category(6, "Third Hard Drive", false),
        category(11, "Disk Controller", true),
        category(35, "Power Supply", true),
    ]
}

pub fn package_prices() -> Vec<ItemPrice> {
    vec![
        price(1001, &[1], "Dual Intel Xeon 2650 (8 Cores, 2.00 GHz)"),
        price(1002, &[1], "Dual Intel Xeon 2690 (16 Cores, 2.90 GHz)"),
        price(1003, &[3], "16 GB DDR3 Registered"),
        price(1004, &[3], "32 GB DDR3 Registered"),
        price(1012, &[12], "Ubuntu Linux 14.04 LTS Trusty Tahr (64 bit)"),
        price(1026, &[26], "1000"),
        price(1010, &[10], "20000 GB Bandwidth"),
        price(1046, &[46], "Reboot / KVM over IP"),
        price(1013, &[13], "1 IP Address"),
        price(1020, &[20], "Host Ping"),
        price(1022, &[22], "Automated Notification"),
        price(1021, &[21], "Email and Ticket"),
        price(1031, &[31], "Unlimited SSL VPN Users & 1 PPTP VPN User per account"),
        price(1032, &[32], "Nessus Vulnerability Assessment & Reporting"),
        price(2004, &[4, 5, 6], "500GB SATA II"),
        price(2005, &[4, 5, 6], "1.00 TB SATA"),
        price(1110, &[11], "Non-RAID"),
        price(1111, &[11], "RAID 1"),
        price(1112, &[11], "RAID"),
        price(1035, &[35], "Redundant Power Supply"),
    ]
}

pub fn receipt_for(family: InstanceFamily) -> OrderReceipt {
    let details = match family {
        InstanceFamily::VirtualServer => OrderDetails {
            virtual_guests: vec![OrderedInstance {
                id: Some(1234),
                global_identifier: Some("vg-gid".to_string()),
                hostname: Some("node".to_string()),
            }],
            hardware: Vec::new(),
        },
        InstanceFamily::BareMetalInstance => OrderDetails {
            virtual_guests: Vec::new(),
            hardware: vec![OrderedInstance {
                id: Some(5678),
                global_identifier: Some("bmi-gid".to_string()),
                hostname: Some("node".to_string()),
            }],
        },
        InstanceFamily::BareMetalServer => OrderDetails {
            virtual_guests: Vec::new(),
            hardware: vec![OrderedInstance {
                id: None,
                global_identifier: Some("bms-gid".to_string()),
                hostname: Some("node".to_string()),
            }],
        },
    };
    OrderReceipt {
        order_id: Some(9001),
        order_details: details,
    }
}

pub fn instance(id: u64, active: bool, power: PowerState) -> Instance {
    Instance {
        id,
        global_identifier: Some("gid".to_string()),
        hostname: Some("node.example.com".to_string()),
        ip_address: Some("169.55.0.10".to_string()),
        username: Some("root".to_string()),
        password: Some("s3cret".to_string()),
        power,
        active,
    }
}

// ============================================================================
// Spec fixtures
// ============================================================================

pub fn virtual_server_spec() -> DesiredSpec {
    DesiredSpec::from_yaml(
        r#"
billing_period: hourly
datacenter: wdc01
cpu: { cores: 4 }
ram: 8
os_image: "Ubuntu Linux 14.04"
network: { hostname: node, domain: example.com, speed: 100 }
storage:
  disks:
    - { capacity: 25, type: LOCAL }
    - { capacity: 100, type: LOCAL }
"#,
    )
    .unwrap()
}

pub fn bare_metal_instance_spec() -> DesiredSpec {
    DesiredSpec::from_yaml(
        r#"
billing_period: hourly
datacenter: wdc01
cpu: { cores: 4 }
ram: 8
os_image: "Ubuntu Linux 14.04"
network: { hostname: node, domain: example.com }
storage:
  disks:
    - { capacity: 500 }
"#,
    )
    .unwrap()
}

/// Bare metal server spec with the given `raid_groups` YAML.
pub fn bare_metal_server_spec(raid_groups: &str) -> DesiredSpec {
    DesiredSpec::from_yaml(&format!(
        r#"
billing_period: monthly
datacenter: wdc01
cpu: {{ cores: 8, type: "Xeon 2650" }}
ram: 16
os_image: "Ubuntu Linux 14.04 LTS Trusty Tahr (64 bit)"
network: {{ hostname: node, domain: example.com }}
storage:
  max_drive_bays: 4
  disks:
    - {{ seq_id: 0, description: "500GB SATA II" }}
    - {{ seq_id: 1, description: "500GB SATA II" }}
    - {{ seq_id: 2, description: "1.00 TB SATA" }}
  raid_groups: {raid_groups}
"#
    ))
    .unwrap()
}
