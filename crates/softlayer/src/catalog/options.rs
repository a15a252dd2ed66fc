//! Create-object option set for virtual servers and bare metal instances.
//!
//! The provider returns each orderable option as a loosely typed template
//! fragment. Each fragment is parsed once into a typed predicate alongside
//! the raw template that is merged into the order. Fragments whose predicate
//! attributes cannot be read are dropped at load time.

use serde_json::{Map, Value};
use tracing::debug;

use crate::api::models::{CreateObjectOptions, OptionFragment};

/// A typed predicate plus the template fragment it selects.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionEntry<P> {
    /// Attributes matched against the desired spec.
    pub predicate: P,
    /// Fragment merged into the order template.
    pub template: Map<String, Value>,
}

/// `datacenter.name` of a datacenter fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatacenterOption {
    pub name: String,
}

/// `maxMemory` (MB) of a memory fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryOption {
    pub max_memory_mb: u64,
}

/// Processor fragment attributes.
///
/// Virtual guests carry `startCpus` and optionally
/// `dedicatedAccountHostOnlyFlag`; hardware carries `processorCoreAmount`
/// and `memoryCapacity` (GB).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorOption {
    pub cores: u64,
    pub dedicated: Option<bool>,
    pub memory_capacity_gb: Option<u64>,
}

/// `networkComponents[0].maxSpeed` (Mbps) of a network fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkOption {
    pub max_speed: u64,
}

/// Item description of an operating system fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatingSystemOption {
    pub description: String,
}

/// First block device of a block-device fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDeviceOption {
    pub device: u64,
    pub capacity_gb: u64,
    pub local_disk: bool,
    /// The `blockDevices[0]` object, appended to the order's device list.
    pub block_device: Value,
}

/// Typed view over `getCreateObjectOptions`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectOptionSet {
    pub datacenters: Vec<OptionEntry<DatacenterOption>>,
    pub memory: Vec<OptionEntry<MemoryOption>>,
    pub processors: Vec<OptionEntry<ProcessorOption>>,
    pub network_components: Vec<OptionEntry<NetworkOption>>,
    pub operating_systems: Vec<OptionEntry<OperatingSystemOption>>,
    pub block_devices: Vec<OptionEntry<BlockDeviceOption>>,
    /// Raw hard-drive fragments (hardware only); the first is the default.
    pub hard_drives: Vec<Map<String, Value>>,
}

/// Read a number the provider may send as an integer or a numeric string.
pub(crate) fn number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a flag the provider may send as a bool, an integer or a string.
pub(crate) fn flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_u64().map(|n| n != 0),
        Value::String(s) => match s.as_str() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn entries<P>(
    kind: &str,
    fragments: Vec<OptionFragment>,
    parse: impl Fn(&OptionFragment) -> Option<P>,
) -> Vec<OptionEntry<P>> {
    let total = fragments.len();
    let parsed: Vec<_> = fragments
        .into_iter()
        .filter_map(|fragment| {
            parse(&fragment).map(|predicate| OptionEntry {
                predicate,
                template: fragment.template,
            })
        })
        .collect();
    if parsed.len() < total {
        debug!(kind, dropped = total - parsed.len(), "Dropped unreadable option fragments");
    }
    parsed
}

fn first_of<'a>(template: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    template.get(key)?.as_array()?.first()
}

impl ObjectOptionSet {
    /// Parse the provider's option structure.
    #[must_use]
    pub fn from_options(options: CreateObjectOptions) -> Self {
        let datacenters = entries("datacenter", options.datacenters, |f| {
            let name = f.template.get("datacenter")?.get("name")?.as_str()?;
            Some(DatacenterOption {
                name: name.to_string(),
            })
        });

        let memory = entries("memory", options.memory, |f| {
            Some(MemoryOption {
                max_memory_mb: number(f.template.get("maxMemory")?)?,
            })
        });

        let processors = entries("processors", options.processors, |f| {
            let cores = f
                .template
                .get("startCpus")
                .or_else(|| f.template.get("processorCoreAmount"))
                .and_then(number)?;
            Some(ProcessorOption {
                cores,
                dedicated: f.template.get("dedicatedAccountHostOnlyFlag").and_then(flag),
                memory_capacity_gb: f.template.get("memoryCapacity").and_then(number),
            })
        });

        let network_components = entries("network", options.network_components, |f| {
            let component = first_of(&f.template, "networkComponents")?;
            Some(NetworkOption {
                max_speed: number(component.get("maxSpeed")?)?,
            })
        });

        let operating_systems = entries("operating system", options.operating_systems, |f| {
            Some(OperatingSystemOption {
                description: f.item_price.as_ref()?.description()?.to_string(),
            })
        });

        let block_devices = entries("block device", options.block_devices, |f| {
            let device = first_of(&f.template, "blockDevices")?;
            Some(BlockDeviceOption {
                device: number(device.get("device")?)?,
                capacity_gb: number(device.get("diskImage")?.get("capacity")?)?,
                local_disk: f.template.get("localDiskFlag").and_then(flag)?,
                block_device: device.clone(),
            })
        });

        Self {
            datacenters,
            memory,
            processors,
            network_components,
            operating_systems,
            block_devices,
            hard_drives: options.hard_drives.into_iter().map(|f| f.template).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> CreateObjectOptions {
        serde_json::from_value(serde_json::json!({
            "datacenters": [
                {"template": {"datacenter": {"name": "ams01"}}},
                {"template": {"datacenter": {"name": "wdc01"}}}
            ],
            "memory": [
                {"template": {"maxMemory": 1024}},
                {"template": {"maxMemory": "8192"}}
            ],
            "processors": [
                {"template": {"startCpus": 4}},
                {"template": {"startCpus": 4, "dedicatedAccountHostOnlyFlag": true}}
            ],
            "networkComponents": [
                {"template": {"networkComponents": [{"maxSpeed": 100}]}}
            ],
            "operatingSystems": [
                {
                    "itemPrice": {"item": {"description": "Ubuntu Linux 14.04 LTS Trusty Tahr - Minimal Install (64 bit)"}},
                    "template": {"operatingSystemReferenceCode": "UBUNTU_14_64"}
                },
                {"template": {"operatingSystemReferenceCode": "NO_DESCRIPTION"}}
            ],
            "blockDevices": [
                {"template": {"blockDevices": [{"device": "0", "diskImage": {"capacity": 25}}], "localDiskFlag": true}},
                {"template": {"blockDevices": [{"device": "2", "diskImage": {"capacity": 100}}], "localDiskFlag": false}}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_fragments_parse_into_typed_entries() {
        let set = ObjectOptionSet::from_options(options());

        assert_eq!(set.datacenters[1].predicate.name, "wdc01");
        assert_eq!(set.memory[1].predicate.max_memory_mb, 8192);
        assert_eq!(set.processors[0].predicate.dedicated, None);
        assert_eq!(set.processors[1].predicate.dedicated, Some(true));
        assert_eq!(set.network_components[0].predicate.max_speed, 100);
        assert_eq!(set.block_devices[1].predicate.device, 2);
        assert_eq!(set.block_devices[1].predicate.capacity_gb, 100);
        assert!(!set.block_devices[1].predicate.local_disk);
        assert!(set.hard_drives.is_empty());
    }

    #[test]
    fn test_unreadable_fragments_dropped() {
        let set = ObjectOptionSet::from_options(options());
        assert_eq!(set.operating_systems.len(), 1);
        assert_eq!(
            set.operating_systems[0].template["operatingSystemReferenceCode"],
            "UBUNTU_14_64"
        );
    }

    #[test]
    fn test_lenient_scalars() {
        assert_eq!(number(&Value::from("42")), Some(42));
        assert_eq!(number(&Value::from(7)), Some(7));
        assert_eq!(number(&Value::Null), None);
        assert_eq!(flag(&Value::from(1)), Some(true));
        assert_eq!(flag(&Value::from("false")), Some(false));
        assert_eq!(flag(&Value::from("maybe")), None);
    }
}
