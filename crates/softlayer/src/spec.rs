//! Desired machine specification.
//!
//! Every attribute is optional at the type level so that a missing field is
//! reported by [`crate::validate`] with its name rather than as a parse
//! error. The legacy option names (`os_name`, `server_disks`,
//! `server_disks_max`, `storage_groups`, `hard_drives`) are accepted as
//! aliases.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DriverError;
use crate::family::InstanceFamily;

/// Billing period of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingPeriod {
    Hourly,
    Monthly,
}

impl BillingPeriod {
    /// Whether the order uses hourly pricing.
    #[must_use]
    pub fn is_hourly(self) -> bool {
        self == Self::Hourly
    }
}

impl std::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hourly => write!(f, "hourly"),
            Self::Monthly => write!(f, "monthly"),
        }
    }
}

/// Desired machine, as authored by the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesiredSpec {
    /// Hourly or monthly billing.
    pub billing_period: Option<BillingPeriod>,
    /// Datacenter code (`wdc01`) or long name (`Washington 1`).
    pub datacenter: Option<String>,
    /// Processor requirements.
    pub cpu: Option<CpuSpec>,
    /// RAM in GB.
    pub ram: Option<u32>,
    /// Operating system description, matched against catalog text.
    #[serde(alias = "os_name")]
    pub os_image: Option<String>,
    /// Host naming and uplink.
    pub network: Option<NetworkSpec>,
    /// Disks and RAID layout.
    pub storage: Option<StorageSpec>,
    /// Image template global identifier to provision from.
    pub template_id: Option<String>,
    /// Label of an account SSH key to install.
    pub key_name: Option<String>,
    /// Notes attached to the instance after ordering.
    pub notes: Option<String>,
    /// Provisioning timeout override, in seconds.
    pub provision_timeout: Option<u64>,
    /// Reload the operating system of an already allocated machine.
    pub reload_os: bool,
}

/// Processor requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuSpec {
    /// Core count.
    pub cores: Option<u32>,
    /// Processor type text (bare metal servers), e.g. `Xeon 2650`.
    #[serde(rename = "type")]
    pub cpu_type: Option<String>,
    /// Dedicated (single-tenant) host.
    pub private: Option<bool>,
}

/// Host naming and uplink.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSpec {
    /// Hostname.
    pub hostname: Option<String>,
    /// Domain.
    pub domain: Option<String>,
    /// Uplink speed in Mbps.
    #[serde(alias = "network_speed")]
    pub speed: Option<u32>,
    /// Uplink item description (bare metal servers).
    pub description: Option<String>,
    /// Bandwidth item description (bare metal servers).
    pub bandwidth: Option<String>,
}

/// Disks and RAID layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSpec {
    /// Disks, in order.
    #[serde(alias = "server_disks")]
    pub disks: Vec<DiskSpec>,
    /// RAID groups (bare metal servers).
    #[serde(alias = "storage_groups")]
    pub raid_groups: Option<Vec<RaidGroup>>,
    /// Drive bays the chassis must offer (bare metal servers).
    #[serde(alias = "server_disks_max")]
    pub max_drive_bays: Option<u32>,
}

/// One disk.
///
/// Virtual servers use `capacity` + `type`; bare metal servers use
/// `seq_id` + `description`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskSpec {
    /// Capacity in GB.
    pub capacity: Option<u64>,
    /// Disk type, e.g. `LOCAL` or `SAN`.
    #[serde(rename = "type")]
    pub disk_type: Option<String>,
    /// Drive slot, zero based.
    pub seq_id: Option<u32>,
    /// Drive item description, e.g. `500GB SATA II`.
    pub description: Option<String>,
}

impl DiskSpec {
    /// Whether the disk is SAN backed.
    #[must_use]
    pub fn is_san(&self) -> bool {
        self.disk_type.as_deref().is_some_and(|t| t.contains("SAN"))
    }
}

/// RAID group over drive slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaidGroup {
    /// Array type, e.g. `RAID 1` or `JBOD`.
    #[serde(rename = "type")]
    pub raid_type: String,
    /// Drive slots (`seq_id`s) in the group.
    #[serde(alias = "hard_drives", default)]
    pub drives: Vec<u32>,
}

impl RaidGroup {
    /// Whether the group is a RAID array rather than a plain disk group
    /// such as `JBOD`.
    #[must_use]
    pub fn is_raid(&self) -> bool {
        self.raid_type.starts_with("RAID")
    }
}

impl DesiredSpec {
    /// Parse a spec from YAML.
    ///
    /// # Errors
    /// Returns [`DriverError::Config`] if the document is not a valid spec.
    pub fn from_yaml(yaml: &str) -> Result<Self, DriverError> {
        serde_yaml::from_str(yaml).map_err(|e| DriverError::Config(format!("invalid spec: {e}")))
    }

    /// Load a spec from a YAML file.
    ///
    /// # Errors
    /// Returns [`DriverError::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, DriverError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DriverError::Config(format!("cannot read spec {}: {e}", path.display()))
        })?;
        Self::from_yaml(&content)
    }

    /// Provisioning timeout for the given family, honouring the override.
    #[must_use]
    pub fn provision_timeout_secs(&self, family: InstanceFamily) -> u64 {
        self.provision_timeout
            .unwrap_or_else(|| family.default_provision_timeout_secs())
    }

    /// Hostname, if set.
    #[must_use]
    pub fn hostname(&self) -> Option<&str> {
        self.network.as_ref()?.hostname.as_deref()
    }

    /// Domain, if set.
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.network.as_ref()?.domain.as_deref()
    }

    /// Requested disks, empty if no storage block.
    #[must_use]
    pub fn disks(&self) -> &[DiskSpec] {
        match &self.storage {
            Some(storage) => &storage.disks,
            None => &[],
        }
    }

    /// Requested RAID groups, empty if none.
    #[must_use]
    pub fn raid_groups(&self) -> &[RaidGroup] {
        self.storage
            .as_ref()
            .and_then(|s| s.raid_groups.as_deref())
            .unwrap_or(&[])
    }

    /// Number of requested groups that are RAID arrays. This count, not the
    /// group count, picks the RAID controller.
    #[must_use]
    pub fn raid_array_count(&self) -> usize {
        self.raid_groups().iter().filter(|g| g.is_raid()).count()
    }

    /// Whether hourly billing was requested.
    #[must_use]
    pub fn is_hourly(&self) -> bool {
        self.billing_period.is_some_and(BillingPeriod::is_hourly)
    }
}
