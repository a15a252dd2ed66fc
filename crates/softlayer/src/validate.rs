//! Family-specific validation of a desired spec.
//!
//! Runs before any matching. The first failing rule is reported.

use std::collections::HashSet;

use thiserror::Error;

use crate::catalog::DatacenterTable;
use crate::family::InstanceFamily;
use crate::matcher::package::{raid_array_type_id, DRIVE_SLOT_CATEGORIES};
use crate::spec::DesiredSpec;

/// A desired-spec attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    BillingPeriod,
    OsImage,
    Ram,
    Datacenter,
    Disks,
    DiskCapacity,
    DiskSeqId,
    DiskDescription,
    CpuCores,
    CpuType,
    RaidGroups,
    RaidType,
    RaidDrives,
    MaxDriveBays,
    Network,
    Hostname,
    Domain,
}

impl Field {
    /// Dotted path of the attribute in the spec document.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BillingPeriod => "billing_period",
            Self::OsImage => "os_image",
            Self::Ram => "ram",
            Self::Datacenter => "datacenter",
            Self::Disks => "storage.disks",
            Self::DiskCapacity => "storage.disks[].capacity",
            Self::DiskSeqId => "storage.disks[].seq_id",
            Self::DiskDescription => "storage.disks[].description",
            Self::CpuCores => "cpu.cores",
            Self::CpuType => "cpu.type",
            Self::RaidGroups => "storage.raid_groups",
            Self::RaidType => "storage.raid_groups[].type",
            Self::RaidDrives => "storage.raid_groups[].drives",
            Self::MaxDriveBays => "storage.max_drive_bays",
            Self::Network => "network",
            Self::Hostname => "network.hostname",
            Self::Domain => "network.domain",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a desired spec was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required attribute is absent.
    #[error("{0} is missing")]
    Missing(Field),

    /// An attribute is present but unusable.
    #[error("{field} has invalid value '{value}': {reason}")]
    Invalid {
        field: Field,
        value: String,
        reason: &'static str,
    },
}

impl ValidationError {
    /// The offending attribute.
    #[must_use]
    pub fn field(&self) -> Field {
        match self {
            Self::Missing(field) | Self::Invalid { field, .. } => *field,
        }
    }
}

fn invalid(field: Field, value: impl ToString, reason: &'static str) -> ValidationError {
    ValidationError::Invalid {
        field,
        value: value.to_string(),
        reason,
    }
}

/// Validate `spec` for `family`. Datacenters are resolved against the
/// cached datacenter table.
///
/// # Errors
/// Returns the first [`ValidationError`] encountered.
pub fn validate(
    spec: &DesiredSpec,
    family: InstanceFamily,
    datacenters: &DatacenterTable,
) -> Result<(), ValidationError> {
    let billing = spec
        .billing_period
        .ok_or(ValidationError::Missing(Field::BillingPeriod))?;

    if spec.os_image.as_deref().map_or(true, str::is_empty) {
        return Err(ValidationError::Missing(Field::OsImage));
    }

    match spec.ram {
        None => return Err(ValidationError::Missing(Field::Ram)),
        Some(0) => return Err(invalid(Field::Ram, 0, "must be at least 1 GB")),
        Some(_) => {}
    }

    let datacenter = spec
        .datacenter
        .as_deref()
        .ok_or(ValidationError::Missing(Field::Datacenter))?;
    if datacenters.resolve(datacenter).is_none() {
        return Err(invalid(Field::Datacenter, datacenter, "unknown datacenter"));
    }

    if spec.disks().is_empty() {
        return Err(ValidationError::Missing(Field::Disks));
    }

    let cpu = spec.cpu.as_ref().ok_or(ValidationError::Missing(Field::CpuCores))?;
    match cpu.cores {
        None => return Err(ValidationError::Missing(Field::CpuCores)),
        Some(0) => return Err(invalid(Field::CpuCores, 0, "must be at least 1")),
        Some(_) => {}
    }

    match family {
        InstanceFamily::VirtualServer => {
            if spec.disks().iter().any(|d| d.capacity.is_none()) {
                return Err(ValidationError::Missing(Field::DiskCapacity));
            }
        }
        InstanceFamily::BareMetalInstance => {}
        InstanceFamily::BareMetalServer => {
            if cpu.cpu_type.as_deref().map_or(true, str::is_empty) {
                return Err(ValidationError::Missing(Field::CpuType));
            }
            if billing.is_hourly() {
                return Err(invalid(
                    Field::BillingPeriod,
                    billing,
                    "bare metal servers are billed monthly",
                ));
            }
            validate_bare_metal_storage(spec)?;
        }
    }

    let network = spec
        .network
        .as_ref()
        .ok_or(ValidationError::Missing(Field::Network))?;
    if network.hostname.as_deref().map_or(true, str::is_empty) {
        return Err(ValidationError::Missing(Field::Hostname));
    }
    if network.domain.as_deref().map_or(true, str::is_empty) {
        return Err(ValidationError::Missing(Field::Domain));
    }

    Ok(())
}

fn validate_bare_metal_storage(spec: &DesiredSpec) -> Result<(), ValidationError> {
    let Some(storage) = spec.storage.as_ref() else {
        return Err(ValidationError::Missing(Field::Disks));
    };
    let groups = storage
        .raid_groups
        .as_ref()
        .ok_or(ValidationError::Missing(Field::RaidGroups))?;
    let bays = storage
        .max_drive_bays
        .ok_or(ValidationError::Missing(Field::MaxDriveBays))?;
    if (bays as usize) < storage.disks.len() {
        return Err(invalid(
            Field::MaxDriveBays,
            bays,
            "fewer drive bays than requested disks",
        ));
    }

    let mut slots = HashSet::new();
    for disk in &storage.disks {
        let seq_id = disk.seq_id.ok_or(ValidationError::Missing(Field::DiskSeqId))?;
        if seq_id as usize >= DRIVE_SLOT_CATEGORIES.len() {
            return Err(invalid(Field::DiskSeqId, seq_id, "beyond the last drive slot"));
        }
        if !slots.insert(seq_id) {
            return Err(invalid(Field::DiskSeqId, seq_id, "drive slot used twice"));
        }
        if disk.description.as_deref().map_or(true, str::is_empty) {
            return Err(ValidationError::Missing(Field::DiskDescription));
        }
    }

    let mut grouped = HashSet::new();
    for group in groups {
        if raid_array_type_id(&group.raid_type).is_none() {
            return Err(invalid(Field::RaidType, &group.raid_type, "unknown array type"));
        }
        for drive in &group.drives {
            if !slots.contains(drive) {
                return Err(invalid(Field::RaidDrives, drive, "not a requested drive slot"));
            }
            if !grouped.insert(*drive) {
                return Err(invalid(Field::RaidDrives, drive, "drive in more than one group"));
            }
        }
    }
    if groups.iter().filter(|g| g.is_raid()).count() > 1 {
        if let Some(missing) = slots.iter().find(|slot| !grouped.contains(slot)) {
            return Err(invalid(Field::RaidDrives, missing, "drive not assigned to any group"));
        }
    }

    Ok(())
}
