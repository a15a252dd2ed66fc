//! Create-object option matching (virtual server, bare metal instance).
//!
//! Each option kind takes the first cached fragment whose predicate holds
//! and merges its template into the order; later merges overwrite earlier
//! keys.

use serde_json::{Map, Value};
use tracing::debug;

use super::{MatchError, OptionKind};
use crate::catalog::{ObjectOptionSet, OptionEntry};
use crate::spec::{DesiredSpec, DiskSpec};

fn merge(template: &mut Map<String, Value>, fragment: &Map<String, Value>) {
    for (key, value) in fragment {
        template.insert(key.clone(), value.clone());
    }
}

fn pick<'a, P>(
    entries: &'a [OptionEntry<P>],
    kind: OptionKind,
    requested: impl FnOnce() -> String,
    predicate: impl Fn(&P) -> bool,
) -> Result<&'a OptionEntry<P>, MatchError> {
    entries
        .iter()
        .find(|entry| predicate(&entry.predicate))
        .ok_or_else(|| MatchError::Unmatched {
            kind,
            requested: requested(),
        })
}

fn datacenter_and_os(
    spec: &DesiredSpec,
    options: &ObjectOptionSet,
    template: &mut Map<String, Value>,
    match_speed: bool,
) -> Result<(), MatchError> {
    let datacenter = spec.datacenter.as_deref().ok_or(MatchError::Unset("datacenter"))?;
    let entry = pick(
        &options.datacenters,
        OptionKind::Datacenter,
        || datacenter.to_string(),
        |dc| dc.name.contains(datacenter),
    )?;
    merge(template, &entry.template);

    if match_speed {
        if let Some(speed) = spec.network.as_ref().and_then(|n| n.speed) {
            let entry = pick(
                &options.network_components,
                OptionKind::NetworkSpeed,
                || format!("{speed} Mbps"),
                |net| net.max_speed == u64::from(speed),
            )?;
            merge(template, &entry.template);
        }
    }

    let os = spec.os_image.as_deref().ok_or(MatchError::Unset("os_image"))?;
    let entry = pick(
        &options.operating_systems,
        OptionKind::OperatingSystem,
        || os.to_string(),
        |candidate| candidate.description.contains(os),
    )?;
    merge(template, &entry.template);

    Ok(())
}

/// Device index of the disk at `position`: the first disk is device 0 and
/// every later disk skips one slot (device 1 is reserved for swap), giving
/// 0, 2, 3, 4, ...
#[must_use]
pub fn device_index(position: usize) -> u64 {
    let position = position as u64;
    if position > 0 {
        position + 1
    } else {
        position
    }
}

fn block_devices(
    disks: &[DiskSpec],
    options: &ObjectOptionSet,
    template: &mut Map<String, Value>,
) -> Result<(), MatchError> {
    let local = !disks.iter().any(DiskSpec::is_san);
    template.insert("localDiskFlag".to_string(), Value::Bool(local));

    let mut devices = Vec::with_capacity(disks.len());
    for (position, disk) in disks.iter().enumerate() {
        let device = device_index(position);
        let capacity = disk.capacity.ok_or(MatchError::Unset("storage.disks[].capacity"))?;
        let entry = pick(
            &options.block_devices,
            OptionKind::BlockDevice,
            || format!("disk {position}: {capacity} GB at device {device} (local {local})"),
            |dev| dev.local_disk == local && dev.device == device && dev.capacity_gb == capacity,
        )?;
        devices.push(entry.predicate.block_device.clone());
    }

    if !devices.is_empty() {
        template.insert("blockDevices".to_string(), Value::Array(devices));
    }
    Ok(())
}

/// Provision from an image template instead of an OS and block devices.
fn apply_image_template(spec: &DesiredSpec, template: &mut Map<String, Value>) {
    if let Some(id) = spec.template_id.as_deref() {
        template.insert(
            "blockDeviceTemplateGroup".to_string(),
            serde_json::json!({ "globalIdentifier": id }),
        );
        template.remove("operatingSystemReferenceCode");
        template.remove("blockDevices");
    }
}

/// Match a virtual server spec.
///
/// Memory is matched in MB, processors on core count plus the dedicated
/// flag when requested, and disks positionally by device index.
///
/// # Errors
/// Returns [`MatchError::Unmatched`] for the first option kind without a
/// matching fragment.
pub fn resolve_virtual_server(
    spec: &DesiredSpec,
    options: &ObjectOptionSet,
) -> Result<Map<String, Value>, MatchError> {
    let mut template = Map::new();
    datacenter_and_os(spec, options, &mut template, true)?;

    let ram = spec.ram.ok_or(MatchError::Unset("ram"))?;
    let entry = pick(
        &options.memory,
        OptionKind::Memory,
        || format!("{ram} GB"),
        |mem| mem.max_memory_mb == u64::from(ram) * 1024,
    )?;
    merge(&mut template, &entry.template);

    let cpu = spec.cpu.as_ref().ok_or(MatchError::Unset("cpu"))?;
    let cores = cpu.cores.ok_or(MatchError::Unset("cpu.cores"))?;
    let entry = pick(
        &options.processors,
        OptionKind::Processors,
        || match cpu.private {
            Some(private) => format!("{cores} cores (private {private})"),
            None => format!("{cores} cores"),
        },
        |proc| {
            proc.cores == u64::from(cores)
                && cpu
                    .private
                    .map_or(true, |private| proc.dedicated == Some(private))
        },
    )?;
    merge(&mut template, &entry.template);

    block_devices(spec.disks(), options, &mut template)?;
    apply_image_template(spec, &mut template);

    debug!(keys = template.len(), "Matched virtual server options");
    Ok(template)
}

/// Match a bare metal instance spec.
///
/// The first hard-drive fragment is the default disk layout; processors are
/// matched on memory capacity (GB) and core count together.
///
/// # Errors
/// Returns [`MatchError::Unmatched`] for the first option kind without a
/// matching fragment.
pub fn resolve_bare_metal_instance(
    spec: &DesiredSpec,
    options: &ObjectOptionSet,
) -> Result<Map<String, Value>, MatchError> {
    let mut template = Map::new();
    datacenter_and_os(spec, options, &mut template, false)?;

    let drives = options
        .hard_drives
        .first()
        .ok_or_else(|| MatchError::Unmatched {
            kind: OptionKind::HardDrive,
            requested: "default".to_string(),
        })?;
    merge(&mut template, drives);

    let ram = spec.ram.ok_or(MatchError::Unset("ram"))?;
    let cores = spec
        .cpu
        .as_ref()
        .and_then(|c| c.cores)
        .ok_or(MatchError::Unset("cpu.cores"))?;
    let entry = pick(
        &options.processors,
        OptionKind::Processors,
        || format!("{cores} cores with {ram} GB"),
        |proc| {
            proc.memory_capacity_gb == Some(u64::from(ram)) && proc.cores == u64::from(cores)
        },
    )?;
    merge(&mut template, &entry.template);

    apply_image_template(spec, &mut template);

    debug!(keys = template.len(), "Matched bare metal instance options");
    Ok(template)
}
