//! Priced-item matching for bare metal servers.
//!
//! A spec becomes an ordered list of [`SpecQuery`]s, each a category id plus
//! a pattern over item descriptions. A package is chosen when every query
//! finds an item in it; packages are tried in catalog order.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::MatchError;
use crate::catalog::{CatalogItem, PackageCatalog, DRIVE_BAYS_CATEGORY_ID};
use crate::spec::DesiredSpec;

/// Provider item category ids.
pub mod category {
    pub const CPU: u64 = 1;
    pub const RAM: u64 = 3;
    pub const BANDWIDTH: u64 = 10;
    pub const RAID: u64 = 11;
    pub const OS: u64 = 12;
    pub const PRIMARY_IP: u64 = 13;
    pub const MONITORING: u64 = 20;
    pub const NOTIFICATION: u64 = 21;
    pub const RESPONSE: u64 = 22;
    pub const NETWORK: u64 = 26;
    pub const VPN: u64 = 31;
    pub const VULNERABILITY: u64 = 32;
    pub const POWER_SUPPLY: u64 = 35;
    pub const REMOTE: u64 = 46;
}

/// Category ids of the "Nth Hard Drive" slots, indexed by `seq_id`.
pub const DRIVE_SLOT_CATEGORIES: [u64; 36] = [
    4, 5, 6, 7, 36, 37, 38, 39, 40, 41, 42, 43, 98, 99, 100, 101, 102, 103, 104, 105, 106, 107,
    108, 109, 126, 127, 128, 129, 130, 131, 132, 133, 134, 135, 136, 137,
];

/// Items every bare metal server order carries.
pub const SUPPLEMENTAL_ITEMS: [(u64, &str); 7] = [
    (category::REMOTE, "Reboot / KVM over IP"),
    (category::PRIMARY_IP, "1 IP Address"),
    (category::MONITORING, "Host Ping"),
    (category::RESPONSE, "Automated Notification"),
    (category::NOTIFICATION, "Email and Ticket"),
    (category::VPN, "Unlimited SSL VPN Users & 1 PPTP VPN User per account"),
    (category::VULNERABILITY, "Nessus Vulnerability Assessment & Reporting"),
];

/// Uplink item used when the spec names neither a description nor a speed.
pub const DEFAULT_NETWORK: &str = "1000";

/// Bandwidth item used when the spec does not name one.
pub const DEFAULT_BANDWIDTH: &str = "20000 GB Bandwidth";

/// RAID controller item requested in the base pass unless exactly one RAID
/// array is requested.
const NON_RAID: &str = "Non-RAID";

/// RAID controller item added in the follow-up pass for multiple RAID arrays.
const GENERIC_RAID: &str = "RAID";

/// Provider array type id of a storage group type.
#[must_use]
pub fn raid_array_type_id(raid_type: &str) -> Option<u32> {
    match raid_type {
        "RAID 0" => Some(1),
        "RAID 1" => Some(2),
        "RAID 5" => Some(3),
        "RAID 6" => Some(4),
        "RAID 10" => Some(5),
        "JBOD" => Some(9),
        _ => None,
    }
}

/// One (category, pattern) requirement.
#[derive(Debug, Clone)]
pub struct SpecQuery {
    pub category_id: u64,
    /// Human readable requirement, used in errors.
    pub label: String,
    pattern: Regex,
}

impl SpecQuery {
    fn new(category_id: u64, label: impl Into<String>, pattern: &str) -> Result<Self, MatchError> {
        let label = label.into();
        let pattern = Regex::new(pattern).map_err(|e| MatchError::Pattern {
            query: label.clone(),
            message: e.to_string(),
        })?;
        Ok(Self {
            category_id,
            label,
            pattern,
        })
    }

    fn exact(category_id: u64, label: &str, content: &str) -> Result<Self, MatchError> {
        Self::new(
            category_id,
            format!("{label} '{content}'"),
            &format!("^{}$", regex::escape(content)),
        )
    }

    /// Whether `item` satisfies the query.
    #[must_use]
    pub fn matches(&self, item: &CatalogItem) -> bool {
        item.category_id == self.category_id && self.pattern.is_match(&item.description)
    }

    /// The pattern source.
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

/// One storage group of the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageGroup {
    pub array_type_id: u32,
    pub hard_drives: Vec<u32>,
}

/// Chosen package and the price ids to order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSelection {
    pub package_id: u64,
    pub price_ids: Vec<u64>,
    /// Present only when more than one RAID array was requested.
    pub storage_groups: Option<Vec<StorageGroup>>,
}

/// Build the base-pass queries of a spec, in order: cpu, ram, os, uplink,
/// bandwidth, supplemental items, disks, RAID controller, drive bays.
///
/// # Errors
/// Returns [`MatchError::Unset`] when a required attribute is missing and
/// [`MatchError::NoDriveSlot`] for a `seq_id` past the last slot.
pub fn queries(spec: &DesiredSpec) -> Result<Vec<SpecQuery>, MatchError> {
    let cpu = spec.cpu.as_ref().ok_or(MatchError::Unset("cpu"))?;
    let cores = cpu.cores.ok_or(MatchError::Unset("cpu.cores"))?;
    let cpu_type = cpu.cpu_type.as_deref().ok_or(MatchError::Unset("cpu.type"))?;
    let ram = spec.ram.ok_or(MatchError::Unset("ram"))?;
    let os = spec.os_image.as_deref().ok_or(MatchError::Unset("os_image"))?;

    let network = spec.network.as_ref();
    let uplink = network
        .and_then(|n| n.description.clone())
        .or_else(|| network.and_then(|n| n.speed).map(|s| s.to_string()))
        .unwrap_or_else(|| DEFAULT_NETWORK.to_string());
    let bandwidth = network
        .and_then(|n| n.bandwidth.as_deref())
        .unwrap_or(DEFAULT_BANDWIDTH);

    let mut queries = vec![
        SpecQuery::new(
            category::CPU,
            format!("cpu '{cpu_type}' with {cores} cores"),
            &format!("^(.*){}(.*){cores} Cores(.*)", regex::escape(cpu_type)),
        )?,
        SpecQuery::new(category::RAM, format!("ram '{ram} GB'"), &format!("^{ram} GB"))?,
        SpecQuery::exact(category::OS, "os", os)?,
        SpecQuery::exact(category::NETWORK, "network", &uplink)?,
        SpecQuery::exact(category::BANDWIDTH, "bandwidth", bandwidth)?,
    ];

    for (category_id, content) in SUPPLEMENTAL_ITEMS {
        queries.push(SpecQuery::exact(category_id, "supplemental", content)?);
    }

    for disk in spec.disks() {
        let seq_id = disk.seq_id.ok_or(MatchError::Unset("storage.disks[].seq_id"))?;
        let description = disk
            .description
            .as_deref()
            .ok_or(MatchError::Unset("storage.disks[].description"))?;
        let slot = DRIVE_SLOT_CATEGORIES
            .get(seq_id as usize)
            .copied()
            .ok_or(MatchError::NoDriveSlot(seq_id))?;
        queries.push(SpecQuery::new(
            slot,
            format!("disk {seq_id} '{description}'"),
            &format!("^{}", regex::escape(description)),
        )?);
    }

    let mut arrays = spec.raid_groups().iter().filter(|g| g.is_raid());
    let controller = match (arrays.next(), arrays.next()) {
        (Some(single), None) => single.raid_type.as_str(),
        _ => NON_RAID,
    };
    queries.push(SpecQuery::exact(category::RAID, "raid", controller)?);

    if let Some(bays) = spec.storage.as_ref().and_then(|s| s.max_drive_bays) {
        queries.push(SpecQuery::new(
            DRIVE_BAYS_CATEGORY_ID,
            format!("{bays} drive bays"),
            &format!("^{bays} Available Storage Units$"),
        )?);
    }

    Ok(queries)
}

/// Price ids of `items` satisfying every query, or `None` if any query has
/// no item. The synthetic drive-bay item is matched but not ordered; a
/// required power supply is appended.
fn match_package(queries: &[SpecQuery], items: &[CatalogItem]) -> Option<Vec<u64>> {
    let mut price_ids = Vec::with_capacity(queries.len() + 1);
    for query in queries {
        let item = items.iter().find(|item| query.matches(item))?;
        if !item.is_synthetic() {
            price_ids.push(item.price_id);
        }
    }

    if let Some(power) = items
        .iter()
        .find(|item| item.category_id == category::POWER_SUPPLY && item.required)
    {
        price_ids.push(power.price_id);
    }

    Some(price_ids)
}

fn failed_queries<'q>(queries: &'q [SpecQuery], items: &[CatalogItem]) -> Vec<&'q SpecQuery> {
    queries
        .iter()
        .filter(|query| !items.iter().any(|item| query.matches(item)))
        .collect()
}

/// Labels of the queries the closest package fails, the closest package
/// being the first with the fewest failures. Every label for an empty
/// catalog.
fn unmatched_labels(queries: &[SpecQuery], catalog: &PackageCatalog) -> Vec<String> {
    let closest = catalog
        .packages()
        .map(|(package_id, items)| (package_id, failed_queries(queries, items)))
        .min_by_key(|(_, failed)| failed.len());

    match closest {
        Some((package_id, failed)) => {
            debug!(package_id, failed = failed.len(), "Closest package");
            failed.iter().map(|q| q.label.clone()).collect()
        }
        None => queries.iter().map(|q| q.label.clone()).collect(),
    }
}

/// Storage groups of the order, in spec order.
fn storage_groups(spec: &DesiredSpec) -> Result<Vec<StorageGroup>, MatchError> {
    spec.raid_groups()
        .iter()
        .map(|group| {
            Ok(StorageGroup {
                array_type_id: raid_array_type_id(&group.raid_type)
                    .ok_or_else(|| MatchError::UnknownArrayType(group.raid_type.clone()))?,
                hard_drives: group.drives.clone(),
            })
        })
        .collect()
}

/// Choose the first package satisfying `spec`.
///
/// With more than one RAID array a second pass over the chosen package adds
/// the generic RAID controller item and the storage group layout.
///
/// # Errors
/// Returns [`MatchError::NoPackage`] listing the requirements the closest
/// package fails when no package matches.
pub fn resolve(spec: &DesiredSpec, catalog: &PackageCatalog) -> Result<PackageSelection, MatchError> {
    let queries = queries(spec)?;

    let Some((package_id, mut price_ids, items)) = catalog
        .packages()
        .find_map(|(id, items)| match_package(&queries, items).map(|ids| (id, ids, items)))
    else {
        return Err(MatchError::NoPackage {
            unmatched: unmatched_labels(&queries, catalog),
        });
    };

    info!(package_id, items = price_ids.len(), "Matched bare metal package");

    let storage_groups = if spec.raid_array_count() > 1 {
        let raid = SpecQuery::exact(category::RAID, "raid", GENERIC_RAID)?;
        let controller = items
            .iter()
            .find(|item| raid.matches(item))
            .ok_or_else(|| MatchError::MissingItem {
                package_id,
                requested: GENERIC_RAID.to_string(),
            })?;
        price_ids.push(controller.price_id);
        let groups = storage_groups(spec)?;
        debug!(package_id, groups = groups.len(), "Added storage groups");
        Some(groups)
    } else {
        None
    };

    Ok(PackageSelection {
        package_id,
        price_ids,
        storage_groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(package_id: u64, category_id: u64, price_id: u64, description: &str) -> CatalogItem {
        CatalogItem {
            package_id,
            category_id,
            category_name: String::new(),
            required: false,
            price_id,
            description: description.to_string(),
        }
    }

    fn package(package_id: u64, cpu: &str, bays: u32) -> Vec<CatalogItem> {
        let mut items = vec![
            item(package_id, DRIVE_BAYS_CATEGORY_ID, 1000, &format!("{bays} Available Storage Units")),
            item(package_id, category::CPU, 1, cpu),
            item(package_id, category::RAM, 3, "16 GB DDR3 Registered"),
            item(package_id, category::OS, 12, "Ubuntu Linux 14.04 LTS Trusty Tahr (64 bit)"),
            item(package_id, category::NETWORK, 26, "1000"),
            item(package_id, category::BANDWIDTH, 10, "20000 GB Bandwidth"),
            item(package_id, category::RAID, 110, "Non-RAID"),
            item(package_id, category::RAID, 111, "RAID 1"),
            item(package_id, category::RAID, 112, "RAID"),
            item(package_id, 4, 40, "500GB SATA II"),
            item(package_id, 5, 50, "500GB SATA II"),
            item(package_id, 6, 60, "1.00 TB SATA"),
        ];
        for (i, (category_id, description)) in SUPPLEMENTAL_ITEMS.iter().enumerate() {
            items.push(item(package_id, *category_id, 900 + i as u64, description));
        }
        let mut power = item(package_id, category::POWER_SUPPLY, 350, "Redundant Power Supply");
        power.required = true;
        items.push(power);
        items
    }

    fn catalog() -> PackageCatalog {
        PackageCatalog::new(vec![
            (50, package(50, "Single Intel Xeon E3-1270 (4 Cores, 3.40 GHz)", 2)),
            (251, package(251, "Dual Intel Xeon 2650 (8 Cores, 2.00 GHz)", 4)),
        ])
    }

    fn spec(groups: &str) -> DesiredSpec {
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
    - {{ seq_id: 2, description: "1.00 TB" }}
  raid_groups: {groups}
"#
        ))
        .unwrap()
    }

    #[test]
    fn test_cpu_pattern() {
        let queries = queries(&spec("[]")).unwrap();
        let cpu = &queries[0];
        assert!(cpu.matches(&item(1, category::CPU, 1, "Dual Intel Xeon 2650 (8 Cores, 2.00 GHz)")));
        assert!(!cpu.matches(&item(1, category::CPU, 1, "Dual Intel Xeon 2650 (12 Cores, 2.00 GHz)")));
        assert!(!cpu.matches(&item(1, category::RAM, 1, "Dual Intel Xeon 2650 (8 Cores, 2.00 GHz)")));
    }

    #[test]
    fn test_descriptions_are_escaped() {
        let queries = queries(&spec("[]")).unwrap();
        let os = queries.iter().find(|q| q.category_id == category::OS).unwrap();
        assert_eq!(os.pattern(), r"^Ubuntu Linux 14\.04 LTS Trusty Tahr \(64 bit\)$");
    }

    #[test]
    fn test_single_raid_group_orders_explicit_type() {
        let selection = resolve(
            &spec(r#"[{ type: "RAID 1", drives: [0, 1, 2] }]"#),
            &catalog(),
        )
        .unwrap();

        assert_eq!(selection.package_id, 251);
        assert!(selection.price_ids.contains(&111));
        assert!(!selection.price_ids.contains(&110));
        assert!(!selection.price_ids.contains(&112));
        assert!(selection.storage_groups.is_none());
    }

    #[test]
    fn test_multiple_raid_groups_add_storage_groups() {
        let selection = resolve(
            &spec(r#"[{ type: "RAID 1", drives: [0, 1] }, { type: "RAID 0", drives: [2] }]"#),
            &catalog(),
        )
        .unwrap();

        assert!(selection.price_ids.contains(&110));
        assert!(selection.price_ids.contains(&112));
        assert!(!selection.price_ids.contains(&111));
        assert_eq!(
            selection.storage_groups,
            Some(vec![
                StorageGroup { array_type_id: 2, hard_drives: vec![0, 1] },
                StorageGroup { array_type_id: 1, hard_drives: vec![2] },
            ])
        );
    }

    #[test]
    fn test_jbod_only_orders_non_raid_controller() {
        let selection = resolve(&spec(r#"[{ type: "JBOD", drives: [0, 1, 2] }]"#), &catalog())
            .unwrap();

        assert_eq!(selection.package_id, 251);
        assert!(selection.price_ids.contains(&110));
        assert!(!selection.price_ids.contains(&111));
        assert!(!selection.price_ids.contains(&112));
        assert!(selection.storage_groups.is_none());
    }

    #[test]
    fn test_jbod_beside_one_raid_group_orders_explicit_type() {
        let selection = resolve(
            &spec(r#"[{ type: "RAID 1", drives: [0, 1] }, { type: "JBOD", drives: [2] }]"#),
            &catalog(),
        )
        .unwrap();

        assert!(selection.price_ids.contains(&111));
        assert!(!selection.price_ids.contains(&110));
        assert!(!selection.price_ids.contains(&112));
        assert!(selection.storage_groups.is_none());
    }

    #[test]
    fn test_jbod_beside_two_raid_groups_is_in_storage_groups() {
        let selection = resolve(
            &spec(
                r#"[{ type: "RAID 0", drives: [0] }, { type: "RAID 0", drives: [1] }, { type: "JBOD", drives: [2] }]"#,
            ),
            &catalog(),
        )
        .unwrap();

        assert!(selection.price_ids.contains(&110));
        assert!(selection.price_ids.contains(&112));
        let groups = selection.storage_groups.unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[2].array_type_id, 9);
    }

    #[test]
    fn test_synthetic_item_skipped_and_power_supply_appended() {
        let selection = resolve(
            &spec(r#"[{ type: "RAID 1", drives: [0, 1, 2] }]"#),
            &catalog(),
        )
        .unwrap();

        assert!(!selection.price_ids.contains(&1000));
        assert_eq!(selection.price_ids.last(), Some(&350));
        assert_eq!(&selection.price_ids[..3], &[1, 3, 12]);
        // disks ordered by seq_id slot categories
        assert!(selection.price_ids.contains(&40));
        assert!(selection.price_ids.contains(&50));
        assert!(selection.price_ids.contains(&60));
    }

    #[test]
    fn test_no_package_lists_unmatched_queries() {
        let mut too_many_bays = spec(r#"[{ type: "RAID 1", drives: [0, 1, 2] }]"#);
        too_many_bays.storage.as_mut().unwrap().max_drive_bays = Some(12);

        let err = resolve(&too_many_bays, &catalog()).unwrap_err();
        assert_eq!(
            err,
            MatchError::NoPackage {
                unmatched: vec!["12 drive bays".to_string()]
            }
        );
    }

    #[test]
    fn test_no_package_reports_closest_package_only() {
        // cpu only in package 50, four bays only in package 251
        let mut split = spec(r#"[{ type: "RAID 1", drives: [0, 1, 2] }]"#);
        split.cpu.as_mut().unwrap().cores = Some(4);
        split.cpu.as_mut().unwrap().cpu_type = Some("E3-1270".to_string());

        let err = resolve(&split, &catalog()).unwrap_err();
        assert_eq!(
            err,
            MatchError::NoPackage {
                unmatched: vec!["4 drive bays".to_string()]
            }
        );
    }

    #[test]
    fn test_no_package_in_empty_catalog_lists_every_query() {
        let spec = spec(r#"[{ type: "RAID 1", drives: [0, 1, 2] }]"#);
        let err = resolve(&spec, &PackageCatalog::new(Vec::new())).unwrap_err();
        let MatchError::NoPackage { unmatched } = &err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(unmatched.len(), queries(&spec).unwrap().len());
    }

    #[test]
    fn test_array_type_ids() {
        assert_eq!(raid_array_type_id("RAID 10"), Some(5));
        assert_eq!(raid_array_type_id("JBOD"), Some(9));
        assert_eq!(raid_array_type_id("RAID 7"), None);
    }
}
