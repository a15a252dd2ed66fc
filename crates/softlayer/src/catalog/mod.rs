//! Catalog cache.
//!
//! Loaded once when a driver is constructed and read-only afterwards. The
//! representation depends on the instance family:
//!
//! - virtual servers and bare metal instances: the service's create-object
//!   option set ([`ObjectOptionSet`])
//! - bare metal servers: the flattened priced items of every package
//!   ([`PackageCatalog`])
//!
//! The provider's datacenter list is cached alongside for validation and
//! order locations.

mod options;
mod packages;

pub use options::{
    BlockDeviceOption, DatacenterOption, MemoryOption, NetworkOption, ObjectOptionSet,
    OperatingSystemOption, OptionEntry, ProcessorOption,
};
pub use packages::{
    CatalogItem, LoadFailure, PackageCatalog, DRIVE_BAYS_CATEGORY_ID, DRIVE_BAYS_PRICE_ID,
};

use tracing::info;

use crate::api::models::Datacenter;
use crate::api::SoftLayerApi;
use crate::error::DriverError;
use crate::family::InstanceFamily;

/// Datacenters known to the account.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatacenterTable {
    entries: Vec<Datacenter>,
}

impl DatacenterTable {
    /// Wrap a datacenter list.
    #[must_use]
    pub fn new(entries: Vec<Datacenter>) -> Self {
        Self { entries }
    }

    /// Resolve a requested datacenter: the long name contains the value, or
    /// the short name contains the lower-cased value.
    #[must_use]
    pub fn resolve(&self, requested: &str) -> Option<&Datacenter> {
        let lower = requested.to_lowercase();
        self.entries
            .iter()
            .find(|dc| dc.long_name.contains(requested) || dc.name.contains(&lower))
    }

    /// All datacenters.
    #[must_use]
    pub fn entries(&self) -> &[Datacenter] {
        &self.entries
    }
}

/// Family-specific catalog representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Catalog {
    VirtualServer(ObjectOptionSet),
    BareMetalInstance(ObjectOptionSet),
    BareMetalServer(PackageCatalog),
}

impl Catalog {
    /// Family the catalog was loaded for.
    #[must_use]
    pub fn family(&self) -> InstanceFamily {
        match self {
            Self::VirtualServer(_) => InstanceFamily::VirtualServer,
            Self::BareMetalInstance(_) => InstanceFamily::BareMetalInstance,
            Self::BareMetalServer(_) => InstanceFamily::BareMetalServer,
        }
    }
}

/// Orderable options of one family plus the datacenter table.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogCache {
    datacenters: DatacenterTable,
    catalog: Catalog,
}

impl CatalogCache {
    /// Assemble a cache from already loaded parts.
    #[must_use]
    pub fn new(catalog: Catalog, datacenters: DatacenterTable) -> Self {
        Self {
            datacenters,
            catalog,
        }
    }

    /// Load the catalog of `family`.
    ///
    /// # Errors
    /// Returns [`DriverError::CatalogLoad`] naming the failed step if any
    /// fetch fails.
    pub async fn load(api: &dyn SoftLayerApi, family: InstanceFamily) -> Result<Self, DriverError> {
        let failed = |step: String, source| DriverError::CatalogLoad {
            family,
            step,
            source,
        };

        info!(family = %family, "Loading catalog");

        let datacenters = api
            .datacenters()
            .await
            .map_err(|e| failed("datacenters".to_string(), e))?;

        let catalog = match family {
            InstanceFamily::VirtualServer | InstanceFamily::BareMetalInstance => {
                let options = api
                    .create_object_options(family.service())
                    .await
                    .map_err(|e| failed("create object options".to_string(), e))?;
                let set = ObjectOptionSet::from_options(options);
                if family == InstanceFamily::VirtualServer {
                    Catalog::VirtualServer(set)
                } else {
                    Catalog::BareMetalInstance(set)
                }
            }
            InstanceFamily::BareMetalServer => Catalog::BareMetalServer(
                PackageCatalog::load(api)
                    .await
                    .map_err(|e| failed(e.step, e.source))?,
            ),
        };

        info!(family = %family, datacenters = datacenters.len(), "Catalog loaded");
        Ok(Self::new(catalog, DatacenterTable::new(datacenters)))
    }

    /// Family of the cached catalog.
    #[must_use]
    pub fn family(&self) -> InstanceFamily {
        self.catalog.family()
    }

    /// Cached catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Cached datacenters.
    #[must_use]
    pub fn datacenters(&self) -> &DatacenterTable {
        &self.datacenters
    }

    /// Resolve a requested datacenter to its location id.
    #[must_use]
    pub fn datacenter_id(&self, requested: &str) -> Option<u64> {
        self.datacenters.resolve(requested).map(|dc| dc.id)
    }
}
