//! Flattened priced-item catalog of bare metal server packages.

use tracing::{debug, info};

use crate::api::models::{ConfigurationEntry, ItemPrice};
use crate::api::{ApiError, SoftLayerApi};

/// Category id of the synthetic drive-bay item. Not a provider category.
pub const DRIVE_BAYS_CATEGORY_ID: u64 = 1000;

/// Price id of the synthetic drive-bay item. Never ordered.
pub const DRIVE_BAYS_PRICE_ID: u64 = 1000;

/// One priced item of a package, in one of its categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub package_id: u64,
    pub category_id: u64,
    pub category_name: String,
    /// Whether the package requires an item of this category.
    pub required: bool,
    pub price_id: u64,
    pub description: String,
}

impl CatalogItem {
    /// Whether this is the local drive-bay placeholder.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.category_id == DRIVE_BAYS_CATEGORY_ID
    }

    fn drive_bays(package_id: u64, bays: u32) -> Self {
        Self {
            package_id,
            category_id: DRIVE_BAYS_CATEGORY_ID,
            category_name: "Disk Available Storage Units".to_string(),
            required: true,
            price_id: DRIVE_BAYS_PRICE_ID,
            description: format!("{bays} Available Storage Units"),
        }
    }
}

/// Items grouped by package, in provider package order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageCatalog {
    packages: Vec<(u64, Vec<CatalogItem>)>,
}

/// A failed catalog fetch and the step it happened in.
#[derive(Debug)]
pub struct LoadFailure {
    pub step: String,
    pub source: ApiError,
}

fn step(step: impl Into<String>) -> impl FnOnce(ApiError) -> LoadFailure {
    let step = step.into();
    move |source| LoadFailure { step, source }
}

impl PackageCatalog {
    /// Build a catalog from already flattened packages.
    #[must_use]
    pub fn new(packages: Vec<(u64, Vec<CatalogItem>)>) -> Self {
        Self { packages }
    }

    /// Packages with their items.
    pub fn packages(&self) -> impl Iterator<Item = (u64, &[CatalogItem])> {
        self.packages.iter().map(|(id, items)| (*id, items.as_slice()))
    }

    /// Items of one package.
    #[must_use]
    pub fn items(&self, package_id: u64) -> Option<&[CatalogItem]> {
        self.packages
            .iter()
            .find(|(id, _)| *id == package_id)
            .map(|(_, items)| items.as_slice())
    }

    /// Number of cached packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether no package was cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Fetch every bare metal server package and flatten its items.
    ///
    /// # Errors
    /// Returns the first failed fetch; no partial catalog is produced.
    pub async fn load(api: &dyn SoftLayerApi) -> Result<Self, LoadFailure> {
        let packages = api.bare_metal_packages().await.map_err(step("packages"))?;
        info!(count = packages.len(), "Loading bare metal server packages");

        let mut catalog = Vec::with_capacity(packages.len());
        for package in packages {
            let bays = api
                .available_storage_units(package.id)
                .await
                .map_err(step(format!("available storage units of package {}", package.id)))?;
            let configuration = api
                .package_configuration(package.id)
                .await
                .map_err(step(format!("configuration of package {}", package.id)))?;
            let prices = api
                .package_item_prices(package.id)
                .await
                .map_err(step(format!("item prices of package {}", package.id)))?;

            let items = flatten(package.id, bays, &configuration, &prices);
            debug!(package_id = package.id, items = items.len(), "Cached package");
            catalog.push((package.id, items));
        }

        Ok(Self::new(catalog))
    }
}

/// One item per (category, price) pair where the price is offered in the
/// category, preceded by the synthetic drive-bay item.
fn flatten(
    package_id: u64,
    bays: u32,
    configuration: &[ConfigurationEntry],
    prices: &[ItemPrice],
) -> Vec<CatalogItem> {
    let mut items = vec![CatalogItem::drive_bays(package_id, bays)];

    for entry in configuration {
        let category = &entry.item_category;
        for price in prices {
            let in_category = price
                .categories
                .as_ref()
                .is_some_and(|cats| cats.iter().any(|c| c.id == category.id));
            if !in_category {
                continue;
            }
            let (Some(price_id), Some(description)) = (price.id, price.description()) else {
                continue;
            };
            items.push(CatalogItem {
                package_id,
                category_id: category.id,
                category_name: category.name.clone(),
                required: entry.is_required,
                price_id,
                description: description.to_string(),
            });
        }
    }

    items
}
