//! SoftLayer machine provisioning.
//!
//! This crate orders and tears down SoftLayer compute instances from a
//! declarative [`DesiredSpec`]. It covers three instance families with
//! different ordering rules (virtual servers, bare metal instances and bare
//! metal servers), matches the spec against a catalog cached at driver
//! construction, and drives each machine through an INIT → DONE provisioning
//! state persisted in a [`MachineRecord`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use softlayer_driver::{ApiLock, DesiredSpec, DriverConfig, JsonFileStore, SoftLayerDriver};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DriverConfig::from_env()?;
//!     let store = Arc::new(JsonFileStore::new("./nodes"));
//!     let driver = SoftLayerDriver::from_config(&config, ApiLock::serialized(), store).await?;
//!
//!     let spec = DesiredSpec::load("web-1.yaml".as_ref())?;
//!     let mut record = driver.load_record("web-1")?;
//!
//!     // Order the machine (idempotent) and wait until it is reachable
//!     driver.allocate(&mut record, &spec, true).await?;
//!     let machine = driver.ready(&mut record, true).await?;
//!     println!("{machine:?}");
//!
//!     Ok(())
//! }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod catalog;
pub mod config;
pub mod driver;
pub mod error;
pub mod family;
pub mod lock;
pub mod matcher;
pub mod order;
pub mod poll;
pub mod record;
pub mod spec;
pub mod validate;

pub use api::{ApiError, Instance, PowerState, Service, SoftLayerApi, SoftLayerClient};
pub use catalog::{Catalog, CatalogCache, CatalogItem, DatacenterTable, ObjectOptionSet, PackageCatalog};
pub use config::DriverConfig;
pub use driver::{ConnectionStrategy, MachineDescriptor, SoftLayerDriver};
pub use error::{DriverError, Result};
pub use family::InstanceFamily;
pub use lock::ApiLock;
pub use matcher::{MatchError, Resolution};
pub use poll::{PollBudget, Reachability, Sleeper, TcpProbe, TokioSleeper};
pub use record::{JsonFileStore, MachineRecord, MemoryStore, ProvisionState, RecordStore};
pub use spec::{BillingPeriod, DesiredSpec};
pub use validate::{Field, ValidationError};
