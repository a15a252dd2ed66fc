//! SoftLayer remote API: the trait the driver talks through and its REST
//! implementation.

mod client;
pub mod models;
mod traits;

pub use client::{SoftLayerClient, API_BASE_URL, DEFAULT_TIMEOUT_SECS};
pub use traits::{ApiError, Instance, PowerState, Service, SoftLayerApi};
