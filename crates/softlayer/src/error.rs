//! Driver error taxonomy.
//!
//! Every variant is terminal for the operation that raised it; retrying is
//! the caller's decision (re-running `allocate`/`ready` is idempotent).

use thiserror::Error;

use crate::api::ApiError;
use crate::family::InstanceFamily;
use crate::matcher::MatchError;
use crate::record::ProvisionState;
use crate::validate::ValidationError;

/// Errors returned by driver operations.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The desired spec is missing a field or has an invalid value.
    #[error("machine '{machine}': {source}")]
    Validation {
        machine: String,
        #[source]
        source: ValidationError,
    },

    /// The catalog could not be loaded; the driver is unusable.
    #[error("failed to load {family} catalog ({step}): {source}")]
    CatalogLoad {
        family: InstanceFamily,
        step: String,
        #[source]
        source: ApiError,
    },

    /// No catalog entry or package satisfies the spec.
    #[error("machine '{machine}': {source}")]
    Match {
        machine: String,
        #[source]
        source: MatchError,
    },

    /// The provider rejected an order.
    #[error("machine '{machine}': order {stage} failed: {source}")]
    Order {
        machine: String,
        stage: &'static str,
        #[source]
        source: ApiError,
    },

    /// The instance did not materialize within the provisioning timeout.
    #[error("machine '{machine}': provisioning timed out after {minutes} minutes (timeout {timeout_secs}s)")]
    ProvisionTimeout {
        machine: String,
        minutes: u64,
        timeout_secs: u64,
    },

    /// The instance is provisioned but never became reachable.
    #[error("machine '{machine}' at {address}: not reachable after {minutes} minutes")]
    Unreachable {
        machine: String,
        address: String,
        minutes: u64,
    },

    /// The operation is not valid for the record's current state.
    #[error("{operation} on machine '{machine}' (state {}): {reason}", .state.map_or("none", ProvisionState::as_str))]
    State {
        operation: &'static str,
        machine: String,
        state: Option<ProvisionState>,
        reason: String,
    },

    /// Any other provider call failed.
    #[error("{operation} on machine '{machine}' failed: {source}")]
    RemoteApi {
        operation: &'static str,
        machine: String,
        #[source]
        source: ApiError,
    },

    /// The record store failed to persist or load a record.
    #[error("failed to persist machine '{machine}': {source}")]
    Persistence {
        machine: String,
        #[source]
        source: anyhow::Error,
    },

    /// Invalid driver configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Driver result alias.
pub type Result<T> = std::result::Result<T, DriverError>;
