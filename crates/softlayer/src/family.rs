//! Instance families offered by the provider.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::Service;

/// Unknown instance family name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown instance family '{0}' (expected virtual_server, bare_metal_instance or bare_metal_server)")]
pub struct ParseFamilyError(pub String);

/// Compute offering a driver provisions. Fixed at driver construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceFamily {
    /// Hourly or monthly virtual guest.
    VirtualServer,
    /// Hourly bare metal ordered through create-object options.
    BareMetalInstance,
    /// Monthly bare metal ordered from product packages.
    BareMetalServer,
}

impl InstanceFamily {
    /// All families, in catalog order.
    pub const ALL: [Self; 3] = [
        Self::VirtualServer,
        Self::BareMetalInstance,
        Self::BareMetalServer,
    ];

    /// Name used in configuration and persisted records.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VirtualServer => "virtual_server",
            Self::BareMetalInstance => "bare_metal_instance",
            Self::BareMetalServer => "bare_metal_server",
        }
    }

    /// Service the family's instances live under.
    #[must_use]
    pub fn service(self) -> Service {
        match self {
            Self::VirtualServer => Service::VirtualGuest,
            Self::BareMetalInstance | Self::BareMetalServer => Service::HardwareServer,
        }
    }

    /// Provisioning timeout used when the desired spec does not set one.
    #[must_use]
    pub fn default_provision_timeout_secs(self) -> u64 {
        match self {
            Self::VirtualServer => 3_600,
            Self::BareMetalInstance => 7_200,
            Self::BareMetalServer => 86_400,
        }
    }
}

impl std::fmt::Display for InstanceFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceFamily {
    type Err = ParseFamilyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|family| family.as_str() == s.trim())
            .ok_or_else(|| ParseFamilyError(s.to_string()))
    }
}
