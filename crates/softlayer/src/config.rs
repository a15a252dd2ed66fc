//! Driver configuration.
//!
//! Credentials, endpoint and instance family, loaded from YAML or from
//! `SOFTLAYER_*` environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::{SoftLayerClient, API_BASE_URL, DEFAULT_TIMEOUT_SECS};
use crate::error::{DriverError, Result};
use crate::family::InstanceFamily;

/// Environment variable holding the API username.
pub const ENV_USERNAME: &str = "SOFTLAYER_USERNAME";
/// Environment variable holding the API key.
pub const ENV_API_KEY: &str = "SOFTLAYER_API_KEY";
/// Environment variable holding the instance family.
pub const ENV_INSTANCE_TYPE: &str = "SOFTLAYER_INSTANCE_TYPE";
/// Environment variable overriding the REST endpoint.
pub const ENV_ENDPOINT: &str = "SOFTLAYER_ENDPOINT";

fn default_endpoint() -> String {
    API_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Connection settings of a driver.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// API username.
    #[serde(alias = "user_name")]
    pub username: String,
    /// API key.
    pub api_key: String,
    /// REST base URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Family the driver provisions.
    #[serde(alias = "instance_type")]
    pub instance_family: InstanceFamily,
    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for DriverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverConfig")
            .field("username", &self.username)
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("instance_family", &self.instance_family)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl DriverConfig {
    /// Config against the public endpoint with default timeouts.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        api_key: impl Into<String>,
        instance_family: InstanceFamily,
    ) -> Self {
        Self {
            username: username.into(),
            api_key: api_key.into(),
            endpoint: default_endpoint(),
            instance_family,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Parse a YAML document.
    ///
    /// # Errors
    /// Returns [`DriverError::Config`] for missing keys or an unknown family.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| DriverError::Config(format!("invalid driver config: {e}")))?;
        config.check()?;
        Ok(config)
    }

    /// Load a YAML file.
    ///
    /// # Errors
    /// Returns [`DriverError::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DriverError::Config(format!("cannot read driver config {}: {e}", path.display()))
        })?;
        Self::from_yaml(&content)
    }

    /// Read `SOFTLAYER_*` environment variables.
    ///
    /// # Errors
    /// Returns [`DriverError::Config`] naming the first missing variable, or
    /// if the instance type is not a known family.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    ///
    /// # Errors
    /// See [`DriverConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| DriverError::Config(format!("{key} is not set")))
        };

        let username = required(ENV_USERNAME)?;
        let api_key = required(ENV_API_KEY)?;
        let instance_family = required(ENV_INSTANCE_TYPE)?
            .parse::<InstanceFamily>()
            .map_err(|e| DriverError::Config(format!("{ENV_INSTANCE_TYPE}: {e}")))?;

        let mut config = Self::new(username, api_key, instance_family);
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            config.endpoint = endpoint;
        }
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(DriverError::Config("username is empty".to_string()));
        }
        if self.api_key.trim().is_empty() {
            return Err(DriverError::Config("api_key is empty".to_string()));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(DriverError::Config(format!(
                "endpoint '{}' is not an http(s) URL",
                self.endpoint
            )));
        }
        Ok(())
    }

    /// HTTP client for this configuration.
    ///
    /// # Errors
    /// Returns [`DriverError::Config`] if the HTTP client cannot be built.
    pub fn client(&self) -> Result<SoftLayerClient> {
        SoftLayerClient::with_endpoint(
            &self.username,
            &self.api_key,
            &self.endpoint,
            Duration::from_secs(self.request_timeout_secs),
        )
        .map_err(|e| DriverError::Config(format!("cannot build HTTP client: {e}")))
    }
}
