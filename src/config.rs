//! Configuration management for Burstgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{BurstgateError, Result};
use crate::ratelimit::RateLimiterConfig;

/// Prefix for environment variable overrides, e.g.
/// `BURSTGATE__RATE_LIMITING__MAX_ATTEMPTS=50`.
pub const ENV_PREFIX: &str = "BURSTGATE";

/// Main configuration for the Burstgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BurstgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimiterConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

impl BurstgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: BurstgateConfig = serde_yaml::from_str(&contents)
            .map_err(|e| BurstgateError::Config(e.to_string()))?;
        config.rate_limiting.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional YAML file layered under
    /// `BURSTGATE__`-prefixed environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path).format(::config::FileFormat::Yaml),
            );
        }

        let config: BurstgateConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("rate_limiting.timer_array")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.rate_limiting.validate()?;
        Ok(config)
    }
}
