//! Rate limiter configuration and refresh interval selection.
//!
//! A [`RateLimiterConfig`] describes a single limiter: how many requests it
//! admits per window, the message sent back on rejection, and how the burst
//! refresh period is chosen.

use std::path::Path;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{BurstgateError, Result};

/// Message returned to rejected clients when none is configured.
pub const DEFAULT_MESSAGE: &str = "rate limit exceeded";

/// Longest accepted refresh interval, one year.
pub const MAX_REFRESH_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// How the burst refresh period is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshPolicy {
    /// Refresh every `refresh_interval_secs` seconds.
    #[default]
    Fixed,
    /// Pick one entry of `timer_array` at construction and refresh on that
    /// period for the lifetime of the limiter.
    Random,
}

/// Configuration for a single rate limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Requests admitted per window; also the bucket capacity and the
    /// per-second refill rate
    pub max_attempts: u32,

    /// Error message sent with the 429 response
    #[serde(default = "default_message")]
    pub message: String,

    /// Candidate refresh intervals in seconds, used by the random policy
    #[serde(default)]
    pub timer_array: Vec<u64>,

    /// Refresh interval selection policy
    #[serde(default)]
    pub refresh_policy: RefreshPolicy,

    /// Refresh interval in seconds, used by the fixed policy
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

fn default_message() -> String {
    DEFAULT_MESSAGE.to_string()
}

fn default_refresh_interval() -> u64 {
    1
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            message: default_message(),
            timer_array: Vec::new(),
            refresh_policy: RefreshPolicy::default(),
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

impl RateLimiterConfig {
    /// Create a fixed-policy configuration with the default one second refresh.
    pub fn new(max_attempts: u32, message: impl Into<String>) -> Self {
        Self {
            max_attempts,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Switch to the random policy with the given candidate intervals.
    pub fn with_timer_array(mut self, timer_array: Vec<u64>) -> Self {
        self.timer_array = timer_array;
        self.refresh_policy = RefreshPolicy::Random;
        self
    }

    /// Load a limiter configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limiter configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load a limiter configuration from a YAML string.
    ///
    /// The result is validated, so a successful parse is always usable.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RateLimiterConfig = serde_yaml::from_str(yaml).map_err(|e| {
            BurstgateError::Config(format!("Failed to parse rate limiter config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants a limiter relies on.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(BurstgateError::InvalidConfig(
                "max_attempts must be greater than zero".to_string(),
            ));
        }

        match self.refresh_policy {
            RefreshPolicy::Fixed => {
                if self.refresh_interval_secs == 0 {
                    return Err(BurstgateError::InvalidConfig(
                        "refresh_interval_secs must be greater than zero".to_string(),
                    ));
                }
                if self.refresh_interval_secs > MAX_REFRESH_INTERVAL_SECS {
                    return Err(BurstgateError::InvalidConfig(format!(
                        "refresh_interval_secs must be at most {}",
                        MAX_REFRESH_INTERVAL_SECS
                    )));
                }
            }
            RefreshPolicy::Random => {
                if self.timer_array.is_empty() {
                    return Err(BurstgateError::InvalidConfig(
                        "timer_array must not be empty with the random refresh policy".to_string(),
                    ));
                }
                if self.timer_array.contains(&0) {
                    return Err(BurstgateError::InvalidConfig(
                        "timer_array entries must be greater than zero".to_string(),
                    ));
                }
                if self
                    .timer_array
                    .iter()
                    .any(|secs| *secs > MAX_REFRESH_INTERVAL_SECS)
                {
                    return Err(BurstgateError::InvalidConfig(format!(
                        "timer_array entries must be at most {}",
                        MAX_REFRESH_INTERVAL_SECS
                    )));
                }
            }
        }

        Ok(())
    }

    /// Choose the burst refresh period according to the configured policy.
    ///
    /// Called once per limiter. Returns `None` when the random policy has no
    /// candidates, which [`validate`](Self::validate) rules out.
    pub fn select_refresh_interval<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Duration> {
        match self.refresh_policy {
            RefreshPolicy::Fixed => Some(Duration::from_secs(self.refresh_interval_secs)),
            RefreshPolicy::Random => self
                .timer_array
                .choose(rng)
                .map(|secs| Duration::from_secs(*secs)),
        }
    }
}
