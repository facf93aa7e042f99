//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::backend::AdmissionControl;
use super::bucket::TokenBucket;
use super::policy::{RateLimiterConfig, MAX_REFRESH_INTERVAL_SECS};
use super::refresher::{BurstRefresher, RefresherHandle};
use crate::error::{BurstgateError, Result};

/// A rate limiter owning one token bucket and its burst refresher.
///
/// The limiter is built once by the application and shared by reference
/// (usually behind an `Arc`) with whatever gates requests. The refresher
/// runs between [`start`](Self::start) and [`stop`](Self::stop).
pub struct RateLimiter {
    /// Validated configuration
    config: RateLimiterConfig,
    /// The bucket all admission decisions go through
    bucket: Arc<TokenBucket>,
    /// Burst reset period, chosen once at construction
    refresh_interval: Duration,
    /// Handle of the running refresher, if started
    refresher: Mutex<Option<RefresherHandle>>,
}

impl RateLimiter {
    /// Create a rate limiter, choosing the refresh interval from the
    /// configured policy.
    pub fn new(config: RateLimiterConfig) -> Result<Self> {
        config.validate()?;
        let refresh_interval = config
            .select_refresh_interval(&mut rand::thread_rng())
            .ok_or_else(|| {
                BurstgateError::InvalidConfig("no refresh interval available".to_string())
            })?;

        Self::with_refresh_interval(config, refresh_interval)
    }

    /// Create a rate limiter with an explicit refresh interval.
    pub fn with_refresh_interval(
        config: RateLimiterConfig,
        refresh_interval: Duration,
    ) -> Result<Self> {
        if refresh_interval.is_zero() {
            return Err(BurstgateError::InvalidConfig(
                "refresh interval must be greater than zero".to_string(),
            ));
        }
        if refresh_interval > Duration::from_secs(MAX_REFRESH_INTERVAL_SECS) {
            return Err(BurstgateError::InvalidConfig(format!(
                "refresh interval must be at most {} seconds",
                MAX_REFRESH_INTERVAL_SECS
            )));
        }

        let bucket = Arc::new(TokenBucket::new(&config)?);

        debug!(
            max_attempts = config.max_attempts,
            refresh_interval_ms = refresh_interval.as_millis() as u64,
            policy = ?config.refresh_policy,
            "Rate limiter created"
        );

        Ok(Self {
            config,
            bucket,
            refresh_interval,
            refresher: Mutex::new(None),
        })
    }

    /// Start the burst refresher on the current tokio runtime.
    ///
    /// Starting an already running limiter does nothing. A refresher whose
    /// task has exited is replaced.
    pub fn start(&self) -> Result<()> {
        let mut refresher = self.refresher.lock();
        if let Some(handle) = refresher.as_ref() {
            if !handle.is_finished() {
                warn!("Rate limiter refresher already running");
                return Ok(());
            }
            warn!("Rate limiter refresher exited unexpectedly, restarting");
            *refresher = None;
        }

        tokio::runtime::Handle::try_current().map_err(|e| {
            BurstgateError::RateLimit(format!("burst refresher needs a tokio runtime: {}", e))
        })?;

        *refresher = Some(BurstRefresher::spawn(
            self.bucket.clone(),
            self.config.max_attempts,
            self.refresh_interval,
        )?);

        info!(
            max_attempts = self.config.max_attempts,
            refresh_interval_ms = self.refresh_interval.as_millis() as u64,
            "Rate limiter started"
        );
        Ok(())
    }

    /// Stop the burst refresher and wait for it to exit.
    ///
    /// Does nothing if the refresher is not running.
    pub async fn stop(&self) {
        // Release the lock before awaiting the task
        let handle = self.refresher.lock().take();

        match handle {
            Some(handle) => {
                handle.stop().await;
                info!("Rate limiter stopped");
            }
            None => debug!("Rate limiter stop called while not running"),
        }
    }

    /// Whether the burst refresher is running.
    pub fn is_running(&self) -> bool {
        self.refresher
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Decide whether one more request may proceed right now.
    pub fn allow(&self) -> bool {
        let allowed = self.bucket.allow();
        if !allowed {
            debug!(
                max_attempts = self.config.max_attempts,
                "Rate limit exceeded"
            );
        }
        allowed
    }

    /// Get the underlying token bucket.
    pub fn bucket(&self) -> &Arc<TokenBucket> {
        &self.bucket
    }

    /// Get the limiter configuration.
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Get the message sent to rejected clients.
    pub fn message(&self) -> &str {
        &self.config.message
    }

    /// Get the burst reset period.
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }
}

impl AdmissionControl for RateLimiter {
    fn allow(&self) -> bool {
        RateLimiter::allow(self)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("refresh_interval", &self.refresh_interval)
            .field("running", &self.is_running())
            .finish()
    }
}
