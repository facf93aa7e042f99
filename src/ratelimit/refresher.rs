//! Periodic burst reset task.
//!
//! The refresher restores a bucket's full capacity on a fixed period. It is
//! a hard reset rather than a proportional refill: however many tokens were
//! consumed, the bucket holds exactly `burst` tokens after each tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::bucket::TokenBucket;
use crate::error::{BurstgateError, Result};

/// Spawns burst reset tasks.
pub struct BurstRefresher;

impl BurstRefresher {
    /// Spawn a task that calls `set_burst(burst)` on `bucket` every `period`.
    ///
    /// The first reset happens one full period after spawning. Fails with
    /// `InvalidConfig` when that deadline is not representable. Must be
    /// called from within a tokio runtime.
    pub fn spawn(
        bucket: Arc<TokenBucket>,
        burst: u32,
        period: Duration,
    ) -> Result<RefresherHandle> {
        let first_reset = time::Instant::now().checked_add(period).ok_or_else(|| {
            BurstgateError::InvalidConfig(format!(
                "refresh period {:?} overflows the clock",
                period
            ))
        })?;

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(first_reset, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        debug!("Burst refresher received stop signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        bucket.set_burst(burst);
                    }
                }
            }
        });

        info!(
            burst = burst,
            period_ms = period.as_millis() as u64,
            "Burst refresher started"
        );

        Ok(RefresherHandle {
            stop_tx: Some(stop_tx),
            task: Some(task),
            period,
        })
    }
}

/// Owns a running refresher task.
///
/// Call [`stop`](Self::stop) to end the task and wait for it. Dropping the
/// handle without stopping aborts the task instead.
#[derive(Debug)]
pub struct RefresherHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    period: Duration,
}

impl RefresherHandle {
    /// The reset period of this refresher.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Signal the task to stop and wait until it has exited.
    ///
    /// No reset happens after this returns.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // A send error means the task already exited
            let _ = stop_tx.send(());
        }

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Burst refresher task ended abnormally");
            }
        }

        info!("Burst refresher stopped");
    }
}

#[cfg(test)]
impl RefresherHandle {
    /// Drop the stop sender so the task exits on its own, leaving a
    /// finished handle behind.
    pub(crate) fn release_stop_signal(&mut self) {
        self.stop_tx.take();
    }
}

impl Drop for RefresherHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
