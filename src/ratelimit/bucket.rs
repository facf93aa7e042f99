//! Token bucket implementation.

use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::backend::AdmissionControl;
use super::policy::RateLimiterConfig;
use crate::error::Result;

/// Mutable bucket state, always read and written under one lock.
#[derive(Debug)]
struct BucketState {
    /// Maximum number of tokens the bucket holds
    capacity: u32,
    /// Tokens currently available, including any fractional refill
    available: f64,
    /// When refill was last applied
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, rate_per_second: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.available = (self.available + elapsed * rate_per_second).min(self.capacity as f64);
        self.last_refill = now;
    }
}

/// A token bucket that admits one request per available token.
///
/// Tokens refill continuously at `refill_rate_per_second` up to `capacity`,
/// and [`set_burst`](Self::set_burst) restores the full capacity at once.
/// Every operation performs its whole read-modify-write under a single
/// mutex, so concurrent callers never see a count outside `[0, capacity]`.
#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    refill_rate_per_second: f64,
}

impl TokenBucket {
    /// Create a full bucket from a limiter configuration.
    ///
    /// Capacity and refill rate both equal `max_attempts`.
    pub fn new(config: &RateLimiterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_rate(
            config.max_attempts,
            config.max_attempts as f64,
        ))
    }

    /// Create a full bucket with an explicit refill rate.
    ///
    /// A rate of zero disables continuous refill, leaving
    /// [`set_burst`](Self::set_burst) as the only way tokens come back.
    pub fn with_rate(capacity: u32, refill_rate_per_second: f64) -> Self {
        Self {
            state: Mutex::new(BucketState {
                capacity,
                available: capacity as f64,
                last_refill: Instant::now(),
            }),
            refill_rate_per_second: refill_rate_per_second.max(0.0),
        }
    }

    /// Try to take one token.
    ///
    /// Returns `true` and consumes a token if one is available, `false`
    /// otherwise. A denial leaves the bucket untouched apart from refill.
    pub fn allow(&self) -> bool {
        let mut state = self.state.lock();
        state.refill(self.refill_rate_per_second, Instant::now());

        if state.available >= 1.0 {
            state.available -= 1.0;
            trace!(
                remaining = state.available.floor() as u64,
                "Token granted"
            );
            true
        } else {
            trace!(capacity = state.capacity, "No token available");
            false
        }
    }

    /// Set the capacity and refill the bucket to it.
    ///
    /// This is a hard reset: the available count becomes exactly `capacity`
    /// whatever it was before, so calling it twice is the same as once.
    pub fn set_burst(&self, capacity: u32) {
        let mut state = self.state.lock();
        let previous = state.available.floor() as u64;

        state.capacity = capacity;
        state.available = capacity as f64;
        state.last_refill = Instant::now();

        debug!(
            capacity = capacity,
            previous = previous,
            "Burst reset"
        );
    }

    /// Get the current capacity.
    pub fn capacity(&self) -> u32 {
        self.state.lock().capacity
    }

    /// Get the number of whole tokens available right now.
    pub fn available_tokens(&self) -> u32 {
        let mut state = self.state.lock();
        state.refill(self.refill_rate_per_second, Instant::now());
        state.available.floor() as u32
    }

    /// Get the continuous refill rate.
    pub fn refill_rate_per_second(&self) -> f64 {
        self.refill_rate_per_second
    }
}

impl AdmissionControl for TokenBucket {
    fn allow(&self) -> bool {
        TokenBucket::allow(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BurstgateError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    #[test]
    fn test_new_bucket_starts_full() {
        let config = RateLimiterConfig::new(5, "too many");
        let bucket = TokenBucket::new(&config).unwrap();

        assert_eq!(bucket.capacity(), 5);
        assert_eq!(bucket.available_tokens(), 5);
        assert_eq!(bucket.refill_rate_per_second(), 5.0);
    }

    #[test]
    fn test_new_rejects_zero_attempts() {
        let config = RateLimiterConfig::new(0, "too many");
        let result = TokenBucket::new(&config);
        assert!(matches!(result, Err(BurstgateError::InvalidConfig(_))));
    }

    #[test]
    fn test_allow_until_empty() {
        let config = RateLimiterConfig::new(5, "too many");
        let bucket = TokenBucket::new(&config).unwrap();

        for _ in 0..5 {
            assert!(bucket.allow());
        }

        // The 6th request should be rejected
        assert!(!bucket.allow());
    }

    #[test]
    fn test_denial_does_not_mutate() {
        let bucket = TokenBucket::with_rate(2, 0.0);
        assert!(bucket.allow());
        assert!(bucket.allow());

        for _ in 0..10 {
            assert!(!bucket.allow());
            assert_eq!(bucket.available_tokens(), 0);
        }
    }

    #[test]
    fn test_set_burst_is_hard_reset() {
        let bucket = TokenBucket::with_rate(4, 0.0);
        assert!(bucket.allow());

        // 3 tokens left; reset must not add on top of them
        bucket.set_burst(4);
        assert_eq!(bucket.available_tokens(), 4);

        for _ in 0..4 {
            assert!(bucket.allow());
        }
        assert!(!bucket.allow());
    }

    #[test]
    fn test_set_burst_from_empty() {
        let bucket = TokenBucket::with_rate(3, 0.0);
        while bucket.allow() {}

        bucket.set_burst(3);
        let granted = (0..10).filter(|_| bucket.allow()).count();
        assert_eq!(granted, 3);
    }

    #[test]
    fn test_set_burst_is_idempotent() {
        let bucket = TokenBucket::with_rate(6, 0.0);
        bucket.set_burst(6);
        bucket.set_burst(6);
        assert_eq!(bucket.available_tokens(), 6);
    }

    #[test]
    fn test_set_burst_changes_capacity() {
        let bucket = TokenBucket::with_rate(6, 0.0);
        bucket.set_burst(2);
        assert_eq!(bucket.capacity(), 2);
        assert_eq!(bucket.available_tokens(), 2);
    }

    #[test]
    fn test_continuous_refill() {
        let bucket = TokenBucket::with_rate(2, 100.0);
        assert!(bucket.allow());
        assert!(bucket.allow());

        // 100 tokens per second gives one token back well within 50ms
        std::thread::sleep(Duration::from_millis(50));
        assert!(bucket.allow());
    }

    #[test]
    fn test_refill_never_exceeds_capacity() {
        let bucket = TokenBucket::with_rate(3, 1000.0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(bucket.available_tokens(), 3);
    }

    /// Race `threads` callers of `allow` released together, returning how
    /// many were granted and denied.
    fn race_allow(bucket: &TokenBucket, threads: usize) -> (usize, usize) {
        let capacity = bucket.capacity();
        let barrier = &Barrier::new(threads);
        let granted = &AtomicUsize::new(0);
        let denied = &AtomicUsize::new(0);
        let done = &AtomicBool::new(false);

        std::thread::scope(|s| {
            // Sample the count while requests race
            let sampler = s.spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    assert!(bucket.available_tokens() <= capacity);
                }
            });

            let workers: Vec<_> = (0..threads)
                .map(|_| {
                    s.spawn(move || {
                        barrier.wait();
                        if bucket.allow() {
                            granted.fetch_add(1, Ordering::SeqCst);
                        } else {
                            denied.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();

            for worker in workers {
                worker.join().unwrap();
            }
            done.store(true, Ordering::SeqCst);
            sampler.join().unwrap();
        });

        (granted.load(Ordering::SeqCst), denied.load(Ordering::SeqCst))
    }

    #[test]
    fn test_concurrent_allow_grants_exactly_capacity() {
        const CAPACITY: usize = 64;
        let bucket = TokenBucket::with_rate(CAPACITY as u32, 0.0);

        let (granted, denied) = race_allow(&bucket, CAPACITY * 2);

        assert_eq!(granted, CAPACITY);
        assert_eq!(denied, CAPACITY);
        assert_eq!(bucket.available_tokens(), 0);
    }

    #[test]
    fn test_concurrent_allow_with_configured_refill() {
        // Refill of 4 per second cannot return a token within the race
        let bucket = TokenBucket::new(&RateLimiterConfig::new(4, "slow down")).unwrap();
        assert_eq!(bucket.refill_rate_per_second(), 4.0);

        let (granted, denied) = race_allow(&bucket, 8);

        assert_eq!(granted, 4);
        assert_eq!(denied, 4);
        assert_eq!(bucket.available_tokens(), 0);
    }

    #[test]
    fn test_concurrent_allow_and_set_burst_stay_in_range() {
        const CAPACITY: u32 = 16;
        let bucket = &TokenBucket::with_rate(CAPACITY, 0.0);

        std::thread::scope(|s| {
            s.spawn(move || {
                for _ in 0..200 {
                    bucket.set_burst(CAPACITY);
                }
            });
            for _ in 0..4 {
                s.spawn(move || {
                    for _ in 0..500 {
                        bucket.allow();
                        assert!(bucket.available_tokens() <= CAPACITY);
                    }
                });
            }
        });

        assert!(bucket.available_tokens() <= CAPACITY);
    }
}
