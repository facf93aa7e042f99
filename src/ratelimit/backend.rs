//! Admission control trait for abstracting over limiter implementations.

/// A source of yes/no admission decisions.
///
/// This trait abstracts over a bare `TokenBucket` and a full `RateLimiter`
/// so the HTTP gate can work with either.
pub trait AdmissionControl: Send + Sync {
    /// Decide whether one more request may proceed right now.
    fn allow(&self) -> bool;
}
