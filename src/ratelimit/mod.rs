//! Rate limiting logic and state management.

mod backend;
mod bucket;
mod limiter;
mod policy;
mod refresher;

pub use backend::AdmissionControl;
pub use bucket::TokenBucket;
pub use limiter::RateLimiter;
pub use policy::{RateLimiterConfig, RefreshPolicy, DEFAULT_MESSAGE, MAX_REFRESH_INTERVAL_SECS};
pub use refresher::{BurstRefresher, RefresherHandle};
