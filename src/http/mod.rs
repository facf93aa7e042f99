//! HTTP module hosting the rate limit gate.

mod gate;
mod server;

pub use gate::{rate_limit_gate, ErrorBody, GateState, RateLimitRejection};
pub use server::HttpServer;
