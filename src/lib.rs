//! Burstgate - Token Bucket Admission Control
//!
//! This crate implements a token bucket rate limiter that admits requests at
//! a fixed rate and periodically restores its full burst allowance. The
//! decision is exposed as axum middleware that rejects excess requests with
//! `429 Too Many Requests`.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
