//! Rate limit gate middleware.
//!
//! Wraps any [`AdmissionControl`] source as axum middleware. A denied
//! request gets `429 Too Many Requests` with a `{"error": "<message>"}`
//! body and never reaches the rest of the handler chain.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ratelimit::{AdmissionControl, RateLimiter, RateLimiterConfig};

/// JSON body sent with a rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Response for a request denied by the gate.
#[derive(Debug, Clone)]
pub struct RateLimitRejection {
    message: Arc<str>,
}

impl RateLimitRejection {
    /// Create a rejection carrying the message sent to the client.
    pub fn new(message: impl Into<Arc<str>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The message placed in the response body.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for RateLimitRejection {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message.to_string(),
        };
        (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
    }
}

/// Shared state for the gate middleware.
pub struct GateState<A> {
    admission: Arc<A>,
    message: Arc<str>,
}

// Manual impl so `A` itself need not be `Clone`
impl<A> Clone for GateState<A> {
    fn clone(&self) -> Self {
        Self {
            admission: self.admission.clone(),
            message: self.message.clone(),
        }
    }
}

impl<A: AdmissionControl> GateState<A> {
    /// Gate `admission` and reject with the configured message.
    pub fn new(admission: Arc<A>, config: &RateLimiterConfig) -> Self {
        Self {
            admission,
            message: Arc::from(config.message.as_str()),
        }
    }

    fn rejection(&self) -> RateLimitRejection {
        RateLimitRejection {
            message: self.message.clone(),
        }
    }
}

impl GateState<RateLimiter> {
    /// Gate a full rate limiter using its own configuration.
    pub fn from_limiter(limiter: Arc<RateLimiter>) -> Self {
        let message = Arc::from(limiter.message());
        Self {
            admission: limiter,
            message,
        }
    }
}

/// Middleware that admits or rejects each request.
///
/// Use with `axum::middleware::from_fn_with_state`.
pub async fn rate_limit_gate<A: AdmissionControl + 'static>(
    State(gate): State<GateState<A>>,
    request: Request,
    next: Next,
) -> Response {
    if !gate.admission.allow() {
        debug!(
            method = %request.method(),
            uri = %request.uri(),
            "Request rejected by rate limit gate"
        );
        return gate.rejection().into_response();
    }

    next.run(request).await
}
