//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, middleware, routing::get, Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::gate::{rate_limit_gate, GateState};
use crate::error::{BurstgateError, Result};
use crate::ratelimit::RateLimiter;

/// HTTP server whose application routes sit behind the rate limit gate.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The rate limiter instance
    rate_limiter: Arc<RateLimiter>,
}

impl HttpServer {
    /// Create a new HTTP server gated by `rate_limiter`.
    pub fn new(addr: SocketAddr, rate_limiter: Arc<RateLimiter>) -> Self {
        Self { addr, rate_limiter }
    }

    /// Build the router.
    ///
    /// `/` is gated; `/health` is not, so health checks keep working while clients
    /// are being rejected.
    pub fn router(&self) -> Router {
        let gate = GateState::from_limiter(self.rate_limiter.clone());

        Router::new()
            .route("/", get(index))
            .route_layer(middleware::from_fn_with_state(
                gate,
                rate_limit_gate::<RateLimiter>,
            ))
            .route("/health", get(health))
            .with_state(self.rate_limiter.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Start the HTTP server.
    ///
    /// This method will block until the server fails.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();

        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            BurstgateError::Io(e)
        })?;

        info!(
            addr = %listener.local_addr()?,
            "Starting HTTP server with graceful shutdown"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                BurstgateError::Io(e)
            })
    }
}

async fn index() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn health(State(limiter): State<Arc<RateLimiter>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "refresher_running": limiter.is_running(),
        "available_tokens": limiter.bucket().available_tokens(),
        "capacity": limiter.bucket().capacity(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::RateLimiterConfig;
    use axum::{body::Body, http};
    use tower::ServiceExt;

    fn test_server(max_attempts: u32) -> HttpServer {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let limiter = RateLimiter::new(RateLimiterConfig::new(max_attempts, "slow down")).unwrap();
        HttpServer::new(addr, Arc::new(limiter))
    }

    fn request(uri: &str) -> http::Request<Body> {
        http::Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_index_is_gated() {
        let app = test_server(1).router();

        let response = app.clone().oneshot(request("/")).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);

        let response = app.oneshot(request("/")).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_health_is_not_gated() {
        let app = test_server(1).router();

        for _ in 0..5 {
            let response = app.clone().oneshot(request("/health")).await.unwrap();
            assert_eq!(response.status(), http::StatusCode::OK);
        }

        let response = app.oneshot(request("/health")).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["capacity"], 1);
        assert_eq!(body["refresher_running"], false);
    }

    #[tokio::test]
    async fn test_serve_with_immediate_shutdown() {
        let server = test_server(3);
        tokio_test::assert_ok!(server.serve_with_shutdown(async {}).await);
    }
}
