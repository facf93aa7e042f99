use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use burstgate::config::BurstgateConfig;
use burstgate::http::HttpServer;
use burstgate::ratelimit::RateLimiter;

/// Token bucket admission control for HTTP services.
#[derive(Debug, Parser)]
#[command(name = "burstgate", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Starting Burstgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = BurstgateConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.server.http_addr = addr;
    }
    info!(
        http_addr = %config.server.http_addr,
        max_attempts = config.rate_limiting.max_attempts,
        refresh_policy = ?config.rate_limiting.refresh_policy,
        "Configuration loaded"
    );

    // The limiter is owned here and shared with the server by reference
    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limiting)?);
    rate_limiter.start()?;
    info!(
        refresh_interval_secs = rate_limiter.refresh_interval().as_secs(),
        "Rate limiter initialized"
    );

    let http_server = HttpServer::new(config.server.http_addr, rate_limiter.clone());

    // Run the server with graceful shutdown on Ctrl+C
    let result = http_server.serve_with_shutdown(shutdown_signal()).await;

    rate_limiter.stop().await;
    result?;

    info!("Burstgate stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
