//! Media Stream Gateway Server
//!
//! Loads configuration, sets up logging, and serves streams until Ctrl-C.

use anyhow::Context;
use media_stream::{AppState, MetricsEndpoint, Server, StreamConfig, WorkerPool};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Main entry point for the gateway
///
/// # Usage
/// ```bash
/// # Start with default config (media_stream.yaml)
/// media-stream
///
/// # Start with custom config
/// media-stream /path/to/config.yaml
/// ```
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "media_stream.yaml".to_string());

    let config = StreamConfig::from_file(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting media stream gateway");
    info!("Configuration loaded from {}", config_path);
    info!("  - Block size: {} bytes ({} KB)", config.block_size, config.block_size / 1024);
    info!("  - Cache TTL: {} seconds", config.cache.ttl_secs);
    info!("  - Workers: {}", config.workers.len());

    let pool = WorkerPool::from_config(&config)?;
    let state = Arc::new(AppState::new(&config, pool)?);

    let addr: SocketAddr = config
        .listen_address
        .parse()
        .with_context(|| format!("invalid listen_address '{}'", config.listen_address))?;
    let server = Server::bind(addr, Arc::clone(&state))
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    if let Some(endpoint_config) = config.metrics_endpoint.as_ref().filter(|c| c.enabled) {
        let metrics_addr: SocketAddr = endpoint_config
            .address
            .parse()
            .with_context(|| format!("invalid metrics address '{}'", endpoint_config.address))?;
        let mut endpoint = MetricsEndpoint::new(Arc::clone(&state.metrics), metrics_addr);
        if let Some(worker_metrics) = &state.worker_metrics {
            endpoint = endpoint.with_worker_metrics(Arc::clone(worker_metrics));
        }

        tokio::spawn(async move {
            if let Err(e) = endpoint.run_until(shutdown_signal()).await {
                error!("Metrics endpoint failed: {}", e);
            }
        });
    }

    server.run_until(shutdown_signal()).await?;
    info!("Media stream gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
