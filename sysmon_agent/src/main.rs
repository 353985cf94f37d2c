//! sysmon_agent binary: logging, configuration and the HTTP server.

use anyhow::Context;
use sysmon_agent::{http, AgentConfig, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sysmon_agent=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = AgentConfig::load(std::env::args());
    let addr = config.addr();
    let state = AppState::new(config);
    let app = http::router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        %addr,
        interval_ms = state.config.sample_interval.as_millis() as u64,
        "sysmon_agent listening"
    );

    let monitor = state.monitor.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
            monitor.shutdown().await;
        })
        .await
        .context("server error")?;
    Ok(())
}
