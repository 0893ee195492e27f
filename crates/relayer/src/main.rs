//! Playback relayer — WebSocket backend.
//!
//! Optional env: HOST, PORT, START_SKEW_MS, COALESCE_REQUESTS,
//! PING_INTERVAL_SECS, BROADCAST_CAPACITY

use std::net::SocketAddr;

use relayer::{api, config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::Config::from_env();
    let addr: SocketAddr = config
        .bind_addr()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address {}: {}", config.bind_addr(), e))?;

    tracing::info!(
        start_skew_ms = config.start_skew_ms,
        coalesce = config.coalesce_requests,
        "relay configured"
    );
    let app = api::router(api::AppState::new(config));

    tracing::info!("Relayer listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
