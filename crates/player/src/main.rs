//! Synchronized playback participant.
//!
//! Optional env: RELAY_WS_URL, REQUEST_TIMEOUT_MS, RECONNECT_DELAY_MS,
//! CLIENT_ID_PATH, PLAYER_COMMAND

use std::sync::Arc;

use clap::Parser;
use player::playback::CommandPlayer;
use player::relay_client::CoordinationClient;
use player::{cli, config, identity};
use tracing_subscriber::EnvFilter;

fn start(config: &config::Config) -> Arc<CoordinationClient> {
    let identity = identity::resolve(config.client_id_path.as_deref());
    let client = CoordinationClient::new(identity, config.client_options());
    tracing::info!(client_id = %client.identity(), relay = %config.relay_ws_url, "starting player");
    client.connect();
    client.register_playback_handler(Arc::new(CommandPlayer::new(
        config.player_command.as_deref(),
    )));
    client
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();
    let config = config::Config::from_env();

    match cli.command.unwrap_or(cli::Commands::Run) {
        cli::Commands::Run => {
            let client = start(&config);
            tokio::signal::ctrl_c().await?;
            client.shutdown();
        }
        cli::Commands::Trigger => {
            let client = start(&config);
            if !client.wait_until_open(config.request_timeout).await {
                tracing::warn!("relay not reachable yet, playing without coordination");
            }
            client.trigger_synchronized_playback().await;
            tokio::signal::ctrl_c().await?;
            client.shutdown();
        }
        cli::Commands::Id => {
            let identity = identity::resolve(config.client_id_path.as_deref());
            println!("{}", identity);
        }
    }

    Ok(())
}
