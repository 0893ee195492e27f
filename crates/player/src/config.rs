//! Configuration for the player.

use std::path::PathBuf;
use std::time::Duration;

use crate::relay_client::ClientOptions;

/// Player configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub relay_ws_url: String,
    pub request_timeout: Duration,
    pub reconnect_delay: Duration,
    /// Identity file override; the platform data dir is used otherwise.
    pub client_id_path: Option<PathBuf>,
    /// Player command line, e.g. `mpv --fs ~/Video.mp4`.
    pub player_command: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = ClientOptions::default();
        let millis = |key: &str, default: Duration| {
            std::env::var(key)
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };
        Self {
            relay_ws_url: std::env::var("RELAY_WS_URL").unwrap_or(defaults.url),
            request_timeout: millis("REQUEST_TIMEOUT_MS", defaults.request_timeout),
            reconnect_delay: millis("RECONNECT_DELAY_MS", defaults.reconnect_delay),
            client_id_path: std::env::var("CLIENT_ID_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(|p| PathBuf::from(shellexpand::tilde(&p).to_string())),
            player_command: std::env::var("PLAYER_COMMAND")
                .ok()
                .filter(|c| !c.trim().is_empty()),
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            url: self.relay_ws_url.clone(),
            request_timeout: self.request_timeout,
            reconnect_delay: self.reconnect_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_options_carry_config_values() {
        let config = Config {
            relay_ws_url: "wss://relay.example/ws".to_string(),
            request_timeout: Duration::from_millis(1_500),
            reconnect_delay: Duration::from_millis(3_000),
            client_id_path: None,
            player_command: None,
        };
        let options = config.client_options();
        assert_eq!(options.url, "wss://relay.example/ws");
        assert_eq!(options.request_timeout, Duration::from_millis(1_500));
        assert_eq!(options.reconnect_delay, Duration::from_millis(3_000));
    }
}
