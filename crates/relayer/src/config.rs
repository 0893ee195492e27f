//! Configuration for the relayer.

/// Relayer configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Lead time added to "now" when issuing a start time.
    pub start_skew_ms: i64,
    /// Reuse a still-future start time for racing requests.
    pub coalesce_requests: bool,
    pub ping_interval_secs: u64,
    pub broadcast_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            start_skew_ms: 500,
            coalesce_requests: true,
            ping_interval_secs: 30,
            broadcast_capacity: 256,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT").unwrap_or(defaults.port),
            start_skew_ms: env_parse::<i64>("START_SKEW_MS")
                .map(|ms| ms.max(0))
                .unwrap_or(defaults.start_skew_ms),
            coalesce_requests: std::env::var("COALESCE_REQUESTS")
                .ok()
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.coalesce_requests),
            ping_interval_secs: env_parse::<u64>("PING_INTERVAL_SECS")
                .filter(|s| *s > 0)
                .unwrap_or(defaults.ping_interval_secs),
            broadcast_capacity: env_parse::<usize>("BROADCAST_CAPACITY")
                .filter(|c| *c > 0)
                .unwrap_or(defaults.broadcast_capacity),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
