use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};
use tracing::warn;
use traderoad_data::streams::controller::FeedConfig;
use url::Url;

pub const DEFAULT_WS_ADDR: &str = "127.0.0.1:9001";
pub const DEFAULT_PREFS_PATH: &str = "traderoad-preferences.json";

/// Server configuration, populated from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// `WS_ADDR`
    pub ws_addr: SocketAddr,
    /// `TRADEROAD_PREFS`
    pub prefs_path: PathBuf,
    /// `RECONNECT_DELAY_MS`, `READ_TIMEOUT_SECS` and `WS_BUFFER_SIZE`
    pub feed: FeedConfig,
    /// `ANALYSIS_URL`, analysis requests are refused when absent
    pub analysis_url: Option<Url>,
    /// `LOG_FORMAT=json`
    pub json_logs: bool,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Unparsable values fall back to their defaults.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default_addr = SocketAddr::from(([127, 0, 0, 1], 9001));
        let defaults = FeedConfig::default();

        let mut feed = defaults.clone();
        if let Some(millis) = parse_var::<u64>(&lookup, "RECONNECT_DELAY_MS") {
            feed = feed.with_reconnect_delay(Duration::from_millis(millis));
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "READ_TIMEOUT_SECS").filter(|secs| *secs > 0) {
            feed = feed.with_read_timeout(Duration::from_secs(secs));
        }
        if let Some(size) = parse_var::<usize>(&lookup, "WS_BUFFER_SIZE").filter(|size| *size > 0) {
            feed = feed.with_channel_buffer_size(size);
        }

        Self {
            ws_addr: parse_var(&lookup, "WS_ADDR").unwrap_or(default_addr),
            prefs_path: lookup("TRADEROAD_PREFS")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PREFS_PATH)),
            feed,
            analysis_url: parse_var(&lookup, "ANALYSIS_URL"),
            json_logs: lookup("LOG_FORMAT").is_some_and(|format| format.eq_ignore_ascii_case("json")),
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(key, value = %raw, %error, "ignoring invalid environment variable");
            None
        }
    }
}
