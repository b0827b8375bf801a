use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployerConfig {
    /// HTTP base URL of the backend API.
    pub api_base_url: String,
    /// WebSocket URL for backend events. Empty disables the socket.
    pub ws_url: String,
    /// Pre-issued bearer token, if any.
    pub token: Option<String>,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
    /// Automatic retries per API call on transient failure.
    pub retry_attempts: u32,
    /// Base delay for linear retry backoff, in milliseconds.
    pub retry_delay_ms: u64,
    /// Fixed delay between socket reconnect attempts, in milliseconds.
    pub reconnect_interval_ms: u64,
    /// Reconnect attempts before the socket gives up.
    pub max_reconnect_attempts: u32,
    /// Socket heartbeat period in seconds.
    pub heartbeat_interval_secs: u64,
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".into(),
            ws_url: String::new(),
            token: None,
            request_timeout_secs: 30,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            reconnect_interval_ms: 3000,
            max_reconnect_attempts: 5,
            heartbeat_interval_secs: 30,
        }
    }
}

impl DeployerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `DEPLOYER_API_URL`        | `http://localhost:8000` |
    /// | `DEPLOYER_WS_URL`         | empty                   |
    /// | `DEPLOYER_TOKEN`          | unset                   |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                    |
    /// | `RETRY_ATTEMPTS`          | `3`                     |
    /// | `RETRY_DELAY_MS`          | `1000`                  |
    /// | `RECONNECT_INTERVAL_MS`   | `3000`                  |
    /// | `MAX_RECONNECT_ATTEMPTS`  | `5`                     |
    /// | `HEARTBEAT_INTERVAL_SECS` | `30`                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            api_base_url: non_empty("DEPLOYER_API_URL").unwrap_or(defaults.api_base_url),
            ws_url: non_empty("DEPLOYER_WS_URL").unwrap_or(defaults.ws_url),
            token: non_empty("DEPLOYER_TOKEN"),
            request_timeout_secs: parse_or(
                "REQUEST_TIMEOUT_SECS",
                non_empty("REQUEST_TIMEOUT_SECS"),
                defaults.request_timeout_secs,
            )?,
            retry_attempts: parse_or(
                "RETRY_ATTEMPTS",
                non_empty("RETRY_ATTEMPTS"),
                defaults.retry_attempts,
            )?,
            retry_delay_ms: parse_or(
                "RETRY_DELAY_MS",
                non_empty("RETRY_DELAY_MS"),
                defaults.retry_delay_ms,
            )?,
            reconnect_interval_ms: parse_or(
                "RECONNECT_INTERVAL_MS",
                non_empty("RECONNECT_INTERVAL_MS"),
                defaults.reconnect_interval_ms,
            )?,
            max_reconnect_attempts: parse_or(
                "MAX_RECONNECT_ATTEMPTS",
                non_empty("MAX_RECONNECT_ATTEMPTS"),
                defaults.max_reconnect_attempts,
            )?,
            heartbeat_interval_secs: parse_or(
                "HEARTBEAT_INTERVAL_SECS",
                non_empty("HEARTBEAT_INTERVAL_SECS"),
                defaults.heartbeat_interval_secs,
            )?,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

fn parse_or<T: FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
