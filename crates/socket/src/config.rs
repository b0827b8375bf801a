use std::time::Duration;

use deployer_core::DeployerConfig;

/// Delay between a close and the next connection attempt.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);

/// Automatic reconnects allowed before the socket gives up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Interval between application-level pings while connected.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Pause between teardown and reopen on a manual reconnect.
pub const MANUAL_RECONNECT_DELAY: Duration = Duration::from_millis(100);

/// Timing and retry settings for a [`ReconnectingSocket`](crate::ReconnectingSocket).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketConfig {
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
    pub heartbeat_interval: Duration,
    pub manual_reconnect_delay: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            manual_reconnect_delay: MANUAL_RECONNECT_DELAY,
        }
    }
}

impl From<&DeployerConfig> for SocketConfig {
    fn from(config: &DeployerConfig) -> Self {
        Self {
            reconnect_interval: config.reconnect_interval(),
            max_reconnect_attempts: config.max_reconnect_attempts,
            heartbeat_interval: config.heartbeat_interval(),
            ..Self::default()
        }
    }
}
