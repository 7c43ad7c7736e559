//! Client configuration

use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = concat!("safawinet-client/", env!("CARGO_PKG_VERSION"));

/// Persistent storage keys. All three are written and cleared together.
pub struct SessionKeys;

impl SessionKeys {
    pub const USER: &'static str = "user";
    pub const AUTH_TOKEN: &'static str = "authToken";
    pub const REFRESH_TOKEN: &'static str = "refreshToken";
}

/// Idle time before automatic logout when the user has no preference
pub const DEFAULT_AUTO_LOGOUT: Duration = Duration::from_secs(30 * 60);

/// Tokens this close to `exp` are treated as already expired
pub const TOKEN_EXPIRY_LEEWAY: Duration = Duration::from_secs(10);

/// Timing of the real-time/poll hybrid updater
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Minimum spacing between automatic full fetches
    pub poll_interval: Duration,
    /// Pause after a 429 when the server gives no `Retry-After`
    pub rate_limit_cooldown: Duration,
    /// Delay between WebSocket connection attempts
    pub reconnect_interval: Duration,
    pub connect_timeout: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            rate_limit_cooldown: Duration::from_secs(60),
            reconnect_interval: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
        }
    }
}
