//! CLI configuration
//!
//! Values come from `config.toml` in the data directory (or `--config`),
//! overridden by `SAFAWINET_*` environment variables.

use anyhow::{Context, Result};
use safawinet_client::RealtimeConfig;
use safawinet_client::realtime::websocket::DEFAULT_SOCKET_PATH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.toml";
pub const SESSION_FILE: &str = "session.json";
const ENV_PREFIX: &str = "SAFAWINET";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Base URL of the admin API, without the `/api` suffix
    pub api_url: String,
    /// Path of the event socket on the API host
    pub socket_path: String,
    pub poll_interval_secs: u64,
    pub rate_limit_cooldown_secs: u64,
    pub reconnect_interval_secs: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000".to_string(),
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
            poll_interval_secs: 5,
            rate_limit_cooldown_secs: 60,
            reconnect_interval_secs: 15,
        }
    }
}

impl CliConfig {
    /// Load configuration with defaults, an optional file and environment
    /// variables, in increasing precedence
    pub fn load(path: &Path) -> Result<Self> {
        let defaults = Self::default();
        let settings = config::Config::builder()
            .set_default("api_url", defaults.api_url)?
            .set_default("socket_path", defaults.socket_path)?
            .set_default("poll_interval_secs", defaults.poll_interval_secs)?
            .set_default("rate_limit_cooldown_secs", defaults.rate_limit_cooldown_secs)?
            .set_default("reconnect_interval_secs", defaults.reconnect_interval_secs)?
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Ok(settings.try_deserialize()?)
    }

    pub fn realtime(&self) -> RealtimeConfig {
        RealtimeConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            rate_limit_cooldown: Duration::from_secs(self.rate_limit_cooldown_secs),
            reconnect_interval: Duration::from_secs(self.reconnect_interval_secs),
            ..RealtimeConfig::default()
        }
    }

    /// Write this configuration as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Data directory: `--data-dir`, then `SAFAWINET_STATE_DIR`, then the
/// platform data directory
pub fn resolve_data_dir(data_dir: Option<PathBuf>) -> PathBuf {
    data_dir.unwrap_or_else(|| {
        if let Ok(dir) = std::env::var("SAFAWINET_STATE_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("safawinet")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = CliConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.socket_path, DEFAULT_SOCKET_PATH);
        assert_eq!(config.realtime().poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            "api_url = \"https://admin.example.com\"\nrate_limit_cooldown_secs = 90\n",
        )
        .unwrap();

        let config = CliConfig::load(&path).unwrap();
        assert_eq!(config.api_url, "https://admin.example.com");
        assert_eq!(config.realtime().rate_limit_cooldown, Duration::from_secs(90));
        assert_eq!(config.reconnect_interval_secs, 15);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let config = CliConfig {
            poll_interval_secs: 10,
            ..CliConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(CliConfig::load(&path).unwrap(), config);
    }
}
