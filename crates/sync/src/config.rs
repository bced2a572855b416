// Client configuration for the sync core.
//
// Optional file: `~/.banter/config.toml`. Hosts embedding the core usually
// construct `SyncConfig` directly; the file path exists for tooling and
// tests. Missing file or missing fields fall back to defaults.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::backoff::ReconnectPolicy;
use crate::error::SyncError;

/// Root directory for Banter client state: `~/.banter/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".banter"))
}

/// Path to the client config file: `~/.banter/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

/// Connection and tuning parameters for the sync core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Push-channel endpoint (e.g. `wss://api.banter.app/ws`).
    pub ws_url: String,
    /// REST base URL for the fallback write path.
    pub api_url: String,
    /// Local username; excluded from typing aggregation.
    pub username: String,
    /// Connect attempts time out after this many milliseconds.
    pub connect_timeout_ms: u64,
    /// Heartbeat ping interval. Two missed intervals count as closure.
    pub heartbeat_interval_ms: u64,
    /// How long a push send waits for its server echo before falling back.
    pub send_confirm_timeout_ms: u64,
    /// Typing indicators expire after this long without a refresh.
    pub typing_ttl_ms: u64,
    /// Per-group in-memory message window.
    pub recent_window: usize,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub reconnect_max_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let policy = ReconnectPolicy::default();
        Self {
            ws_url: "wss://api.banter.app/ws".to_string(),
            api_url: "https://api.banter.app".to_string(),
            username: String::new(),
            connect_timeout_ms: 30_000,
            heartbeat_interval_ms: 15_000,
            send_confirm_timeout_ms: 10_000,
            typing_ttl_ms: 3_000,
            recent_window: 500,
            reconnect_base_delay_ms: policy.base_delay.as_millis() as u64,
            reconnect_max_delay_ms: policy.max_delay.as_millis() as u64,
            reconnect_max_attempts: policy.max_attempts,
        }
    }
}

impl SyncConfig {
    /// Load from `~/.banter/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn send_confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.send_confirm_timeout_ms)
    }

    pub fn typing_ttl(&self) -> Duration {
        Duration::from_millis(self.typing_ttl_ms)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
            max_attempts: self.reconnect_max_attempts,
        }
    }

    /// Reject insecure endpoints. `ws`/`http` are allowed only for loopback
    /// hosts so local test servers keep working.
    pub fn validate(&self) -> Result<(), SyncError> {
        validate_scheme(&self.ws_url, "wss", "ws")?;
        validate_scheme(&self.api_url, "https", "http")?;
        Ok(())
    }
}

fn validate_scheme(value: &str, secure: &str, loopback_only: &str) -> Result<(), SyncError> {
    let parsed = Url::parse(value)
        .map_err(|error| SyncError::InvalidConfig(format!("invalid url `{value}`: {error}")))?;
    let scheme = parsed.scheme();
    if scheme == secure {
        return Ok(());
    }
    if scheme == loopback_only && is_loopback_host(parsed.host_str()) {
        return Ok(());
    }
    Err(SyncError::InvalidConfig(format!(
        "`{value}` must use {secure} ({loopback_only} is allowed only for localhost testing)"
    )))
}

fn is_loopback_host(host: Option<&str>) -> bool {
    let Some(host) = host else {
        return false;
    };
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.parse::<IpAddr>().is_ok_and(|addr| addr.is_loopback())
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(std::io::Error),
    #[error("config parse error: {0}")]
    Parse(toml::de::Error),
}
