//! Client configuration.
//!
//! Loaded from TOML, then overridden from the environment (`DUEL_RELAY_URL`,
//! `DUEL_USER_ID`). Without a relay URL the client plays as a guest over the
//! same-device channel.

use derive_getters::Getters;
use derive_more::{Display, Error};
use duel_core::{ClockPair, DisconnectTimer, Role, RuleTable};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use url::Url;

/// Environment variable overriding the relay address.
pub const RELAY_URL_VAR: &str = "DUEL_RELAY_URL";

/// Environment variable overriding the user id.
pub const USER_ID_VAR: &str = "DUEL_USER_ID";

/// Settings for one client.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Websocket address of the relay. Absent means guest play.
    #[serde(default)]
    relay_url: Option<String>,

    /// User id presented to the relay. A guest id is generated when absent.
    #[serde(default)]
    user_id: Option<String>,

    /// Match to join.
    #[serde(default = "default_match_id")]
    match_id: String,

    /// Seat in the match.
    #[serde(default = "default_role")]
    role: Role,

    /// Whether this user is a guest.
    #[serde(default)]
    guest: bool,

    /// Starting time on each clock.
    #[serde(default = "default_clock_seconds")]
    clock_seconds: u32,

    /// Heartbeat period while connected.
    #[serde(default = "default_heartbeat_seconds")]
    heartbeat_seconds: u64,

    /// First wait before reopening a lost relay connection.
    #[serde(default = "default_reconnect_seconds")]
    reconnect_seconds: u64,

    /// Grace window the relay gives a disconnected player.
    #[serde(default = "default_disconnect_grace_seconds")]
    disconnect_grace_seconds: i64,

    /// Rule table to load instead of the built-in one.
    #[serde(default)]
    rules: Option<PathBuf>,
}

fn default_match_id() -> String {
    "local".to_string()
}

fn default_role() -> Role {
    Role::Player1
}

fn default_clock_seconds() -> u32 {
    600
}

fn default_heartbeat_seconds() -> u64 {
    5
}

fn default_reconnect_seconds() -> u64 {
    2
}

fn default_disconnect_grace_seconds() -> i64 {
    60
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            user_id: None,
            match_id: default_match_id(),
            role: default_role(),
            guest: false,
            clock_seconds: default_clock_seconds(),
            heartbeat_seconds: default_heartbeat_seconds(),
            reconnect_seconds: default_reconnect_seconds(),
            disconnect_grace_seconds: default_disconnect_grace_seconds(),
            rules: None,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;

        info!(match_id = %config.match_id, role = %config.role, "Config loaded successfully");
        Ok(config)
    }

    /// Loads from `path` if given, otherwise starts from defaults, then
    /// applies process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Applies overrides from a variable lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(RELAY_URL_VAR).filter(|v| !v.is_empty()) {
            debug!(%url, "Relay url overridden from environment");
            self.relay_url = Some(url);
        }
        if let Some(user) = lookup(USER_ID_VAR).filter(|v| !v.is_empty()) {
            debug!(%user, "User id overridden from environment");
            self.user_id = Some(user);
        }
        self
    }

    /// Sets the relay address.
    pub fn with_relay_url(mut self, url: impl Into<String>) -> Self {
        self.relay_url = Some(url.into());
        self
    }

    /// Sets the match id.
    pub fn with_match_id(mut self, match_id: impl Into<String>) -> Self {
        self.match_id = match_id.into();
        self
    }

    /// Sets the seat.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// The relay address, validated.
    pub fn relay(&self) -> Result<Option<Url>, ConfigError> {
        let Some(raw) = &self.relay_url else {
            return Ok(None);
        };
        let url = Url::parse(raw)
            .map_err(|e| ConfigError::new(format!("Invalid relay url '{}': {}", raw, e)))?;
        match url.scheme() {
            "ws" | "wss" => Ok(Some(url)),
            other => Err(ConfigError::new(format!(
                "Relay url must use ws or wss, got '{}'",
                other
            ))),
        }
    }

    /// Whether the client plays without a relay.
    pub fn is_guest(&self) -> bool {
        self.guest || self.relay_url.is_none()
    }

    /// The configured user id, or a fresh guest id.
    pub fn resolved_user_id(&self) -> String {
        self.user_id
            .clone()
            .unwrap_or_else(|| format!("guest-{}", uuid::Uuid::new_v4()))
    }

    /// The rule table to play with.
    pub fn rule_table(&self) -> Result<RuleTable, ConfigError> {
        match &self.rules {
            Some(path) => RuleTable::from_file(path).map_err(|e| ConfigError::new(e.to_string())),
            None => Ok(RuleTable::standard()),
        }
    }

    /// Starting clocks.
    pub fn clocks(&self) -> ClockPair {
        ClockPair::new(self.clock_seconds)
    }

    /// Forfeiture countdown for a disconnected peer.
    pub fn disconnect_timer(&self) -> DisconnectTimer {
        DisconnectTimer::new(chrono::Duration::seconds(self.disconnect_grace_seconds))
    }

    /// Heartbeat period.
    pub fn heartbeat_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.heartbeat_seconds.max(1))
    }

    /// Base backoff before reconnecting to the relay.
    pub fn reconnect_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reconnect_seconds.max(1))
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}
