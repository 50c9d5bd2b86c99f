//! Configuration loading for the realtime channel.
//!
//! Every field has a default, so running without a config file is valid.
//! The endpoint resolves from `LMS_REALTIME_URL`, then the file, then
//! `http://localhost:5000`.

use lms_core::TransportKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::TransportError;
use crate::transport::Endpoint;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:5000";
pub const ENDPOINT_ENV: &str = "LMS_REALTIME_URL";
pub const CONFIG_PATH_ENV: &str = "LMS_REALTIME_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RealtimeConfig {
    /// Event-source base address. `None` falls back to [`DEFAULT_ENDPOINT`].
    pub endpoint: Option<String>,
    /// Transports in order of preference.
    pub transports: Vec<TransportKind>,
    pub ws_path: String,
    pub poll_path: String,
    pub connect_timeout_ms: u64,
    /// Client-side limit for one long-poll request. Must exceed the
    /// server's hold time.
    pub poll_timeout_ms: u64,
    pub reconnect: ReconnectConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub delay_ms: u64,
    /// 1.0 keeps the delay fixed; larger values back off exponentially.
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub title: String,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            transports: vec![TransportKind::Websocket, TransportKind::Polling],
            ws_path: "/realtime/ws".to_string(),
            poll_path: "/realtime/poll".to_string(),
            connect_timeout_ms: 10_000,
            poll_timeout_ms: 30_000,
            reconnect: ReconnectConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            delay_ms: 1_000,
            multiplier: 1.0,
            max_delay_ms: 1_000,
            jitter_ms: 0,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            title: "Cache Cleared".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl RealtimeConfig {
    /// Load from `--config <path>` or `LMS_REALTIME_CONFIG`, falling back
    /// to defaults when neither is set, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let mut config = match path {
            Some(path) => Self::from_path(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = lookup(ENDPOINT_ENV).filter(|v| !v.trim().is_empty()) {
            self.endpoint = Some(endpoint);
        }
    }

    pub fn endpoint_or_default(&self) -> &str {
        self.endpoint
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(DEFAULT_ENDPOINT)
    }

    pub fn resolve_endpoint(&self) -> Result<Endpoint, TransportError> {
        Endpoint::parse(self.endpoint_or_default(), &self.ws_path, &self.poll_path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transports.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "transports",
                reason: "at least one transport is required".to_string(),
            });
        }
        if !self.ws_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "ws_path",
                reason: "must start with '/'".to_string(),
            });
        }
        if !self.poll_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "poll_path",
                reason: "must start with '/'".to_string(),
            });
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "connect_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.poll_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "poll_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if let Err(err) = self.resolve_endpoint() {
            return Err(ConfigError::InvalidValue {
                field: "endpoint",
                reason: err.to_string(),
            });
        }
        if self.reconnect.delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reconnect.delay_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.reconnect.multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "reconnect.multiplier",
                reason: "must be >= 1.0".to_string(),
            });
        }
        if self.reconnect.max_delay_ms < self.reconnect.delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "reconnect.max_delay_ms",
                reason: "must be >= delay_ms".to_string(),
            });
        }
        if self.notifications.title.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "notifications.title",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
