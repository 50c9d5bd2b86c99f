//! API Configuration Module
//!
//! Configuration is loaded from environment variables with defaults that
//! match the client's default endpoint (`http://localhost:5000`).

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind host.
    pub bind_host: String,

    /// Bind port.
    pub port: u16,

    /// Frames buffered per subscriber before it is considered lagged.
    pub hub_capacity: usize,

    /// How long a long-poll request is held open waiting for frames.
    pub poll_timeout: Duration,

    /// Idle time after which a long-poll session is dropped.
    pub poll_session_ttl: Duration,

    /// Allowed CORS origins. Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 5000,
            hub_capacity: 1000,
            poll_timeout: Duration::from_millis(25_000),
            poll_session_ttl: Duration::from_millis(60_000),
            cors_origins: Vec::new(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `LMS_API_BIND`: Bind host (default: 0.0.0.0)
    /// - `PORT` or `LMS_API_PORT`: Bind port (default: 5000)
    /// - `LMS_HUB_CAPACITY`: Broadcast buffer per subscriber (default: 1000)
    /// - `LMS_POLL_TIMEOUT_MS`: Long-poll hold time (default: 25000)
    /// - `LMS_POLL_SESSION_TTL_MS`: Idle session expiry (default: 60000)
    /// - `LMS_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    pub fn from_env() -> ApiResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ApiResult<Self> {
        let defaults = Self::default();

        let bind_host = lookup("LMS_API_BIND").unwrap_or(defaults.bind_host);

        let port = match lookup("PORT").or_else(|| lookup("LMS_API_PORT")) {
            Some(value) => value
                .parse::<u16>()
                .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", value)))?,
            None => defaults.port,
        };

        let hub_capacity = lookup("LMS_HUB_CAPACITY")
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.hub_capacity);

        let poll_timeout = lookup("LMS_POLL_TIMEOUT_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_timeout);

        let poll_session_ttl = lookup("LMS_POLL_SESSION_TTL_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_session_ttl);

        let cors_origins = lookup("LMS_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let config = Self {
            bind_host,
            port,
            hub_capacity,
            poll_timeout,
            poll_session_ttl,
            cors_origins,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ApiResult<()> {
        if self.poll_session_ttl <= self.poll_timeout {
            return Err(ApiError::invalid_input(
                "LMS_POLL_SESSION_TTL_MS must exceed LMS_POLL_TIMEOUT_MS",
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind_host, self.port);
        addr.parse::<SocketAddr>().map_err(|e| {
            ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.bind_addr().unwrap().to_string(), "0.0.0.0:5000");
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn test_port_prefers_port_var() {
        let config =
            ApiConfig::from_lookup(lookup(&[("PORT", "8080"), ("LMS_API_PORT", "9090")])).unwrap();
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(ApiConfig::from_lookup(lookup(&[("LMS_API_PORT", "http")])).is_err());
    }

    #[test]
    fn test_cors_origins_split() {
        let config = ApiConfig::from_lookup(lookup(&[(
            "LMS_CORS_ORIGINS",
            "https://admin.lms.dev, https://lms.dev,,",
        )]))
        .unwrap();
        assert_eq!(config.cors_origins, vec!["https://admin.lms.dev", "https://lms.dev"]);
    }

    #[test]
    fn test_ttl_must_exceed_poll_timeout() {
        let result = ApiConfig::from_lookup(lookup(&[
            ("LMS_POLL_TIMEOUT_MS", "5000"),
            ("LMS_POLL_SESSION_TTL_MS", "1000"),
        ]));
        assert!(result.is_err());
    }
}
