//! Error types for the realtime channel.

use crate::config::ConfigError;
use lms_core::CoreError;

/// Failures of a single transport connection.
///
/// These never reach channel consumers: the driver logs them and treats
/// them as a disconnect.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Handshake rejected: {0}")]
    Handshake(String),
    #[error("Timed out after {0} ms")]
    Timeout(u64),
    #[error("Polling session {0} expired")]
    SessionExpired(String),
    #[error("No transport could connect")]
    NoTransport,
    #[error(transparent)]
    Protocol(#[from] CoreError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Top-level error for the `lms-watch` binary and channel construction.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
