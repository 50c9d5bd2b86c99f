//! Transports carrying frames from the event source.
//!
//! The channel talks to a [`Transport`] only. [`NegotiatingTransport`]
//! tries WebSocket first and falls back to HTTP long-polling when the
//! upgrade is refused or blocked.

mod negotiate;
mod polling;
mod websocket;

pub use negotiate::NegotiatingTransport;
pub use polling::PollingTransport;
pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use lms_core::{Frame, TransportKind};
use reqwest::Url;

use crate::error::TransportError;

/// Establishes connections to the event source.
#[async_trait]
pub trait Transport: Send + Sync {
    fn label(&self) -> &'static str;

    /// Connect and complete the handshake. The returned connection already
    /// knows the server-assigned identifier.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError>;
}

/// One established connection.
#[async_trait]
pub trait Connection: Send {
    fn id(&self) -> &str;

    fn kind(&self) -> TransportKind;

    /// Next pushed frame. `None` means the connection closed cleanly.
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;

    /// Tear the connection down. Must be safe to call more than once.
    async fn close(&mut self);
}

/// Resolved event-source address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: Url,
    ws_path: String,
    poll_path: String,
}

impl Endpoint {
    pub fn parse(base: &str, ws_path: &str, poll_path: &str) -> Result<Self, TransportError> {
        let invalid = |reason: String| TransportError::InvalidEndpoint {
            endpoint: base.to_string(),
            reason,
        };
        let url = Url::parse(base.trim()).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" | "ws" | "wss" => {}
            other => return Err(invalid(format!("unsupported scheme '{}'", other))),
        }
        if url.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }
        Ok(Self {
            base: url,
            ws_path: ws_path.to_string(),
            poll_path: poll_path.to_string(),
        })
    }

    /// Base address without a trailing slash.
    pub fn as_str(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    pub fn websocket_url(&self) -> Result<Url, TransportError> {
        let scheme = match self.base.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        self.with_path(scheme, &self.ws_path)
    }

    pub fn polling_url(&self) -> Result<Url, TransportError> {
        let scheme = match self.base.scheme() {
            "https" | "wss" => "https",
            _ => "http",
        };
        self.with_path(scheme, &self.poll_path)
    }

    fn with_path(&self, scheme: &str, path: &str) -> Result<Url, TransportError> {
        let mut url = Url::parse(&format!("{}{}", self.as_str(), path)).map_err(|e| {
            TransportError::InvalidEndpoint {
                endpoint: self.as_str().to_string(),
                reason: e.to_string(),
            }
        })?;
        url.set_scheme(scheme)
            .map_err(|_| TransportError::InvalidEndpoint {
                endpoint: self.as_str().to_string(),
                reason: format!("cannot switch scheme to '{}'", scheme),
            })?;
        Ok(url)
    }
}
