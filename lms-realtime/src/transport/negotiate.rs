//! Ordered transport negotiation.

use async_trait::async_trait;
use lms_core::TransportKind;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{Connection, Endpoint, PollingTransport, Transport, WebSocketTransport};
use crate::config::RealtimeConfig;
use crate::error::TransportError;

/// Tries each transport in order and keeps the first that connects.
pub struct NegotiatingTransport {
    transports: Vec<Arc<dyn Transport>>,
}

impl NegotiatingTransport {
    pub fn new(transports: Vec<Arc<dyn Transport>>) -> Self {
        Self { transports }
    }

    pub fn from_config(config: &RealtimeConfig) -> Result<Self, TransportError> {
        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
        let poll_timeout = Duration::from_millis(config.poll_timeout_ms);
        let mut transports: Vec<Arc<dyn Transport>> = Vec::with_capacity(config.transports.len());
        for kind in &config.transports {
            match kind {
                TransportKind::Websocket => {
                    transports.push(Arc::new(WebSocketTransport::new(connect_timeout)))
                }
                TransportKind::Polling => transports.push(Arc::new(PollingTransport::new(
                    connect_timeout,
                    poll_timeout,
                )?)),
            }
        }
        Ok(Self::new(transports))
    }
}

#[async_trait]
impl Transport for NegotiatingTransport {
    fn label(&self) -> &'static str {
        "negotiated"
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError> {
        let mut last_error = None;
        for transport in &self.transports {
            match transport.connect(endpoint).await {
                Ok(connection) => {
                    info!(
                        transport = transport.label(),
                        sid = %connection.id(),
                        endpoint = %endpoint.as_str(),
                        "Transport connected"
                    );
                    return Ok(connection);
                }
                Err(err) => {
                    warn!(
                        transport = transport.label(),
                        error = %err,
                        "Transport unavailable"
                    );
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or(TransportError::NoTransport))
    }
}
