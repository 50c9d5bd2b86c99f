//! Connection handle owned by one channel instance.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::event::Timestamp;

/// Transport that carried a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Full-duplex WebSocket.
    Websocket,
    /// HTTP long-polling fallback.
    Polling,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Websocket => "websocket",
            TransportKind::Polling => "polling",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a live (or just-lost) transport connection.
///
/// `live` is true iff a connect has been observed more recently than any
/// disconnect on this handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionHandle {
    /// Identifier assigned by the server during the handshake.
    pub id: String,
    pub transport: TransportKind,
    pub endpoint: String,
    pub connected_at: Timestamp,
    pub live: bool,
}

impl ConnectionHandle {
    pub fn new(
        id: impl Into<String>,
        transport: TransportKind,
        endpoint: impl Into<String>,
        connected_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            transport,
            endpoint: endpoint.into(),
            connected_at,
            live: true,
        }
    }

    pub fn mark_disconnected(&mut self) {
        self.live = false;
    }
}
