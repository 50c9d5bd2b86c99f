//! Wire frames shared by every transport.
//!
//! A frame is a JSON object `{"event": <name>, "data": <payload>}`. The
//! WebSocket transport sends one frame per text message; the long-poll
//! transport returns batches of frames.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::error::{CoreError, CoreResult};
use crate::event::CacheEvent;

pub const EVENT_CONNECT: &str = "connect";
pub const EVENT_DISCONNECT: &str = "disconnect";
pub const EVENT_CACHE_CLEARED: &str = "cache:cleared";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub data: JsonValue,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: JsonValue) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Handshake frame carrying the connection identifier.
    pub fn connect(sid: &str) -> Self {
        Self::new(EVENT_CONNECT, json!({ "sid": sid }))
    }

    pub fn disconnect(reason: &str) -> Self {
        Self::new(EVENT_DISCONNECT, json!({ "reason": reason }))
    }

    pub fn cache_cleared(event: &CacheEvent) -> CoreResult<Self> {
        let data =
            serde_json::to_value(event).map_err(|e| CoreError::Serialization(e.to_string()))?;
        Ok(Self::new(EVENT_CACHE_CLEARED, data))
    }

    pub fn parse(text: &str) -> CoreResult<Self> {
        serde_json::from_str(text).map_err(|e| CoreError::MalformedFrame(e.to_string()))
    }

    pub fn to_text(&self) -> CoreResult<String> {
        serde_json::to_string(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}

/// Response body of one long-poll request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollBatch {
    pub sid: String,
    #[serde(default)]
    pub frames: Vec<Frame>,
}

/// Typed view of a frame the client subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    Connect { sid: String },
    Disconnect { reason: Option<String> },
    CacheCleared(CacheEvent),
}

impl WireEvent {
    /// Decode a frame. Event names outside the vocabulary yield `Ok(None)`.
    pub fn decode(frame: &Frame) -> CoreResult<Option<Self>> {
        match frame.event.as_str() {
            EVENT_CONNECT => {
                let sid = frame
                    .data
                    .get("sid")
                    .and_then(JsonValue::as_str)
                    .filter(|sid| !sid.is_empty())
                    .ok_or_else(|| CoreError::invalid_payload(EVENT_CONNECT, "missing sid"))?;
                Ok(Some(WireEvent::Connect {
                    sid: sid.to_string(),
                }))
            }
            EVENT_DISCONNECT => {
                let reason = frame
                    .data
                    .get("reason")
                    .and_then(JsonValue::as_str)
                    .map(str::to_string);
                Ok(Some(WireEvent::Disconnect { reason }))
            }
            EVENT_CACHE_CLEARED => {
                let event = CacheEvent::from_value(frame.data.clone())?;
                Ok(Some(WireEvent::CacheCleared(event)))
            }
            _ => Ok(None),
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            WireEvent::Connect { .. } => EVENT_CONNECT,
            WireEvent::Disconnect { .. } => EVENT_DISCONNECT,
            WireEvent::CacheCleared(_) => EVENT_CACHE_CLEARED,
        }
    }
}
