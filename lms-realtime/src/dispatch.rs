//! Channel state and the single dispatch function that mutates it.

use lms_core::{CacheEvent, ConnectionHandle};
use serde::Serialize;
use std::fmt;

/// Signals delivered to the channel, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected(ConnectionHandle),
    Disconnected { reason: String },
    CacheCleared(CacheEvent),
}

/// Lifecycle phase.
///
/// `Inactive → Connecting → Connected ⇄ Retrying → Exhausted`; any phase
/// moves to `Inactive` on deactivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Inactive,
    Connecting,
    Connected,
    /// Disconnected, waiting before reconnection attempt `attempt`.
    Retrying { attempt: u32 },
    /// Disconnected and no longer retrying until reactivated.
    Exhausted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Inactive => f.write_str("inactive"),
            Phase::Connecting => f.write_str("connecting"),
            Phase::Connected => f.write_str("connected"),
            Phase::Retrying { attempt } => write!(f, "retrying (attempt {})", attempt),
            Phase::Exhausted => f.write_str("disconnected (not retrying)"),
        }
    }
}

/// Everything a consumer can observe about the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelState {
    pub phase: Phase,
    /// Current or most recent connection; `None` before the first connect
    /// and after deactivation.
    pub handle: Option<ConnectionHandle>,
    /// Most recent cache event. Overwritten, never accumulated.
    pub last_event: Option<CacheEvent>,
    pub last_error: Option<String>,
}

impl ChannelState {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            handle: None,
            last_event: None,
            last_error: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| handle.live)
    }

    pub fn apply(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected(handle) => {
                self.handle = Some(handle);
                self.phase = Phase::Connected;
                self.last_error = None;
            }
            ChannelEvent::Disconnected { reason } => {
                if let Some(handle) = self.handle.as_mut() {
                    handle.mark_disconnected();
                }
                if self.phase == Phase::Connected {
                    self.phase = Phase::Retrying { attempt: 0 };
                }
                self.last_error = Some(reason);
            }
            ChannelEvent::CacheCleared(event) => {
                self.last_event = Some(event);
            }
        }
    }
}

impl Default for ChannelState {
    fn default() -> Self {
        Self::new(Phase::Inactive)
    }
}
