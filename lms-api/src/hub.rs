//! Realtime frame distribution.
//!
//! A tokio broadcast channel fans frames out to every WebSocket connection
//! and every long-poll session. Each subscriber owns its own receiver, so a
//! slow client lags alone.

use lms_core::{CacheEvent, Frame};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::ApiResult;

pub struct RealtimeHub {
    tx: broadcast::Sender<Frame>,
}

impl RealtimeHub {
    /// Create a hub buffering up to `capacity` frames per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Broadcast a frame to all subscribers. Returns how many received it;
    /// zero subscribers is not an error.
    pub fn broadcast(&self, frame: Frame) -> usize {
        let event = frame.event.clone();
        match self.tx.send(frame) {
            Ok(receivers) => {
                debug!(event = %event, receivers, "Broadcast frame");
                receivers
            }
            Err(_) => {
                debug!(event = %event, "No receivers for frame");
                0
            }
        }
    }

    pub fn publish_cache_cleared(&self, event: &CacheEvent) -> ApiResult<usize> {
        let frame = Frame::cache_cleared(event)?;
        Ok(self.broadcast(frame))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
