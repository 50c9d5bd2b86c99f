//! HTTP long-polling sessions for clients that cannot upgrade to WebSocket.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use dashmap::DashMap;
use lms_core::{Frame, PollBatch};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::hub::RealtimeHub;
use crate::state::AppState;

/// Frames returned by one poll at most.
const MAX_BATCH: usize = 64;

pub struct PollSession {
    rx: tokio::sync::Mutex<broadcast::Receiver<Frame>>,
    last_seen: Mutex<Instant>,
}

impl PollSession {
    fn new(rx: broadcast::Receiver<Frame>) -> Self {
        Self {
            rx: tokio::sync::Mutex::new(rx),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(|p| p.into_inner()) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .elapsed()
    }

    /// Wait up to `hold` for the next frame, then drain whatever else is
    /// already buffered.
    pub async fn next_batch(&self, sid: &str, hold: Duration) -> Vec<Frame> {
        self.touch();
        let mut rx = self.rx.lock().await;
        let mut frames = Vec::new();

        match tokio::time::timeout(hold, rx.recv()).await {
            Ok(Ok(frame)) => frames.push(frame),
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                warn!(sid = %sid, skipped, "Polling client lagged, frames dropped");
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => {
                frames.push(Frame::disconnect("server closing"));
            }
            Err(_) => {}
        }

        while frames.len() < MAX_BATCH {
            match rx.try_recv() {
                Ok(frame) => frames.push(frame),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(sid = %sid, skipped, "Polling client lagged, frames dropped");
                }
                Err(_) => break,
            }
        }

        self.touch();
        frames
    }
}

#[derive(Default)]
pub struct PollSessions {
    sessions: DashMap<String, Arc<PollSession>>,
}

impl PollSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session subscribed to `hub` and return its sid.
    pub fn open(&self, hub: &RealtimeHub) -> String {
        let sid = crate::new_sid();
        self.sessions
            .insert(sid.clone(), Arc::new(PollSession::new(hub.subscribe())));
        info!(sid = %sid, "Polling session opened");
        sid
    }

    pub fn get(&self, sid: &str) -> Option<Arc<PollSession>> {
        self.sessions.get(sid).map(|entry| entry.value().clone())
    }

    pub fn close(&self, sid: &str) -> bool {
        let removed = self.sessions.remove(sid).is_some();
        if removed {
            info!(sid = %sid, "Polling session closed");
        }
        removed
    }

    /// Drop sessions idle longer than `ttl`. Returns how many were removed.
    pub fn sweep(&self, ttl: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|sid, session| {
            let keep = session.idle_for() <= ttl;
            if !keep {
                debug!(sid = %sid, "Polling session expired");
            }
            keep
        });
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[derive(Debug, Deserialize)]
pub struct PollParams {
    pub sid: Option<String>,
}

/// `GET /realtime/poll` opens a session; `GET /realtime/poll?sid=..` waits
/// for frames.
pub async fn poll_handler(
    State(state): State<AppState>,
    Query(params): Query<PollParams>,
) -> ApiResult<Json<PollBatch>> {
    match params.sid {
        None => {
            state.sessions.sweep(state.config.poll_session_ttl);
            let sid = state.sessions.open(&state.hub);
            let frames = vec![Frame::connect(&sid)];
            Ok(Json(PollBatch { sid, frames }))
        }
        Some(sid) => {
            let session = state
                .sessions
                .get(&sid)
                .ok_or_else(|| ApiError::session_not_found(&sid))?;
            let frames = session.next_batch(&sid, state.config.poll_timeout).await;
            Ok(Json(PollBatch { sid, frames }))
        }
    }
}

/// `DELETE /realtime/poll?sid=..` ends a session.
pub async fn close_handler(
    State(state): State<AppState>,
    Query(params): Query<PollParams>,
) -> ApiResult<StatusCode> {
    let sid = params
        .sid
        .ok_or_else(|| ApiError::invalid_input("sid query parameter is required"))?;
    if state.sessions.close(&sid) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::session_not_found(&sid))
    }
}
