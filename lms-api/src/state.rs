//! Shared application state injected into handlers.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::ApiConfig;
use crate::hub::RealtimeHub;
use crate::poll::PollSessions;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<RealtimeHub>,
    pub sessions: Arc<PollSessions>,
    pub config: Arc<ApiConfig>,
    /// Cancelled when the server begins shutting down.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            hub: Arc::new(RealtimeHub::new(config.hub_capacity)),
            sessions: Arc::new(PollSessions::new()),
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }
}
