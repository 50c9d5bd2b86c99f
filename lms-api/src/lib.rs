//! LMS Realtime API
//!
//! The event source the LMS clients subscribe to. Admin actions that clear
//! a cache are announced as `cache:cleared` frames over WebSocket, with HTTP
//! long-polling for clients behind intermediaries that block upgrades.

pub mod config;
pub mod error;
pub mod hub;
pub mod poll;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use hub::RealtimeHub;
pub use routes::{create_router, ADMIN_HEADER};
pub use state::AppState;

/// Serve the realtime API on `listener` until `shutdown` resolves. Open
/// WebSocket connections are sent `disconnect` before the server stops.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: F,
) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let token = state.shutdown.clone();
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            shutdown.await;
            token.cancel();
        })
        .await
}

/// Fresh connection identifier (UUIDv7, time-sortable).
pub fn new_sid() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}
