//! LMS Realtime API Server Entry Point

use lms_api::telemetry::{init_tracing, LogFormat};
use lms_api::{serve, ApiConfig, ApiError, ApiResult, AppState};

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(LogFormat::from_env())?;

    let config = ApiConfig::from_env()?;
    let addr = config.bind_addr()?;
    let state = AppState::new(config);

    tracing::info!(%addr, "Starting LMS realtime API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received");
    })
    .await
    .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    Ok(())
}
