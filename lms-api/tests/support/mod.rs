use std::net::SocketAddr;
use std::time::Duration;

use lms_api::{serve, ApiConfig, AppState};
use tokio::sync::oneshot;

/// Config with a short long-poll hold so tests do not wait 25 seconds.
pub fn test_config() -> ApiConfig {
    ApiConfig {
        bind_host: "127.0.0.1".to_string(),
        port: 0,
        poll_timeout: Duration::from_millis(300),
        poll_session_ttl: Duration::from_secs(10),
        ..ApiConfig::default()
    }
}

/// Serve the router on an ephemeral port and return its address.
pub async fn spawn_server(config: ApiConfig) -> (SocketAddr, AppState) {
    spawn_until(config, std::future::pending()).await
}

/// Like [`spawn_server`], but the server shuts down when the returned
/// sender fires.
pub async fn spawn_stoppable_server(
    config: ApiConfig,
) -> (SocketAddr, AppState, oneshot::Sender<()>) {
    let (stop, stopped) = oneshot::channel::<()>();
    let (addr, state) = spawn_until(config, async {
        let _ = stopped.await;
    })
    .await;
    (addr, state, stop)
}

async fn spawn_until<F>(config: ApiConfig, shutdown: F) -> (SocketAddr, AppState)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let state = AppState::new(config);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let served = state.clone();
    tokio::spawn(async move {
        let _ = serve(listener, served, shutdown).await;
    });
    (addr, state)
}
