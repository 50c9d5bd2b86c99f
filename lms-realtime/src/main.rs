//! `lms-watch`: follow cache invalidations from the command line.

use lms_realtime::notifications::Notifier;
use lms_realtime::{ChannelState, EventChannel, Phase, RealtimeConfig, RealtimeError};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), RealtimeError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RealtimeConfig::load()?;
    let channel = EventChannel::activate(config, notifier())?;
    let mut updates = channel.subscribe();

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                report(&state);
                if state.phase == Phase::Exhausted {
                    warn!("Giving up; restart lms-watch to reconnect");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    channel.shutdown().await;
    Ok(())
}

#[cfg(feature = "desktop")]
fn notifier() -> Arc<dyn Notifier> {
    Arc::new(lms_realtime::notifications::DesktopNotifier::new("lms-watch"))
}

#[cfg(not(feature = "desktop"))]
fn notifier() -> Arc<dyn Notifier> {
    Arc::new(lms_realtime::LogNotifier)
}

fn report(state: &ChannelState) {
    let sid = state.handle.as_ref().map(|h| h.id.as_str()).unwrap_or("-");
    match &state.last_event {
        Some(event) => info!(
            phase = %state.phase,
            connected = state.is_connected(),
            sid,
            last_kind = %event.kind,
            last_admin = %event.admin,
            last_at = %event.timestamp,
            "Channel state"
        ),
        None => info!(
            phase = %state.phase,
            connected = state.is_connected(),
            sid,
            "Channel state"
        ),
    }
}
