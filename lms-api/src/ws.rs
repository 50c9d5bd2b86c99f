//! WebSocket Event Streaming
//!
//! ## Protocol
//!
//! 1. Client upgrades `GET /realtime/ws`
//! 2. Server subscribes to the hub, then sends `connect` with a fresh sid
//! 3. Server forwards every hub frame as one text message
//! 4. On server shutdown, server sends `disconnect` and closes
//! 5. On client close, the connection is dropped

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use lms_core::Frame;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::hub::RealtimeHub;
use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let hub = state.hub.clone();
    let shutdown = state.shutdown.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub, shutdown))
}

/// Runs for the lifetime of one WebSocket connection.
async fn handle_socket(socket: WebSocket, hub: Arc<RealtimeHub>, shutdown: CancellationToken) {
    let sid = crate::new_sid();
    info!(sid = %sid, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the handshake so nothing published after `connect`
    // is missed.
    let mut rx = hub.subscribe();

    if let Err(e) = send_frame(&mut sender, &Frame::connect(&sid)).await {
        error!(sid = %sid, error = %e, "Failed to send connect frame");
        return;
    }

    let recv_sid = sid.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    debug!(sid = %recv_sid, "Client sent close frame");
                    break;
                }
                Ok(Message::Text(text)) => {
                    debug!(sid = %recv_sid, len = text.len(), "Ignoring client text message");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(sid = %recv_sid, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    let mut client_gone = false;
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(frame) => {
                        if let Err(e) = send_frame(&mut sender, &frame).await {
                            error!(sid = %sid, error = %e, "Failed to send frame, closing connection");
                            client_gone = true;
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(sid = %sid, skipped, "Client lagged, frames dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!(sid = %sid, "Hub closed");
                        break;
                    }
                }
            }

            _ = shutdown.cancelled() => {
                info!(sid = %sid, "Server shutting down");
                break;
            }

            _ = &mut recv_task => {
                debug!(sid = %sid, "Receiver task finished");
                client_gone = true;
                break;
            }
        }
    }

    if !client_gone {
        let _ = send_frame(&mut sender, &Frame::disconnect("server closing")).await;
        let _ = sender.close().await;
    }
    recv_task.abort();

    info!(sid = %sid, "WebSocket disconnected");
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &Frame,
) -> Result<(), axum::Error> {
    let json = frame.to_text().map_err(|e| {
        error!(error = %e, "Failed to serialize frame");
        axum::Error::new(e)
    })?;

    sender.send(Message::Text(json)).await
}
