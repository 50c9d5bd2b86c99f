//! Full-duplex WebSocket transport.

use async_trait::async_trait;
use futures_util::StreamExt;
use lms_core::{Frame, TransportKind, WireEvent};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::{Connection, Endpoint, Transport};
use crate::error::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn open(&self, endpoint: &Endpoint) -> Result<WebSocketConnection, TransportError> {
        let url = endpoint.websocket_url()?;
        let (mut stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let sid = read_handshake(&mut stream).await?;
        debug!(sid = %sid, url = %url, "WebSocket handshake complete");
        Ok(WebSocketConnection {
            sid,
            stream,
            closed: false,
        })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn label(&self) -> &'static str {
        TransportKind::Websocket.as_str()
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError> {
        let connection = tokio::time::timeout(self.connect_timeout, self.open(endpoint))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout.as_millis() as u64))??;
        Ok(Box::new(connection))
    }
}

/// The server's first frame must be `connect` carrying the connection id.
async fn read_handshake(stream: &mut WsStream) -> Result<String, TransportError> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                let frame = Frame::parse(&text)?;
                return match WireEvent::decode(&frame)? {
                    Some(WireEvent::Connect { sid }) => Ok(sid),
                    _ => Err(TransportError::Handshake(format!(
                        "expected connect frame, got '{}'",
                        frame.event
                    ))),
                };
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => {
                return Err(TransportError::Handshake(
                    "connection closed during handshake".to_string(),
                ))
            }
            Some(Ok(_)) => {
                return Err(TransportError::Handshake(
                    "unexpected non-text handshake message".to_string(),
                ))
            }
            Some(Err(err)) => return Err(err.into()),
        }
    }
}

pub struct WebSocketConnection {
    sid: String,
    stream: WsStream,
    closed: bool,
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn id(&self) -> &str {
        &self.sid
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Websocket
    }

    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        if self.closed {
            return None;
        }
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some(Frame::parse(&text).map_err(TransportError::from));
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!(len = data.len(), "Ignoring binary message");
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.closed = true;
                    return None;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    self.closed = true;
                    return Some(Err(err.into()));
                }
            }
        }
    }

    async fn close(&mut self) {
        if std::mem::replace(&mut self.closed, true) {
            return;
        }
        if let Err(err) = self.stream.close(None).await {
            debug!(sid = %self.sid, error = %err, "WebSocket close failed");
        }
    }
}
