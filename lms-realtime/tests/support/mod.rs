#![allow(dead_code)]

use async_trait::async_trait;
use lms_core::{Frame, TransportKind};
use lms_realtime::dispatch::ChannelState;
use lms_realtime::transport::{Connection, Endpoint, Transport};
use lms_realtime::{EventChannel, TransportError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

type FeedItem = Result<Frame, String>;

enum Script {
    Refuse(String),
    Accept {
        sid: String,
        kind: TransportKind,
        frames: mpsc::UnboundedReceiver<FeedItem>,
    },
    Hang,
}

#[derive(Default)]
struct Counters {
    connects: AtomicUsize,
    teardowns: AtomicUsize,
}

/// In-memory transport replaying queued connection outcomes. Once the
/// queue is empty every connect is refused.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    counters: Arc<Counters>,
}

/// Server side of an accepted scripted connection. Dropping it closes the
/// connection cleanly.
pub struct Feed {
    tx: mpsc::UnboundedSender<FeedItem>,
}

impl Feed {
    pub fn send(&self, frame: Frame) {
        let _ = self.tx.send(Ok(frame));
    }

    pub fn fail(&self, message: &str) {
        let _ = self.tx.send(Err(message.to_string()));
    }
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refuse(&self, reason: &str) {
        self.push(Script::Refuse(reason.to_string()));
    }

    pub fn hang(&self) {
        self.push(Script::Hang);
    }

    pub fn accept(&self, sid: &str) -> Feed {
        self.accept_as(sid, TransportKind::Websocket)
    }

    pub fn accept_as(&self, sid: &str, kind: TransportKind) -> Feed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(Script::Accept {
            sid: sid.to_string(),
            kind,
            frames: rx,
        });
        Feed { tx }
    }

    pub fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    /// Connections closed through [`Connection::close`]. Dropping a
    /// connection without closing it is not counted.
    pub fn teardowns(&self) -> usize {
        self.counters.teardowns.load(Ordering::SeqCst)
    }

    fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn label(&self) -> &'static str {
        "scripted"
    }

    async fn connect(&self, _endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Accept { sid, kind, frames }) => Ok(Box::new(ScriptedConnection {
                sid,
                kind,
                frames,
                torn_down: false,
                counters: self.counters.clone(),
            })),
            Some(Script::Hang) => std::future::pending().await,
            Some(Script::Refuse(reason)) => Err(TransportError::Connect(reason)),
            None => Err(TransportError::Connect("connection refused".to_string())),
        }
    }
}

pub struct ScriptedConnection {
    sid: String,
    kind: TransportKind,
    frames: mpsc::UnboundedReceiver<FeedItem>,
    torn_down: bool,
    counters: Arc<Counters>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn id(&self) -> &str {
        &self.sid
    }

    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        match self.frames.recv().await {
            Some(Ok(frame)) => Some(Ok(frame)),
            Some(Err(message)) => Some(Err(TransportError::Connect(message))),
            None => None,
        }
    }

    async fn close(&mut self) {
        if !std::mem::replace(&mut self.torn_down, true) {
            self.counters.teardowns.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Wait until the channel state satisfies `predicate`, failing after 30
/// (possibly virtual) seconds.
pub async fn wait_until(
    channel: &EventChannel,
    predicate: impl Fn(&ChannelState) -> bool,
) -> ChannelState {
    let mut rx = channel.subscribe();
    let state = tokio::time::timeout(Duration::from_secs(30), rx.wait_for(|s| predicate(s)))
        .await
        .expect("channel state not reached before timeout")
        .expect("channel state sender dropped");
    state.clone()
}

/// Let spawned tasks (including aborted ones) run to completion.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
