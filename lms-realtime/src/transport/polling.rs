//! HTTP long-polling fallback transport.
//!
//! `GET <poll_url>` opens a session and returns the `connect` frame;
//! `GET <poll_url>?sid=<sid>` blocks server-side until frames arrive or the
//! hold time elapses; `DELETE <poll_url>?sid=<sid>` ends the session.

use async_trait::async_trait;
use lms_core::{Frame, PollBatch, TransportKind, WireEvent};
use reqwest::{StatusCode, Url};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use super::{Connection, Endpoint, Transport};
use crate::error::TransportError;

#[derive(Debug, Clone)]
pub struct PollingTransport {
    client: reqwest::Client,
}

impl PollingTransport {
    pub fn new(connect_timeout: Duration, poll_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(poll_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for PollingTransport {
    fn label(&self) -> &'static str {
        TransportKind::Polling.as_str()
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError> {
        let url = endpoint.polling_url()?;
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::Handshake(format!(
                "poll handshake returned {}",
                response.status()
            )));
        }
        let batch: PollBatch = response.json().await?;

        let mut frames: VecDeque<Frame> = batch.frames.into();
        let first = frames
            .pop_front()
            .ok_or_else(|| TransportError::Handshake("empty handshake batch".to_string()))?;
        match WireEvent::decode(&first)? {
            Some(WireEvent::Connect { sid }) if sid == batch.sid => {}
            _ => {
                return Err(TransportError::Handshake(format!(
                    "expected connect frame for session {}",
                    batch.sid
                )))
            }
        }

        debug!(sid = %batch.sid, url = %url, "Polling session opened");
        Ok(Box::new(PollingConnection {
            client: self.client.clone(),
            url,
            sid: batch.sid,
            buffer: frames,
            closed: false,
        }))
    }
}

pub struct PollingConnection {
    client: reqwest::Client,
    url: Url,
    sid: String,
    buffer: VecDeque<Frame>,
    closed: bool,
}

impl PollingConnection {
    async fn poll_once(&mut self) -> Result<(), TransportError> {
        let response = self
            .client
            .get(self.url.clone())
            .query(&[("sid", self.sid.as_str())])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(TransportError::SessionExpired(self.sid.clone()));
        }
        let batch: PollBatch = response.error_for_status()?.json().await?;
        if batch.sid != self.sid {
            return Err(TransportError::Handshake(format!(
                "session mismatch: expected {}, got {}",
                self.sid, batch.sid
            )));
        }
        self.buffer.extend(batch.frames);
        Ok(())
    }
}

#[async_trait]
impl Connection for PollingConnection {
    fn id(&self) -> &str {
        &self.sid
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Polling
    }

    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            if let Some(frame) = self.buffer.pop_front() {
                return Some(Ok(frame));
            }
            if self.closed {
                return None;
            }
            if let Err(err) = self.poll_once().await {
                self.closed = true;
                return Some(Err(err));
            }
        }
    }

    async fn close(&mut self) {
        if std::mem::replace(&mut self.closed, true) {
            return;
        }
        self.buffer.clear();
        let result = self
            .client
            .delete(self.url.clone())
            .query(&[("sid", self.sid.as_str())])
            .send()
            .await;
        if let Err(err) = result {
            debug!(sid = %self.sid, error = %err, "Failed to end polling session");
        }
    }
}
