//! The event notification channel.
//!
//! One driver task per activation owns the transport connection. All state
//! writes go through a single `watch` sender; `Phase::Inactive` is checked
//! inside the write, so once [`EventChannel::deactivate`] has run no later
//! write can land, even from a driver that is mid-reconnect.
//!
//! Deactivation cancels the driver's token. The driver then closes its
//! connection (ending a long-poll session server-side) and exits; a driver
//! that has not finished within [`CLOSE_GRACE`] is aborted.

use chrono::Utc;
use lms_core::{ConnectionHandle, WireEvent};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{NotificationConfig, RealtimeConfig};
use crate::dispatch::{ChannelEvent, ChannelState, Phase};
use crate::error::RealtimeError;
use crate::notifications::{deliver, Notification, Notifier, SilentNotifier};
use crate::reconnect::ReconnectPolicy;
use crate::transport::{Connection, Endpoint, NegotiatingTransport, Transport};

/// How long a cancelled driver may spend closing its connection.
pub const CLOSE_GRACE: Duration = Duration::from_secs(5);

pub struct EventChannelBuilder {
    config: RealtimeConfig,
    transport: Option<Arc<dyn Transport>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl EventChannelBuilder {
    /// Replace the negotiated WebSocket/polling transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Validate configuration, resolve the endpoint and start connecting.
    /// Must be called inside a Tokio runtime.
    pub fn activate(self) -> Result<EventChannel, RealtimeError> {
        self.config.validate()?;
        let endpoint = self.config.resolve_endpoint()?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(NegotiatingTransport::from_config(&self.config)?),
        };
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(SilentNotifier));
        let (state, _) = watch::channel(ChannelState::new(Phase::Connecting));

        let shared = Arc::new(Shared {
            endpoint,
            transport,
            notifier,
            policy: ReconnectPolicy::from_config(&self.config.reconnect),
            notifications: self.config.notifications,
            state,
        });

        info!(endpoint = %shared.endpoint.as_str(), "Activating event channel");
        let driver = Driver::spawn(shared.clone());
        Ok(EventChannel {
            shared,
            driver: Mutex::new(Some(driver)),
        })
    }
}

/// Subscription to server-pushed cache invalidation events.
///
/// Dropping the channel deactivates it.
pub struct EventChannel {
    shared: Arc<Shared>,
    driver: Mutex<Option<Driver>>,
}

impl EventChannel {
    pub fn builder(config: RealtimeConfig) -> EventChannelBuilder {
        EventChannelBuilder {
            config,
            transport: None,
            notifier: None,
        }
    }

    /// Activate with the default negotiated transport.
    pub fn activate(
        config: RealtimeConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, RealtimeError> {
        Self::builder(config).notifier(notifier).activate()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.borrow().is_connected()
    }

    pub fn last_event(&self) -> Option<lms_core::CacheEvent> {
        self.shared.state.borrow().last_event.clone()
    }

    pub fn handle(&self) -> Option<ConnectionHandle> {
        self.shared.state.borrow().handle.clone()
    }

    pub fn phase(&self) -> Phase {
        self.shared.state.borrow().phase
    }

    pub fn snapshot(&self) -> ChannelState {
        self.shared.state.borrow().clone()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    /// Raise a local alert through the same permission gate cache events use.
    pub fn alert(&self, title: impl Into<String>, message: impl Into<String>) -> bool {
        deliver(
            self.shared.notifier.as_ref(),
            Notification::new(title, message),
        )
    }

    /// Tear down the connection and stop the driver.
    ///
    /// State is inactive when this returns; the connection is closed by the
    /// driver shortly after. Idempotent: returns `false` when the channel
    /// was already inactive.
    pub fn deactivate(&self) -> bool {
        let torn_down = self.mark_inactive();
        if let Some(driver) = self.driver_slot().take() {
            driver.retire();
        }
        torn_down
    }

    /// Deactivate and wait until the connection has been closed.
    pub async fn shutdown(&self) -> bool {
        let torn_down = self.mark_inactive();
        let driver = self.driver_slot().take();
        if let Some(driver) = driver {
            driver.stop().await;
        }
        torn_down
    }

    /// Start a new driver after deactivation or once retries are exhausted.
    /// Returns `false` if the channel is still active.
    pub fn reactivate(&self) -> bool {
        let mut slot = self.driver_slot();
        let restarted = self.shared.state.send_if_modified(|state| {
            if !matches!(state.phase, Phase::Inactive | Phase::Exhausted) {
                return false;
            }
            state.phase = Phase::Connecting;
            state.last_error = None;
            true
        });
        if !restarted {
            return false;
        }
        if let Some(previous) = slot.take() {
            previous.retire();
        }
        info!(endpoint = %self.shared.endpoint.as_str(), "Reactivating event channel");
        *slot = Some(Driver::spawn(self.shared.clone()));
        true
    }

    fn mark_inactive(&self) -> bool {
        let torn_down = self.shared.state.send_if_modified(|state| {
            if state.phase == Phase::Inactive {
                return false;
            }
            state.phase = Phase::Inactive;
            state.handle = None;
            true
        });
        if torn_down {
            info!(endpoint = %self.shared.endpoint.as_str(), "Event channel deactivated");
        }
        torn_down
    }

    fn driver_slot(&self) -> std::sync::MutexGuard<'_, Option<Driver>> {
        self.driver.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        self.deactivate();
    }
}

/// One activation's driver task and the token that stops it.
struct Driver {
    task: JoinHandle<()>,
    cancel: CancellationToken,
}

impl Driver {
    fn spawn(shared: Arc<Shared>) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(drive(shared, cancel.clone()));
        Self { task, cancel }
    }

    /// Ask the driver to close its connection and exit, aborting it if it
    /// overruns [`CLOSE_GRACE`] or no runtime is available to wait on it.
    fn retire(self) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(self.stop());
            }
            Err(_) => {
                self.cancel.cancel();
                self.task.abort();
            }
        }
    }

    async fn stop(self) {
        self.cancel.cancel();
        let mut task = self.task;
        if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
            warn!("Event channel driver did not stop in time; aborting");
            task.abort();
        }
    }
}

struct Shared {
    endpoint: Endpoint,
    transport: Arc<dyn Transport>,
    notifier: Arc<dyn Notifier>,
    policy: ReconnectPolicy,
    notifications: NotificationConfig,
    state: watch::Sender<ChannelState>,
}

impl Shared {
    /// Apply `change` unless teardown has begun. Returns `false` once the
    /// channel is inactive; the driver must stop at that point.
    fn update(&self, change: impl FnOnce(&mut ChannelState)) -> bool {
        self.state.send_if_modified(|state| {
            if state.phase == Phase::Inactive {
                return false;
            }
            change(state);
            true
        })
    }

    fn dispatch(&self, event: ChannelEvent) -> bool {
        let alert = match &event {
            ChannelEvent::CacheCleared(cache_event) => Some(cache_event.summary()),
            _ => None,
        };
        if !self.update(|state| state.apply(event)) {
            return false;
        }
        if let Some(message) = alert {
            if self.notifications.enabled {
                deliver(
                    self.notifier.as_ref(),
                    Notification::new(self.notifications.title.clone(), message),
                );
            }
        }
        true
    }
}

enum PumpOutcome {
    TornDown,
    Lost(String),
}

async fn drive(shared: Arc<Shared>, cancel: CancellationToken) {
    // Consecutive reconnection attempts since the last successful connect.
    let mut attempt: u32 = 0;
    loop {
        if !shared.update(|state| state.phase = Phase::Connecting) {
            return;
        }

        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = shared.transport.connect(&shared.endpoint) => result,
        };
        match connected {
            Ok(mut connection) => {
                attempt = 0;
                let handle = ConnectionHandle::new(
                    connection.id(),
                    connection.kind(),
                    shared.endpoint.as_str(),
                    Utc::now(),
                );
                info!(sid = %handle.id, transport = %handle.transport, "Event channel connected");
                if !shared.dispatch(ChannelEvent::Connected(handle)) {
                    connection.close().await;
                    return;
                }

                let outcome = tokio::select! {
                    _ = cancel.cancelled() => PumpOutcome::TornDown,
                    outcome = pump(&shared, connection.as_mut()) => outcome,
                };
                connection.close().await;
                debug!(sid = %connection.id(), "Connection closed");
                match outcome {
                    PumpOutcome::TornDown => return,
                    PumpOutcome::Lost(reason) => {
                        warn!(reason = %reason, "Event channel disconnected");
                        if !shared.dispatch(ChannelEvent::Disconnected { reason }) {
                            return;
                        }
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, attempt, "Connection attempt failed");
                let message = err.to_string();
                if !shared.update(|state| state.last_error = Some(message)) {
                    return;
                }
            }
        }

        attempt += 1;
        if !shared.policy.allows(attempt) {
            warn!(
                max_attempts = shared.policy.max_attempts(),
                "Reconnection attempts exhausted"
            );
            shared.update(|state| state.phase = Phase::Exhausted);
            return;
        }
        if !shared.update(|state| state.phase = Phase::Retrying { attempt }) {
            return;
        }
        let delay = shared.policy.delay_for(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Feed frames from one connection into the dispatcher until it drops.
async fn pump(shared: &Shared, connection: &mut dyn Connection) -> PumpOutcome {
    loop {
        let frame = match connection.next_frame().await {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => return PumpOutcome::Lost(err.to_string()),
            None => return PumpOutcome::Lost("transport closed".to_string()),
        };

        match WireEvent::decode(&frame) {
            Ok(Some(WireEvent::CacheCleared(event))) => {
                debug!(kind = %event.kind, admin = %event.admin, "Cache cleared event");
                if !shared.dispatch(ChannelEvent::CacheCleared(event)) {
                    return PumpOutcome::TornDown;
                }
            }
            Ok(Some(WireEvent::Disconnect { reason })) => {
                return PumpOutcome::Lost(reason.unwrap_or_else(|| "server disconnect".to_string()));
            }
            Ok(Some(WireEvent::Connect { sid })) => {
                debug!(sid = %sid, "Ignoring repeated connect frame");
            }
            Ok(None) => {
                debug!(event = %frame.event, "Ignoring unsubscribed event");
            }
            Err(err) => return PumpOutcome::Lost(err.to_string()),
        }
    }
}
