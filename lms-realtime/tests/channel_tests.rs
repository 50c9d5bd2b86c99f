//! Channel lifecycle tests against an in-memory transport.
//!
//! Time is paused so reconnect delays elapse instantly.

mod support;

use lms_core::{Frame, TransportKind};
use lms_realtime::{
    EventChannel, NegotiatingTransport, NotificationCenter, NotificationPermission, Phase,
    RealtimeConfig, Transport, TransportError,
};
use lms_test_utils::fixtures::{cache_cleared_frame, numbered_events, scenario_event, scenario_payload};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use support::{settle, wait_until, ScriptedTransport};

fn channel_with(transport: Arc<ScriptedTransport>) -> EventChannel {
    EventChannel::builder(RealtimeConfig::default())
        .transport(transport)
        .activate()
        .expect("activate channel")
}

#[tokio::test(start_paused = true)]
async fn scenario_connect_event_disconnect() {
    let transport = ScriptedTransport::new();
    let feed = transport.accept("sid-1");
    let channel = channel_with(transport.clone());

    assert_eq!(channel.endpoint().as_str(), "http://localhost:5000");

    let state = wait_until(&channel, |s| s.is_connected()).await;
    assert_eq!(state.phase, Phase::Connected);
    let handle = state.handle.expect("handle after connect");
    assert_eq!(handle.id, "sid-1");
    assert_eq!(handle.endpoint, "http://localhost:5000");
    assert!(channel.last_event().is_none());

    feed.send(Frame::new("cache:cleared", scenario_payload()));
    let state = wait_until(&channel, |s| s.last_event.is_some()).await;
    let event = state.last_event.expect("event stored");
    assert_eq!(event, scenario_event());
    assert_eq!(serde_json::to_value(&event).unwrap(), scenario_payload());

    drop(feed);
    wait_until(&channel, |s| !s.is_connected()).await;
    assert!(!channel.is_connected());
    // The last event outlives the connection.
    assert_eq!(channel.last_event(), Some(scenario_event()));
}

#[tokio::test(start_paused = true)]
async fn latest_event_overwrites_previous() {
    let transport = ScriptedTransport::new();
    let feed = transport.accept("sid-1");
    let channel = channel_with(transport.clone());
    wait_until(&channel, |s| s.is_connected()).await;

    let events = numbered_events(5);
    for event in &events {
        feed.send(cache_cleared_frame(event));
    }

    let last = events.last().cloned();
    let state = wait_until(&channel, |s| s.last_event == last).await;
    assert_eq!(state.last_event.unwrap().admin, "admin5");
    assert!(channel.is_connected());
}

#[tokio::test(start_paused = true)]
async fn stops_after_retry_ceiling() {
    let transport = ScriptedTransport::new();
    let channel = channel_with(transport.clone());

    let state = wait_until(&channel, |s| s.phase == Phase::Exhausted).await;
    // One initial attempt plus five retries.
    assert_eq!(transport.connects(), 6);
    assert!(state.last_error.is_some());
    assert!(!channel.is_connected());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.connects(), 6);
    assert_eq!(channel.phase(), Phase::Exhausted);
}

#[tokio::test(start_paused = true)]
async fn successful_connect_resets_retry_budget() {
    let transport = ScriptedTransport::new();
    transport.refuse("down");
    transport.refuse("down");
    // Accepted then immediately closed.
    drop(transport.accept("sid-short"));
    let channel = channel_with(transport.clone());

    wait_until(&channel, |s| s.phase == Phase::Exhausted).await;
    // Two refusals, one short-lived session, then a fresh budget of 1 + 5.
    assert_eq!(transport.connects(), 8);
}

#[tokio::test(start_paused = true)]
async fn retry_delay_is_fixed_by_default() {
    let transport = ScriptedTransport::new();
    let channel = channel_with(transport.clone());
    wait_until(&channel, |s| s.phase == Phase::Retrying { attempt: 1 }).await;
    assert_eq!(transport.connects(), 1);

    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(transport.connects(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn server_disconnect_frame_triggers_reconnect() {
    let transport = ScriptedTransport::new();
    let first = transport.accept("sid-1");
    let _second = transport.accept("sid-2");
    let channel = channel_with(transport.clone());
    wait_until(&channel, |s| s.is_connected()).await;

    first.send(Frame::disconnect("server restart"));
    let state = wait_until(&channel, |s| !s.is_connected()).await;
    assert_eq!(state.last_error.as_deref(), Some("server restart"));

    let state = wait_until(&channel, |s| {
        s.handle.as_ref().map(|h| h.id.as_str()) == Some("sid-2") && s.is_connected()
    })
    .await;
    assert!(state.last_error.is_none());
    assert_eq!(transport.connects(), 2);
    assert_eq!(transport.teardowns(), 1);
}

#[tokio::test(start_paused = true)]
async fn transport_error_marks_disconnected() {
    let transport = ScriptedTransport::new();
    let feed = transport.accept("sid-1");
    let channel = channel_with(transport.clone());
    wait_until(&channel, |s| s.is_connected()).await;

    feed.fail("connection reset");
    let state = wait_until(&channel, |s| !s.is_connected()).await;
    assert!(state.last_error.unwrap().contains("connection reset"));
}

#[tokio::test(start_paused = true)]
async fn malformed_payload_counts_as_disconnect() {
    let transport = ScriptedTransport::new();
    let feed = transport.accept("sid-1");
    let channel = channel_with(transport.clone());
    wait_until(&channel, |s| s.is_connected()).await;

    feed.send(Frame::new("cache:cleared", json!({"type": 5, "admin": "admin1"})));
    let state = wait_until(&channel, |s| !s.is_connected()).await;
    assert!(state.last_event.is_none());
    assert!(state.last_error.is_some());
    assert!(matches!(
        state.phase,
        Phase::Retrying { .. } | Phase::Connecting
    ));
}

#[tokio::test(start_paused = true)]
async fn unsubscribed_events_are_ignored() {
    let transport = ScriptedTransport::new();
    let feed = transport.accept("sid-1");
    let channel = channel_with(transport.clone());
    wait_until(&channel, |s| s.is_connected()).await;

    feed.send(Frame::new("user:updated", json!({"id": 7})));
    feed.send(Frame::connect("sid-1"));
    feed.send(cache_cleared_frame(&scenario_event()));

    let state = wait_until(&channel, |s| s.last_event.is_some()).await;
    assert!(state.is_connected());
    assert_eq!(state.last_event, Some(scenario_event()));
    assert_eq!(transport.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn deactivate_is_idempotent() {
    let transport = ScriptedTransport::new();
    let _feed = transport.accept("sid-1");
    let channel = channel_with(transport.clone());
    wait_until(&channel, |s| s.is_connected()).await;

    assert!(channel.deactivate());
    assert!(!channel.deactivate());
    settle().await;

    assert_eq!(transport.teardowns(), 1);
    assert_eq!(channel.phase(), Phase::Inactive);
    assert!(channel.handle().is_none());
    assert!(!channel.is_connected());
}

#[tokio::test(start_paused = true)]
async fn deactivate_during_backoff_cancels_retry() {
    let transport = ScriptedTransport::new();
    let channel = channel_with(transport.clone());
    wait_until(&channel, |s| matches!(s.phase, Phase::Retrying { .. })).await;

    assert!(channel.deactivate());
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(transport.connects(), 1);
    assert_eq!(channel.phase(), Phase::Inactive);
}

#[tokio::test(start_paused = true)]
async fn deactivate_during_backoff_closes_nothing_twice() {
    let transport = ScriptedTransport::new();
    drop(transport.accept("sid-1"));
    let channel = channel_with(transport.clone());
    wait_until(&channel, |s| matches!(s.phase, Phase::Retrying { .. })).await;
    assert_eq!(transport.teardowns(), 1);

    assert!(channel.deactivate());
    settle().await;
    assert_eq!(transport.teardowns(), 1);
}

#[tokio::test(start_paused = true)]
async fn deactivate_closes_live_connection_before_driver_exits() {
    let transport = ScriptedTransport::new();
    let _feed = transport.accept("sid-1");
    let channel = channel_with(transport.clone());
    wait_until(&channel, |s| s.is_connected()).await;
    assert_eq!(transport.teardowns(), 0);

    channel.deactivate();
    // Well inside the close grace period.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.teardowns(), 1);
    assert_eq!(transport.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_waits_for_close() {
    let transport = ScriptedTransport::new();
    let _feed = transport.accept("sid-1");
    let channel = channel_with(transport.clone());
    wait_until(&channel, |s| s.is_connected()).await;

    assert!(channel.shutdown().await);
    assert_eq!(transport.teardowns(), 1);
    assert_eq!(channel.phase(), Phase::Inactive);
    assert!(!channel.shutdown().await);
}

#[tokio::test(start_paused = true)]
async fn deactivate_during_pending_connect() {
    let transport = ScriptedTransport::new();
    transport.hang();
    let channel = channel_with(transport.clone());
    settle().await;
    assert_eq!(transport.connects(), 1);
    assert_eq!(channel.phase(), Phase::Connecting);

    assert!(channel.deactivate());
    settle().await;
    assert_eq!(channel.phase(), Phase::Inactive);
    assert!(channel.handle().is_none());
}

#[tokio::test(start_paused = true)]
async fn events_after_deactivate_are_dropped() {
    let transport = ScriptedTransport::new();
    let feed = transport.accept("sid-1");
    let channel = channel_with(transport.clone());
    wait_until(&channel, |s| s.is_connected()).await;

    channel.deactivate();
    feed.send(cache_cleared_frame(&scenario_event()));
    settle().await;

    assert!(channel.last_event().is_none());
    assert_eq!(channel.phase(), Phase::Inactive);
}

#[tokio::test(start_paused = true)]
async fn drop_deactivates() {
    let transport = ScriptedTransport::new();
    let _feed = transport.accept("sid-1");
    let channel = channel_with(transport.clone());
    let rx = channel.subscribe();
    wait_until(&channel, |s| s.is_connected()).await;

    drop(channel);
    settle().await;

    assert_eq!(transport.teardowns(), 1);
    assert_eq!(rx.borrow().phase, Phase::Inactive);
}

#[tokio::test(start_paused = true)]
async fn reactivate_after_exhaustion() {
    let transport = ScriptedTransport::new();
    let channel = channel_with(transport.clone());
    wait_until(&channel, |s| s.phase == Phase::Exhausted).await;

    let _feed = transport.accept("sid-again");
    assert!(channel.reactivate());
    let state = wait_until(&channel, |s| s.is_connected()).await;
    assert_eq!(state.handle.unwrap().id, "sid-again");
    assert!(state.last_error.is_none());

    // Already active.
    assert!(!channel.reactivate());
}

#[tokio::test(start_paused = true)]
async fn reactivate_after_deactivate() {
    let transport = ScriptedTransport::new();
    let _first = transport.accept("sid-1");
    let channel = channel_with(transport.clone());
    wait_until(&channel, |s| s.is_connected()).await;

    channel.deactivate();
    let _second = transport.accept("sid-2");
    assert!(channel.reactivate());
    let state = wait_until(&channel, |s| s.is_connected()).await;
    assert_eq!(state.handle.unwrap().id, "sid-2");
}

#[tokio::test(start_paused = true)]
async fn denied_permission_still_updates_state() {
    let transport = ScriptedTransport::new();
    let feed = transport.accept("sid-1");
    let center = Arc::new(NotificationCenter::new(NotificationPermission::Denied, 8));
    let channel = EventChannel::builder(RealtimeConfig::default())
        .transport(transport.clone())
        .notifier(center.clone())
        .activate()
        .unwrap();
    wait_until(&channel, |s| s.is_connected()).await;

    feed.send(cache_cleared_frame(&scenario_event()));
    wait_until(&channel, |s| s.last_event.is_some()).await;

    assert!(center.is_empty());
    assert!(!channel.alert("Manual", "ping"));
}

#[tokio::test(start_paused = true)]
async fn granted_permission_records_notification() {
    let transport = ScriptedTransport::new();
    let feed = transport.accept("sid-1");
    let center = Arc::new(NotificationCenter::granted(8));
    let channel = EventChannel::builder(RealtimeConfig::default())
        .transport(transport.clone())
        .notifier(center.clone())
        .activate()
        .unwrap();
    wait_until(&channel, |s| s.is_connected()).await;

    feed.send(cache_cleared_frame(&scenario_event()));
    wait_until(&channel, |s| s.last_event.is_some()).await;

    let recent = center.recent();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].title, "Cache Cleared");
    assert_eq!(recent[0].message, "courses cache has been cleared");

    assert!(channel.alert("Manual", "ping"));
    assert_eq!(center.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn disabled_notifications_skip_sink() {
    let transport = ScriptedTransport::new();
    let feed = transport.accept("sid-1");
    let center = Arc::new(NotificationCenter::granted(8));
    let mut config = RealtimeConfig::default();
    config.notifications.enabled = false;
    let channel = EventChannel::builder(config)
        .transport(transport.clone())
        .notifier(center.clone())
        .activate()
        .unwrap();
    wait_until(&channel, |s| s.is_connected()).await;

    feed.send(cache_cleared_frame(&scenario_event()));
    wait_until(&channel, |s| s.last_event.is_some()).await;
    assert!(center.is_empty());
}

#[tokio::test(start_paused = true)]
async fn negotiation_falls_back_in_order() {
    let websocket = ScriptedTransport::new();
    let polling = ScriptedTransport::new();
    let _feed = polling.accept_as("poll-1", TransportKind::Polling);
    let transports: Vec<Arc<dyn Transport>> = vec![websocket.clone(), polling.clone()];
    let negotiator = NegotiatingTransport::new(transports);

    let channel = EventChannel::builder(RealtimeConfig::default())
        .transport(Arc::new(negotiator))
        .activate()
        .unwrap();
    let state = wait_until(&channel, |s| s.is_connected()).await;

    let handle = state.handle.unwrap();
    assert_eq!(handle.transport, TransportKind::Polling);
    assert_eq!(handle.id, "poll-1");
    assert_eq!(websocket.connects(), 1);
    assert_eq!(polling.connects(), 1);
}

#[tokio::test]
async fn negotiation_reports_last_failure() {
    let endpoint = RealtimeConfig::default().resolve_endpoint().unwrap();

    let first = ScriptedTransport::new();
    first.refuse("websocket blocked");
    let second = ScriptedTransport::new();
    second.refuse("polling blocked");
    let transports: Vec<Arc<dyn Transport>> = vec![first, second];
    let negotiator = NegotiatingTransport::new(transports);
    match negotiator.connect(&endpoint).await {
        Err(TransportError::Connect(reason)) => assert_eq!(reason, "polling blocked"),
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("negotiation should fail"),
    }

    let empty = NegotiatingTransport::new(Vec::new());
    assert!(matches!(
        empty.connect(&endpoint).await,
        Err(TransportError::NoTransport)
    ));
}

#[test]
fn invalid_endpoint_fails_activation() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let _guard = runtime.enter();

    let config = RealtimeConfig {
        endpoint: Some("ftp://lms.example.com".to_string()),
        ..RealtimeConfig::default()
    };
    let result = EventChannel::builder(config)
        .transport(ScriptedTransport::new())
        .activate();
    assert!(result.is_err());
}
