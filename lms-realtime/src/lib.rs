//! LMS realtime channel.
//!
//! Keeps a resilient subscription to the LMS event source and exposes the
//! connection liveness, the most recent `cache:cleared` event, and a
//! permission-gated alert sink.

pub mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod notifications;
pub mod reconnect;
pub mod transport;

pub use channel::{EventChannel, EventChannelBuilder};
pub use config::{NotificationConfig, RealtimeConfig, ReconnectConfig, DEFAULT_ENDPOINT};
pub use dispatch::{ChannelEvent, ChannelState, Phase};
pub use error::{RealtimeError, TransportError};
pub use notifications::{
    LogNotifier, NotificationCenter, NotificationPermission, Notifier, NotifyError,
    SilentNotifier,
};
pub use reconnect::ReconnectPolicy;
pub use transport::{Connection, Endpoint, NegotiatingTransport, Transport};
