//! LMS Core - Realtime Wire Types
//!
//! Pure data structures shared by the event source (`lms-api`) and the
//! notification channel (`lms-realtime`). This crate performs no I/O.

pub mod error;
pub mod event;
pub mod frame;
pub mod handle;

pub use error::{CoreError, CoreResult};
pub use event::{CacheEvent, CacheKind, Timestamp};
pub use frame::{Frame, PollBatch, WireEvent, EVENT_CACHE_CLEARED, EVENT_CONNECT, EVENT_DISCONNECT};
pub use handle::{ConnectionHandle, TransportKind};
