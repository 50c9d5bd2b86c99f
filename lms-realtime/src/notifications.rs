//! Notification sinks for cache-invalidation alerts.
//!
//! Delivery is permission-gated and best effort: a denied or failing sink
//! never affects channel state.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

/// Mirrors the host's notification permission states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPermission {
    Granted,
    Denied,
    /// Never asked; treated as not granted.
    Default,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notifications unavailable: {0}")]
    Unavailable(String),
    #[error("Notification backend failed: {0}")]
    Backend(String),
}

pub trait Notifier: Send + Sync {
    fn permission(&self) -> Result<NotificationPermission, NotifyError>;

    /// Emit a notification. Implementations must not block the caller.
    fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Deliver through the permission gate. Returns whether a notification was
/// emitted; denial and errors are logged and swallowed.
pub fn deliver(notifier: &dyn Notifier, notification: Notification) -> bool {
    match notifier.permission() {
        Ok(NotificationPermission::Granted) => match notifier.notify(notification) {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "Notification delivery failed");
                false
            }
        },
        Ok(permission) => {
            debug!(?permission, "Notification permission not granted");
            false
        }
        Err(err) => {
            debug!(error = %err, "Notification permission check failed");
            false
        }
    }
}

// ============================================================================
// IN-APP FEED
// ============================================================================

/// Bounded in-process feed of notifications, newest last.
#[derive(Debug)]
pub struct NotificationCenter {
    permission: NotificationPermission,
    capacity: usize,
    entries: Mutex<VecDeque<Notification>>,
}

impl NotificationCenter {
    pub fn new(permission: NotificationPermission, capacity: usize) -> Self {
        Self {
            permission,
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn granted(capacity: usize) -> Self {
        Self::new(NotificationPermission::Granted, capacity)
    }

    pub fn recent(&self) -> Vec<Notification> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Notification>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Notifier for NotificationCenter {
    fn permission(&self) -> Result<NotificationPermission, NotifyError> {
        Ok(self.permission)
    }

    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(notification);
        Ok(())
    }
}

/// Writes each notification to the log at `info`. The headless default for
/// `lms-watch`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn permission(&self) -> Result<NotificationPermission, NotifyError> {
        Ok(NotificationPermission::Granted)
    }

    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(
            title = %notification.title,
            message = %notification.message,
            "Notification"
        );
        Ok(())
    }
}

/// Sink for hosts without any notification facility.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn permission(&self) -> Result<NotificationPermission, NotifyError> {
        Err(NotifyError::Unavailable("no notification backend".to_string()))
    }

    fn notify(&self, _notification: Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}

// ============================================================================
// DESKTOP
// ============================================================================

#[cfg(feature = "desktop")]
pub use desktop::DesktopNotifier;

#[cfg(feature = "desktop")]
mod desktop {
    use super::{Notification, NotificationPermission, Notifier, NotifyError};
    use tracing::{debug, info};

    /// Native desktop notifications. The platform call runs on the blocking
    /// pool so the channel driver never waits on it.
    #[derive(Debug, Clone)]
    pub struct DesktopNotifier {
        app_name: String,
    }

    impl DesktopNotifier {
        pub fn new(app_name: impl Into<String>) -> Self {
            Self {
                app_name: app_name.into(),
            }
        }
    }

    impl Notifier for DesktopNotifier {
        fn permission(&self) -> Result<NotificationPermission, NotifyError> {
            Ok(NotificationPermission::Granted)
        }

        fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
            let handle = tokio::runtime::Handle::try_current()
                .map_err(|e| NotifyError::Unavailable(e.to_string()))?;
            let app_name = self.app_name.clone();
            handle.spawn_blocking(move || {
                let result = notify_rust::Notification::new()
                    .appname(&app_name)
                    .summary(&notification.title)
                    .body(&notification.message)
                    .show();
                if let Err(err) = result {
                    debug!(error = %err, "Desktop notification failed");
                }
            });
            Ok(())
        }
    }
}
