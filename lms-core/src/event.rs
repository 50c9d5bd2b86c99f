//! Cache invalidation payloads.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::frame::EVENT_CACHE_CLEARED;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

// ============================================================================
// CACHE KIND
// ============================================================================

/// Which cache partition an invalidation applies to.
///
/// Known partitions get their own variant. Anything else the admin console
/// sends is kept verbatim in `Other` so a received payload always
/// re-serializes to the exact tag it arrived with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CacheKind {
    All,
    Cleared,
    Courses,
    Orders,
    Users,
    Other(String),
}

impl CacheKind {
    pub fn as_str(&self) -> &str {
        match self {
            CacheKind::All => "all",
            CacheKind::Cleared => "cleared",
            CacheKind::Courses => "courses",
            CacheKind::Orders => "orders",
            CacheKind::Users => "users",
            CacheKind::Other(tag) => tag,
        }
    }
}

impl From<String> for CacheKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "all" => CacheKind::All,
            "cleared" => CacheKind::Cleared,
            "courses" => CacheKind::Courses,
            "orders" => CacheKind::Orders,
            "users" => CacheKind::Users,
            _ => CacheKind::Other(tag),
        }
    }
}

impl From<&str> for CacheKind {
    fn from(tag: &str) -> Self {
        CacheKind::from(tag.to_string())
    }
}

impl From<CacheKind> for String {
    fn from(kind: CacheKind) -> Self {
        match kind {
            CacheKind::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CACHE EVENT
// ============================================================================

/// One cache invalidation occurrence, as pushed under `cache:cleared`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEvent {
    /// Partition that was cleared.
    #[serde(rename = "type")]
    pub kind: CacheKind,

    /// ISO-8601 instant of the invalidation, kept exactly as received.
    pub timestamp: String,

    /// Identifier of the admin who triggered it.
    pub admin: String,

    /// Affected resource tags. Absent and empty are distinct on the wire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,
}

impl CacheEvent {
    pub fn new(
        kind: impl Into<CacheKind>,
        admin: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            timestamp: timestamp.into(),
            admin: admin.into(),
            types: None,
        }
    }

    /// Event stamped with `at`, rendered with millisecond precision and a
    /// `Z` suffix.
    pub fn stamped(kind: impl Into<CacheKind>, admin: impl Into<String>, at: Timestamp) -> Self {
        Self::new(kind, admin, at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// The timestamp as a UTC instant. Values without an offset are read
    /// as UTC; a bare date means midnight.
    pub fn parsed_timestamp(&self) -> Option<Timestamp> {
        let raw = self.timestamp.trim();
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Some(at.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(naive.and_utc());
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }

    pub fn with_types(mut self, types: Vec<String>) -> Self {
        self.types = Some(types);
        self
    }

    /// Decode and validate a `cache:cleared` payload.
    pub fn from_value(value: serde_json::Value) -> CoreResult<Self> {
        let event: CacheEvent = serde_json::from_value(value)
            .map_err(|e| CoreError::invalid_payload(EVENT_CACHE_CLEARED, e.to_string()))?;
        event.validate()?;
        Ok(event)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.kind.as_str().trim().is_empty() {
            return Err(CoreError::invalid_payload(
                EVENT_CACHE_CLEARED,
                "type must not be empty",
            ));
        }
        if self.parsed_timestamp().is_none() {
            return Err(CoreError::invalid_payload(
                EVENT_CACHE_CLEARED,
                format!("timestamp '{}' is not an ISO-8601 instant", self.timestamp),
            ));
        }
        if self.admin.trim().is_empty() {
            return Err(CoreError::invalid_payload(
                EVENT_CACHE_CLEARED,
                "admin must not be empty",
            ));
        }
        if let Some(types) = &self.types {
            if types.iter().any(|tag| tag.trim().is_empty()) {
                return Err(CoreError::invalid_payload(
                    EVENT_CACHE_CLEARED,
                    "types must not contain empty tags",
                ));
            }
        }
        Ok(())
    }

    /// Body text for the desktop alert raised when this event arrives.
    pub fn summary(&self) -> String {
        format!("{} cache has been cleared", self.kind)
    }
}
