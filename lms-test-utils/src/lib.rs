//! LMS Test Utilities
//!
//! Shared test infrastructure for the workspace:
//! - Proptest generators for wire types
//! - Fixtures for the canonical cache-invalidation scenario

pub use lms_core::{CacheEvent, CacheKind, Frame, Timestamp};

pub mod generators {
    //! Proptest strategies for realtime wire types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a Timestamp within 2020-2030, whole seconds.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
        })
    }

    /// ISO-8601 renderings of [`arb_timestamp`]: whole seconds, milliseconds
    /// as browsers emit them, an explicit offset, and no offset at all.
    pub fn arb_iso_timestamp() -> impl Strategy<Value = String> {
        (arb_timestamp(), 0u8..4).prop_map(|(at, style)| match style {
            0 => at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            1 => at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            2 => at.to_rfc3339_opts(chrono::SecondsFormat::Secs, false),
            _ => at.format("%Y-%m-%dT%H:%M:%S").to_string(),
        })
    }

    pub fn arb_cache_kind() -> impl Strategy<Value = CacheKind> {
        prop_oneof![
            Just(CacheKind::All),
            Just(CacheKind::Cleared),
            Just(CacheKind::Courses),
            Just(CacheKind::Orders),
            Just(CacheKind::Users),
            "[a-z][a-z_]{2,15}".prop_map(CacheKind::from),
        ]
    }

    pub fn arb_admin_id() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,15}"
    }

    pub fn arb_resource_tags() -> impl Strategy<Value = Option<Vec<String>>> {
        proptest::option::of(proptest::collection::vec("[a-z]{3,12}", 0..5))
    }

    pub fn arb_cache_event() -> impl Strategy<Value = CacheEvent> {
        (arb_cache_kind(), arb_iso_timestamp(), arb_admin_id(), arb_resource_tags()).prop_map(
            |(kind, timestamp, admin, types)| CacheEvent {
                kind,
                timestamp,
                admin,
                types,
            },
        )
    }
}

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;
    use serde_json::{json, Value as JsonValue};

    /// The literal `cache:cleared` payload of the reference scenario.
    pub fn scenario_payload() -> JsonValue {
        json!({
            "type": "courses",
            "timestamp": "2024-01-01T00:00:00Z",
            "admin": "admin1"
        })
    }

    pub fn scenario_event() -> CacheEvent {
        CacheEvent::from_value(scenario_payload()).unwrap_or_else(|err| {
            panic!("scenario payload must decode: {}", err)
        })
    }

    pub fn cache_cleared_frame(event: &CacheEvent) -> Frame {
        Frame::cache_cleared(event).unwrap_or_else(|err| {
            panic!("cache event must serialize: {}", err)
        })
    }

    /// Events `admin1..=adminN`, all clearing the courses cache.
    pub fn numbered_events(count: usize) -> Vec<CacheEvent> {
        (1..=count)
            .map(|n| {
                CacheEvent::new(
                    CacheKind::Courses,
                    format!("admin{}", n),
                    scenario_event().timestamp,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn generated_events_validate(event in arb_cache_event()) {
            prop_assert!(event.validate().is_ok());
        }

        #[test]
        fn generated_events_survive_the_wire(event in arb_cache_event()) {
            let value = serde_json::to_value(&event).unwrap();
            let decoded = super::CacheEvent::from_value(value).unwrap();
            prop_assert_eq!(decoded, event);
        }
    }
}
