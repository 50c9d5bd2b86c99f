//! Reconnection policy.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::ReconnectConfig;

/// How many reconnection attempts are allowed and how long to wait
/// before each one.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    enabled: bool,
    max_attempts: u32,
    delay_ms: u64,
    multiplier: f64,
    max_delay_ms: u64,
    jitter_ms: u64,
}

impl ReconnectPolicy {
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_attempts: config.max_attempts,
            delay_ms: config.delay_ms,
            multiplier: config.multiplier,
            max_delay_ms: config.max_delay_ms,
            jitter_ms: config.jitter_ms,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether reconnection attempt `attempt` (1-based) may run.
    pub fn allows(&self, attempt: u32) -> bool {
        self.enabled && attempt >= 1 && attempt <= self.max_attempts
    }

    /// Delay before attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = (self.delay_ms as f64 * self.multiplier.powi(exponent)) as u64;
        let base = if self.multiplier > 1.0 {
            scaled.min(self.max_delay_ms)
        } else {
            self.delay_ms
        };
        Duration::from_millis(jittered(base, self.jitter_ms))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

fn jittered(base_ms: u64, jitter_ms: u64) -> u64 {
    if jitter_ms == 0 {
        return base_ms;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_nanos(0))
        .subsec_nanos() as u64;
    base_ms.saturating_add(nanos % jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_is_fixed_one_second() {
        let policy = ReconnectPolicy::default();
        for attempt in 1..=5 {
            assert_eq!(policy.delay_for(attempt), Duration::from_millis(1_000));
        }
    }

    #[test]
    fn test_ceiling() {
        let policy = ReconnectPolicy::default();
        assert!(!policy.allows(0));
        assert!(policy.allows(1));
        assert!(policy.allows(5));
        assert!(!policy.allows(6));
    }

    #[test]
    fn test_disabled_never_allows() {
        let policy = ReconnectPolicy::from_config(&ReconnectConfig {
            enabled: false,
            ..ReconnectConfig::default()
        });
        assert!(!policy.allows(1));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = ReconnectPolicy::from_config(&ReconnectConfig {
            delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 500,
            ..ReconnectConfig::default()
        });
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for(40), Duration::from_millis(500));
    }

    proptest! {
        #[test]
        fn jitter_stays_in_window(base in 1u64..10_000, jitter in 1u64..1_000) {
            let delay = jittered(base, jitter);
            prop_assert!(delay >= base);
            prop_assert!(delay < base + jitter);
        }
    }
}
