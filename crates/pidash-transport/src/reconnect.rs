use std::time::Duration;

use pidash_core::ReconnectConfig;

/// Reconnect schedule, injected into the transport event loop rather than
/// hard-wired there. The stock configuration is a fixed 5 s retry; a
/// multiplier above 1.0 gives capped exponential backoff.
#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    base: Duration,
    max: Duration,
    multiplier: f64,
    max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_delay_ms),
            max: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier.max(1.0),
            max_attempts: config.max_attempts,
        }
    }

    /// Fixed-interval retry forever.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            base: interval,
            max: interval,
            multiplier: 1.0,
            max_attempts: None,
        }
    }

    /// Delay before retry number `attempt` (zero-based), or `None` once
    /// the attempt budget is spent.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if let Some(max_attempts) = self.max_attempts {
            if attempt >= max_attempts {
                return None;
            }
        }
        let factor = self.multiplier.powi(attempt.min(32) as i32);
        let delay = self.base.mul_f64(factor);
        Some(delay.min(self.max))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(&ReconnectConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_fixed_five_seconds() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(0), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay(10), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay(1_000), Some(Duration::from_secs(5)));
    }

    #[test]
    fn exponential_backoff_caps_at_max() {
        let policy = ReconnectPolicy::new(&ReconnectConfig {
            base_delay_ms: 500,
            max_delay_ms: 4_000,
            multiplier: 2.0,
            max_attempts: None,
        });
        assert_eq!(policy.delay(0), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay(1), Some(Duration::from_millis(1_000)));
        assert_eq!(policy.delay(2), Some(Duration::from_millis(2_000)));
        assert_eq!(policy.delay(3), Some(Duration::from_millis(4_000)));
        assert_eq!(policy.delay(20), Some(Duration::from_millis(4_000)));
    }

    #[test]
    fn attempt_budget_exhausts() {
        let policy = ReconnectPolicy::new(&ReconnectConfig {
            base_delay_ms: 100,
            max_delay_ms: 100,
            multiplier: 1.0,
            max_attempts: Some(3),
        });
        assert!(policy.delay(0).is_some());
        assert!(policy.delay(2).is_some());
        assert_eq!(policy.delay(3), None);
    }

    #[test]
    fn sub_unit_multiplier_is_clamped() {
        let policy = ReconnectPolicy::new(&ReconnectConfig {
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            multiplier: 0.5,
            max_attempts: None,
        });
        // Never decays below the base interval.
        assert_eq!(policy.delay(5), Some(Duration::from_secs(1)));
    }
}
