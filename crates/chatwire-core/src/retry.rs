//! Retry and backoff policies
//!
//! Reconnection and queued-send pacing are two independent policies:
//! [`ExponentialBackoff`] doubles its delay per consecutive failure,
//! [`FixedSchedule`] walks a fixed list of delays and repeats the last step.
//! Keeping them as separate values lets each be configured and tested in
//! isolation.

use core::time::Duration;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Exponential Backoff
// ----------------------------------------------------------------------------

/// Exponential backoff: `base * 2^attempt`, capped at `max_delay`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max_delay: Duration,
    /// Consecutive failures tolerated before giving up
    pub max_attempts: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl ExponentialBackoff {
    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.min(31);
        let millis = (self.base.as_millis() as u64).saturating_mul(1u64 << shift);
        Duration::from_millis(millis).min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempt` failures
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

// ----------------------------------------------------------------------------
// Fixed Schedule
// ----------------------------------------------------------------------------

/// Fixed delay schedule; steps past the end repeat the last value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedSchedule {
    steps: Vec<Duration>,
}

impl Default for FixedSchedule {
    fn default() -> Self {
        Self::new(vec![
            Duration::from_millis(500),
            Duration::from_secs(1),
            Duration::from_secs(2),
        ])
    }
}

impl FixedSchedule {
    /// Create a schedule from explicit steps; must not be empty
    pub fn new(steps: Vec<Duration>) -> Self {
        assert!(!steps.is_empty(), "schedule needs at least one step");
        Self { steps }
    }

    /// Delay for step `index` (0-based); saturates at the last step
    pub fn delay(&self, index: u32) -> Duration {
        let index = (index as usize).min(self.steps.len() - 1);
        self.steps[index]
    }

    /// Whether the schedule has no steps (possible via deserialization)
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_doubling_and_cap() {
        let backoff = ExponentialBackoff {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_attempts: 5,
        };

        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
        assert_eq!(backoff.delay(3), Duration::from_secs(8));
        // Capped by max_delay from here on
        assert_eq!(backoff.delay(4), Duration::from_secs(10));
        assert_eq!(backoff.delay(20), Duration::from_secs(10));

        assert!(backoff.allows(4));
        assert!(!backoff.allows(5));
    }

    #[test]
    fn test_exponential_large_attempt_does_not_overflow() {
        let backoff = ExponentialBackoff::default();
        assert_eq!(backoff.delay(u32::MAX), backoff.max_delay);
    }

    #[test]
    fn test_fixed_schedule_repeats_last_step() {
        let schedule = FixedSchedule::default();
        assert_eq!(schedule.delay(0), Duration::from_millis(500));
        assert_eq!(schedule.delay(1), Duration::from_secs(1));
        assert_eq!(schedule.delay(2), Duration::from_secs(2));
        assert_eq!(schedule.delay(3), Duration::from_secs(2));
        assert_eq!(schedule.delay(100), Duration::from_secs(2));
    }
}
