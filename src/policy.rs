//! # Reconnect backoff policy for the broker sink.
//!
//! Controls how long the publisher worker waits between retryable
//! connection failures and when it gives up. The delay for attempt `n`
//! (1-based) is `base × factor^n`; after [`ReconnectPolicy::max_attempts`]
//! consecutive retryable failures the sink is declared fatally stopped.
//!
//! The schedule is deterministic — a monitoring side channel does not
//! need thundering-herd jitter, and predictable delays keep the
//! fatal-path timing bounded for callers.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use eventflux::ReconnectPolicy;
//!
//! let policy = ReconnectPolicy::default();
//! assert_eq!(policy.delay(1), Duration::from_secs(20));
//! assert_eq!(policy.delay(2), Duration::from_secs(40));
//! assert!(!policy.exhausted(5));
//! assert!(policy.exhausted(6));
//! ```

use std::time::Duration;

/// Backoff schedule applied between retryable broker reconnects.
#[derive(Clone, Copy, Debug)]
pub struct ReconnectPolicy {
    /// Base delay unit.
    pub base: Duration,
    /// Multiplicative growth factor per attempt.
    pub factor: f64,
    /// Number of consecutive retryable failures tolerated before the
    /// failure escalates to fatal.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    /// `base = 10s`, `factor = 2.0`, `max_attempts = 5`:
    /// delays of 20s, 40s, 80s, 160s, 320s, then fatal.
    fn default() -> Self {
        Self {
            base: Duration::from_secs(10),
            factor: 2.0,
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Computes the delay before retry `attempt` (1-based), saturating
    /// at [`Duration::MAX`] when the schedule outgrows it.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.base.as_secs_f64() * self.factor.powi(exp);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// True once `attempt` exceeds the tolerated number of retryable
    /// failures.
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(20));
        assert_eq!(policy.delay(2), Duration::from_secs(40));
        assert_eq!(policy.delay(3), Duration::from_secs(80));
        assert_eq!(policy.delay(4), Duration::from_secs(160));
        assert_eq!(policy.delay(5), Duration::from_secs(320));
    }

    #[test]
    fn test_exhaustion_boundary() {
        let policy = ReconnectPolicy::default();
        assert!(!policy.exhausted(0));
        assert!(!policy.exhausted(5));
        assert!(policy.exhausted(6));
    }

    #[test]
    fn test_huge_attempt_saturates() {
        let policy = ReconnectPolicy::default();
        // Finite but far past what a Duration can hold.
        assert_eq!(policy.delay(100), Duration::MAX);
        // All the way to non-finite.
        assert_eq!(policy.delay(u32::MAX), Duration::MAX);
    }
}
