//! # Backoff Policy
//!
//! A pure calculator for the delay between retries of a failing feed. The delay
//! for attempt `n` (zero based) is `min(base_delay * multiplier^n, max_delay)`,
//! and `max_delay` can never exceed [`MAX_DELAY_CAP`] no matter what a monitor
//! asks for. The policy carries no counters of its own: the owning poll loop
//! keeps the retry count and resets it on every successful fetch.

use std::time::Duration;

/// Hard ceiling on any retry delay. Bounds the worst-case staleness of a feed.
pub const MAX_DELAY_CAP: Duration = Duration::from_millis(60_000);

/// # Backoff Policy
///
/// Exponential retry schedule with a retry budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    max_retries: u32,
}

impl BackoffPolicy {
    /// Creates a policy. `max_delay` starts at [`MAX_DELAY_CAP`].
    pub fn new(base_delay: Duration, multiplier: f64, max_retries: u32) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay: MAX_DELAY_CAP,
            max_retries,
        }
    }

    /// Lowers the ceiling for this policy. Values above [`MAX_DELAY_CAP`] are clamped.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay.min(MAX_DELAY_CAP);
        self
    }

    /// The delay before retry `attempt` (0 for the first retry).
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let cap = self.max_delay.as_secs_f64();
        if !scaled.is_finite() || scaled >= cap {
            return self.max_delay;
        }
        Duration::from_secs_f64(scaled)
    }

    /// `true` once `retry_count` consecutive failures exceed the retry budget.
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count > self.max_retries
    }

    /// The configured retry budget.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// The delay of the first retry.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Growth factor between consecutive retries.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Effective ceiling of this policy.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_geometrically() {
        let policy = BackoffPolicy::new(Duration::from_millis(1000), 2.0, 5);
        assert_eq!(policy.next_delay(0), Duration::from_millis(1000));
        assert_eq!(policy.next_delay(1), Duration::from_millis(2000));
        assert_eq!(policy.next_delay(3), Duration::from_millis(8000));
    }

    #[test]
    fn non_decreasing_and_capped() {
        let policy = BackoffPolicy::new(Duration::from_millis(3000), 1.2, 5);
        let mut previous = Duration::ZERO;
        for attempt in 0..200 {
            let delay = policy.next_delay(attempt);
            assert!(delay >= previous, "attempt {attempt} went down");
            assert!(delay <= MAX_DELAY_CAP);
            previous = delay;
        }
        assert_eq!(policy.next_delay(199), MAX_DELAY_CAP);
    }

    #[test]
    fn configured_ceiling_is_clamped_to_hard_cap() {
        let policy = BackoffPolicy::new(Duration::from_millis(15_000), 2.0, 2)
            .with_max_delay(Duration::from_secs(600));
        assert_eq!(policy.max_delay(), MAX_DELAY_CAP);
        assert_eq!(policy.next_delay(10), MAX_DELAY_CAP);

        let tight = BackoffPolicy::new(Duration::from_millis(1000), 2.0, 2)
            .with_max_delay(Duration::from_millis(2500));
        assert_eq!(tight.next_delay(1), Duration::from_millis(2000));
        assert_eq!(tight.next_delay(2), Duration::from_millis(2500));
    }

    #[test]
    fn retry_budget() {
        let policy = BackoffPolicy::new(Duration::from_millis(500), 1.5, 2);
        assert!(!policy.is_exhausted(1));
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
    }
}
