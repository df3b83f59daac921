//! Jittered exponential-backoff policy for job-group stream reconnects.
//!
//! The registry counts consecutive failed connects per group and asks
//! [`ReconnectPolicy::delay_for_attempt`] how long to wait before the
//! next one. The counter resets to zero on every successful open.

use std::time::Duration;

use rand::Rng;

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnection attempt, and the floor for all
    /// jittered delays.
    pub min_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Consecutive failures after which reconnection stops.
    pub max_attempts: u32,
    /// Symmetric jitter as a fraction of the un-jittered delay.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 20,
            jitter: 0.2,
        }
    }
}

impl ReconnectPolicy {
    /// Un-jittered delay for the 0-based `attempt`:
    /// `min(max_delay, min_delay * 2^attempt)`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let min_ms = self.min_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let exp = 2f64.powi(attempt.min(i32::MAX as u32) as i32);
        Duration::from_millis((min_ms * exp).min(max_ms) as u64)
    }

    /// Jittered delay for the 0-based `attempt`, kept within
    /// `[min_delay, max_delay]`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = if self.jitter > 0.0 {
            1.0 + rand::rng().random_range(-self.jitter..=self.jitter)
        } else {
            1.0
        };
        self.apply_jitter(attempt, factor)
    }

    fn apply_jitter(&self, attempt: u32, factor: f64) -> Duration {
        let base_ms = self.base_delay(attempt).as_millis() as f64;
        let min_ms = self.min_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let jittered = (base_ms * factor).max(min_ms).min(max_ms.max(min_ms));
        Duration::from_millis(jittered.round() as u64)
    }

    /// Whether `attempts` consecutive failures exhaust the policy.
    pub fn should_give_up(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}
