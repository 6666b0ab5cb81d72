//! Retry policy for request generation

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::serde_util::duration_millis;

/// Backoff applied after consecutive request generator failures
///
/// Exponential backoff with jitter. The failure counter is reset every time
/// the generator succeeds, so the budget counts consecutive failures only.
///
/// # Example
///
/// ```
/// use domain_sync::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::exponential()
///     .with_max_attempts(5)
///     .with_initial_interval(Duration::from_millis(100))
///     .with_max_interval(Duration::from_secs(10));
///
/// assert!(policy.has_attempts_remaining(4));
/// assert!(!policy.has_attempts_remaining(5));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of consecutive failed calls before the puller halts
    pub max_attempts: u32,

    /// Delay after the first failure
    #[serde(with = "duration_millis")]
    pub initial_interval: Duration,

    /// Upper bound on the delay
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Backoff multiplier (e.g., 2.0 for exponential)
    pub backoff_coefficient: f64,

    /// Jitter factor (0.0-1.0); 0.1 means +/-10%
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryPolicy {
    /// Exponential backoff that never gives up
    ///
    /// - unlimited attempts
    /// - 100ms initial interval
    /// - 30 second max interval
    /// - 2x backoff coefficient
    /// - 10% jitter
    pub fn exponential() -> Self {
        Self {
            max_attempts: u32::MAX,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(30),
            backoff_coefficient: 2.0,
            jitter: 0.1,
        }
    }

    /// Halt on the first failure
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            backoff_coefficient: 1.0,
            jitter: 0.0,
        }
    }

    /// Fixed delay between attempts
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_interval: interval,
            max_interval: interval,
            backoff_coefficient: 1.0,
            jitter: 0.0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient.max(1.0);
        self
    }

    /// Set the jitter factor (0.0-1.0)
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay to wait after `failures` consecutive failures (1-based)
    pub fn delay_for_failure(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        // Exponent is capped; the interval cap kicks in long before.
        let exponent = (failures - 1).min(63) as i32;
        let base = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exponent);
        let capped = base.min(self.max_interval.as_secs_f64());

        let jitter_range = capped * self.jitter;
        let jittered = if jitter_range > 0.0 {
            let mut rng = rand::thread_rng();
            (capped + rng.gen_range(-jitter_range..jitter_range)).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }

    /// Whether another call is allowed after `failures` consecutive failures
    pub fn has_attempts_remaining(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }
}
