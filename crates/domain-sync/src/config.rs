//! Engine-wide configuration
//!
//! Timing knobs shared by every domain. Per-domain bounds live in
//! [`DomainPolicy`](crate::DomainPolicy).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reliability::RetryPolicy;
use crate::serde_util::duration_millis;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long a throttled puller sleeps before re-checking the backlog
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,

    /// Longest an idle worker parks before re-evaluating whether to keep running
    #[serde(with = "duration_millis")]
    pub idle_wait: Duration,

    /// Backoff applied when a request generator fails
    #[serde(default)]
    pub producer_retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            idle_wait: Duration::from_millis(10),
            producer_retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `DOMAIN_SYNC_POLL_INTERVAL_MS`: throttle sleep (default: 10)
    /// - `DOMAIN_SYNC_IDLE_WAIT_MS`: idle worker park time (default: 10)
    /// - `DOMAIN_SYNC_PRODUCER_MAX_ATTEMPTS`: consecutive producer failures
    ///   tolerated before a puller halts (default: unlimited)
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; values go through the `with_*` setters
    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| var(key).and_then(|s| s.trim().parse::<u64>().ok());
        let mut config = Self::default();

        if let Some(ms) = parse("DOMAIN_SYNC_POLL_INTERVAL_MS") {
            config = config.with_poll_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = parse("DOMAIN_SYNC_IDLE_WAIT_MS") {
            config = config.with_idle_wait(Duration::from_millis(ms));
        }
        if let Some(attempts) = parse("DOMAIN_SYNC_PRODUCER_MAX_ATTEMPTS") {
            let attempts = u32::try_from(attempts).unwrap_or(u32::MAX);
            let retry = config.producer_retry.clone().with_max_attempts(attempts);
            config = config.with_producer_retry(retry);
        }

        config
    }

    /// Set the throttle poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Set the idle worker park time
    pub fn with_idle_wait(mut self, wait: Duration) -> Self {
        self.idle_wait = wait.max(Duration::from_millis(1));
        self
    }

    /// Set the producer retry policy
    pub fn with_producer_retry(mut self, policy: RetryPolicy) -> Self {
        self.producer_retry = policy;
        self
    }
}
