//! Exit retry budget, backoff and sweep.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::exit_retry::BackoffPolicy;

/// Exit retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitRetryConfig {
    /// Attempts before a request is dead-lettered.
    pub max_attempts: u32,
    /// Delay after the first failed attempt, in milliseconds.
    pub base_backoff_ms: u64,
    /// Ceiling on any delay, in milliseconds.
    pub max_backoff_ms: u64,
    /// Seconds between sweeps for due requests.
    pub sweep_interval_secs: u64,
    /// Requests attempted concurrently per sweep.
    pub concurrency: usize,
}

impl Default for ExitRetryConfig {
    fn default() -> Self {
        let policy = BackoffPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_backoff_ms: policy.base_delay.as_millis() as u64,
            max_backoff_ms: policy.max_delay.as_millis() as u64,
            sweep_interval_secs: 5,
            concurrency: 4,
        }
    }
}

impl ExitRetryConfig {
    /// Backoff policy.
    #[must_use]
    pub const fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }

    /// Sweep period.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
