//! Trading mode and the live polling budget.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::use_cases::ExecutionPolicy;
use crate::domain::order_execution::TradingMode;

/// Execution configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Mode for orders that do not name one.
    pub mode: TradingMode,
    /// Milliseconds between status polls of a live order.
    pub poll_interval_ms: u64,
    /// Maximum status polls per order.
    pub max_poll_attempts: u32,
    /// Overall polling budget per order, in seconds.
    pub poll_deadline_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        let policy = ExecutionPolicy::default();
        Self {
            mode: TradingMode::Paper,
            poll_interval_ms: policy.poll_interval.as_millis() as u64,
            max_poll_attempts: policy.max_poll_attempts,
            poll_deadline_secs: policy.poll_deadline.as_secs(),
        }
    }
}

impl ExecutionConfig {
    /// Polling policy for the execution engine.
    #[must_use]
    pub const fn policy(&self) -> ExecutionPolicy {
        ExecutionPolicy {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_poll_attempts: self.max_poll_attempts,
            poll_deadline: Duration::from_secs(self.poll_deadline_secs),
        }
    }
}
