//! Loss supervisor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Supervisor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Losing trades in a row that trip safe mode.
    pub max_consecutive_losses: u32,
    /// Seconds between periodic evaluations.
    pub check_interval_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_consecutive_losses: 5,
            check_interval_secs: 30,
        }
    }
}

impl SupervisorConfig {
    /// Evaluation period.
    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}
