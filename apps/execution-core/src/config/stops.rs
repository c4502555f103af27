//! Protective stop enforcement configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::use_cases::StopEnforcementPolicy;
use crate::domain::supervision::FailureMode;

/// Stops configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopsConfig {
    /// Seconds an opening trade may wait for its stop acknowledgement.
    pub ack_timeout_secs: u64,
    /// Seconds between enforcement sweeps.
    pub sweep_interval_secs: u64,
    /// Escalation on a protection failure: `SAFE` or `PANIC`.
    pub failure_mode: FailureMode,
    /// Ratchet stops behind the favorable extreme.
    pub trailing_enabled: bool,
}

impl Default for StopsConfig {
    fn default() -> Self {
        Self {
            ack_timeout_secs: 30,
            sweep_interval_secs: 5,
            failure_mode: FailureMode::Safe,
            trailing_enabled: false,
        }
    }
}

impl StopsConfig {
    /// Enforcement policy.
    #[must_use]
    pub const fn policy(&self) -> StopEnforcementPolicy {
        StopEnforcementPolicy {
            ack_timeout: Duration::from_secs(self.ack_timeout_secs),
            failure_mode: self.failure_mode,
        }
    }

    /// Sweep period.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_config_defaults() {
        let config = StopsConfig::default();
        assert_eq!(config.policy(), StopEnforcementPolicy::default());
        assert_eq!(config.sweep_interval(), Duration::from_secs(5));
        assert!(!config.trailing_enabled);
    }
}
