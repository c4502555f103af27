//! Reconciliation configuration for periodic broker state sync.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::use_cases::ReconciliationPolicy;

use super::observability::default_true;

/// Reconciliation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Reconciliation interval in seconds. The first run is at startup.
    #[serde(default = "default_reconciliation_interval")]
    pub interval_secs: u64,
    /// Enter safe mode when a run finds any mismatch.
    #[serde(default = "default_true")]
    pub safe_mode_on_mismatch: bool,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reconciliation_interval(),
            safe_mode_on_mismatch: true,
        }
    }
}

impl ReconciliationConfig {
    /// Run period.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Mismatch policy.
    #[must_use]
    pub const fn policy(&self) -> ReconciliationPolicy {
        ReconciliationPolicy {
            safe_mode_on_mismatch: self.safe_mode_on_mismatch,
        }
    }
}

const fn default_reconciliation_interval() -> u64 {
    60
}
