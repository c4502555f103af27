//! Why a trade was closed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit trigger recorded on the trade and on its retry request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    /// Price crossed the protective stop.
    StopLoss,
    /// Strategy or user requested the exit.
    Manual,
    /// Risk limit breach forced the exit.
    RiskBreach,
    /// Emergency panic flatten.
    Panic,
    /// Protective stop was never acknowledged.
    StopProtectionFailure,
    /// Closed by reconciliation after the broker reported it flat.
    Reconciliation,
}

impl ExitReason {
    /// Stable code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StopLoss => "STOP_LOSS",
            Self::Manual => "MANUAL",
            Self::RiskBreach => "RISK_BREACH",
            Self::Panic => "PANIC",
            Self::StopProtectionFailure => "STOP_PROTECTION_FAILURE",
            Self::Reconciliation => "RECONCILIATION",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
