//! Why trading was halted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Halt trigger, reported with a stable code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HaltReason {
    /// Consecutive-loss streak at or above the ceiling.
    ConsecutiveLosses,
    /// Daily realized loss limit breached.
    DailyLossLimit,
    /// Weekly realized loss limit breached.
    WeeklyLossLimit,
    /// Monthly realized loss limit breached.
    MonthlyLossLimit,
    /// Reconciliation found broker/local disagreement.
    ReconciliationMismatch,
    /// A protective stop was never acknowledged.
    StopLossFailure,
    /// Broker could not be reached.
    BrokerUnreachable,
    /// An exit exhausted its retry budget.
    ExitDeadLetter,
    /// Operator request.
    Manual,
}

impl HaltReason {
    /// Stable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ConsecutiveLosses => "CONSECUTIVE_LOSSES",
            Self::DailyLossLimit => "DAILY_LOSS_LIMIT",
            Self::WeeklyLossLimit => "WEEKLY_LOSS_LIMIT",
            Self::MonthlyLossLimit => "MONTHLY_LOSS_LIMIT",
            Self::ReconciliationMismatch => "RECONCILIATION_MISMATCH",
            Self::StopLossFailure => "STOP_LOSS_FAILURE",
            Self::BrokerUnreachable => "BROKER_UNREACHABLE",
            Self::ExitDeadLetter => "EXIT_DEAD_LETTER",
            Self::Manual => "MANUAL",
        }
    }

    /// Entry halts the daily reset is allowed to lift.
    #[must_use]
    pub const fn clears_on_daily_reset(&self) -> bool {
        matches!(self, Self::ConsecutiveLosses | Self::DailyLossLimit)
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
