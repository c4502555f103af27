//! Order intent lifecycle status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one attempted broker order.
///
/// `created -> sent -> acked -> partially_filled* -> filled | rejected | cancelled`,
/// with `unknown` reachable whenever the broker can no longer confirm the order.
/// Legal edges live in [`crate::domain::order_execution::OrderStateMachine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Persisted locally, not yet sent.
    Created,
    /// Submission to the broker in flight.
    Sent,
    /// Broker accepted the order.
    Acked,
    /// Some quantity filled.
    PartiallyFilled,
    /// Completely filled.
    Filled,
    /// Declined by the risk gate or the broker.
    Rejected,
    /// Cancelled or expired at the broker.
    Cancelled,
    /// Broker state cannot be retrieved.
    Unknown,
}

impl OrderStatus {
    /// Returns true if the order reached a final outcome.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Rejected | Self::Cancelled)
    }

    /// Returns true while the order may still be working at the broker.
    #[must_use]
    pub const fn is_working(&self) -> bool {
        matches!(self, Self::Sent | Self::Acked | Self::PartiallyFilled)
    }

    /// Returns true for intents that are neither final nor already unresolved.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Sent | Self::Acked | Self::PartiallyFilled
        )
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Sent => "sent",
            Self::Acked => "acked",
            Self::PartiallyFilled => "partially_filled",
            Self::Filled => "filled",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Unknown.is_terminal());
        assert!(!OrderStatus::Acked.is_terminal());
    }

    #[test]
    fn unknown_is_neither_open_nor_working() {
        assert!(!OrderStatus::Unknown.is_open());
        assert!(!OrderStatus::Unknown.is_working());
        assert!(OrderStatus::Created.is_open());
        assert!(!OrderStatus::Created.is_working());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&OrderStatus::PartiallyFilled).unwrap();
        assert_eq!(json, "\"partially_filled\"");
    }
}
