//! Why an order is being placed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order purpose.
///
/// Entries open risk and go through every risk check; everything else
/// reduces risk and only has to pass the liquidity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderPurpose {
    /// Entry order (opening a position).
    Entry,
    /// Exit order (closing a position).
    Exit,
    /// Protective stop resting at the broker.
    StopLoss,
    /// Emergency market flatten.
    Flatten,
}

impl OrderPurpose {
    /// Returns true if this order opens new risk.
    #[must_use]
    pub const fn is_entry(&self) -> bool {
        matches!(self, Self::Entry)
    }

    /// Lowercase label for metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
            Self::StopLoss => "stop_loss",
            Self::Flatten => "flatten",
        }
    }
}

impl fmt::Display for OrderPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry => write!(f, "ENTRY"),
            Self::Exit => write!(f, "EXIT"),
            Self::StopLoss => write!(f, "STOP_LOSS"),
            Self::Flatten => write!(f, "FLATTEN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_entries_open_risk() {
        assert!(OrderPurpose::Entry.is_entry());
        assert!(!OrderPurpose::Exit.is_entry());
        assert!(!OrderPurpose::Flatten.is_entry());
        assert!(!OrderPurpose::StopLoss.is_entry());
    }
}
