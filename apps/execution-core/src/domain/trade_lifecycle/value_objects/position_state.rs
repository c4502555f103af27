//! Trade position state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position lifecycle of a trade.
///
/// `opening -> open -> closing -> closed`, with `error` reachable while the
/// position is still live. An errored trade can only move on by closing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    /// Entry filled, protective stop not yet acknowledged.
    Opening,
    /// Protected and live.
    Open,
    /// Exit in progress.
    Closing,
    /// Flat, P&L realized.
    Closed,
    /// Protection failed; needs a forced exit or an operator.
    Error,
}

impl PositionState {
    /// States holding market exposure.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Opening | Self::Open | Self::Closing | Self::Error)
    }

    /// `closing` and `closed` trades only accept audit metadata (and
    /// `closing -> closed`).
    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
