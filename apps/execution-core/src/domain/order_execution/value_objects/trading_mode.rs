//! Paper vs live trading.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an order is executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradingMode {
    /// Simulated fills from the cost model.
    #[default]
    Paper,
    /// Real orders routed to the broker.
    Live,
}

impl TradingMode {
    /// Returns true for paper trading.
    #[must_use]
    pub const fn is_paper(&self) -> bool {
        matches!(self, Self::Paper)
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Paper => write!(f, "PAPER"),
            Self::Live => write!(f, "LIVE"),
        }
    }
}
