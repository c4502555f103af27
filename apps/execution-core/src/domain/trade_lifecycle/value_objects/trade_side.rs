//! Long or short.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::order_execution::OrderSide;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSide {
    /// Profits when price rises.
    Long,
    /// Profits when price falls.
    Short,
}

impl TradeSide {
    /// Side of the order that opens this position.
    #[must_use]
    pub const fn entry_side(&self) -> OrderSide {
        match self {
            Self::Long => OrderSide::Buy,
            Self::Short => OrderSide::Sell,
        }
    }

    /// Side of the order that closes this position.
    #[must_use]
    pub const fn exit_side(&self) -> OrderSide {
        self.entry_side().opposite()
    }

    /// Position direction opened by an entry order on `side`.
    #[must_use]
    pub const fn from_entry(side: OrderSide) -> Self {
        match side {
            OrderSide::Buy => Self::Long,
            OrderSide::Sell => Self::Short,
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_side_is_opposite_of_entry() {
        assert_eq!(TradeSide::Long.exit_side(), OrderSide::Sell);
        assert_eq!(TradeSide::Short.exit_side(), OrderSide::Buy);
        assert_eq!(TradeSide::from_entry(OrderSide::Sell), TradeSide::Short);
    }
}
