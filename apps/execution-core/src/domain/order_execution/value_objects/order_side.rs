//! Order side and the side-relative price comparisons fills depend on.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    #[must_use]
    pub const fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// The quote side an order on this side crosses: the ask for buys, the
    /// bid for sells.
    #[must_use]
    pub const fn touch(&self, bid: Decimal, ask: Decimal) -> Decimal {
        match self {
            Self::Buy => ask,
            Self::Sell => bid,
        }
    }

    /// True when `price` is at or better than `limit` for this side.
    #[must_use]
    pub fn within_limit(&self, price: Decimal, limit: Decimal) -> bool {
        match self {
            Self::Buy => price <= limit,
            Self::Sell => price >= limit,
        }
    }

    /// True when `price` has reached a stop on this side: at or above for a
    /// buy stop, at or below for a sell stop.
    #[must_use]
    pub fn stop_triggered(&self, price: Decimal, stop: Decimal) -> bool {
        match self {
            Self::Buy => price >= stop,
            Self::Sell => price <= stop,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        })
    }
}
