//! Top-of-book quote.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::Symbol;

/// Best bid and ask for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Quoted symbol.
    pub symbol: Symbol,
    /// Best bid.
    pub bid: Decimal,
    /// Best ask.
    pub ask: Decimal,
    /// Quote time.
    pub as_of: DateTime<Utc>,
}

impl Quote {
    /// Create a quote.
    #[must_use]
    pub const fn new(symbol: Symbol, bid: Decimal, ask: Decimal, as_of: DateTime<Utc>) -> Self {
        Self {
            symbol,
            bid,
            ask,
            as_of,
        }
    }

    /// Both sides are strictly positive.
    #[must_use]
    pub fn is_two_sided(&self) -> bool {
        self.bid > Decimal::ZERO && self.ask > Decimal::ZERO
    }

    /// Midpoint price.
    #[must_use]
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Spread as a percentage of mid, `None` when mid is not positive.
    #[must_use]
    pub fn spread_pct(&self) -> Option<Decimal> {
        let mid = self.mid();
        if mid <= Decimal::ZERO {
            return None;
        }
        Some((self.ask - self.bid) / mid * Decimal::ONE_HUNDRED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn spread_pct_of_mid() {
        let quote = Quote::new(Symbol::new("AAPL"), dec!(99), dec!(101), Utc::now());
        assert_eq!(quote.mid(), dec!(100));
        assert_eq!(quote.spread_pct(), Some(dec!(2)));
    }

    #[test]
    fn zero_bid_is_one_sided() {
        let quote = Quote::new(Symbol::new("AAPL"), dec!(0), dec!(101), Utc::now());
        assert!(!quote.is_two_sided());
    }
}
