//! How an order is priced at the broker.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Fill at the touch.
    Market,
    /// Fill at the limit or better.
    Limit,
    /// Rest until the stop is reached, then fill at the touch. Protective
    /// stops are always this type.
    Stop,
}

impl OrderType {
    /// Name of the price field this type needs but was not given.
    #[must_use]
    pub const fn missing_price(
        &self,
        limit_price: Option<Decimal>,
        stop_price: Option<Decimal>,
    ) -> Option<&'static str> {
        match self {
            Self::Limit if limit_price.is_none() => Some("limit_price"),
            Self::Stop if stop_price.is_none() => Some("stop_price"),
            _ => None,
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Market => "MARKET",
            Self::Limit => "LIMIT",
            Self::Stop => "STOP",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rust_decimal_macros::dec;

    #[test]
    fn priced_types_name_their_missing_field() {
        assert_eq!(OrderType::Market.missing_price(None, None), None);
        assert_eq!(OrderType::Limit.missing_price(None, Some(dec!(1))), Some("limit_price"));
        assert_eq!(OrderType::Limit.missing_price(Some(dec!(1)), None), None);
        assert_eq!(OrderType::Stop.missing_price(Some(dec!(1)), None), Some("stop_price"));
    }
}
