//! Fixed-scale price arithmetic.

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of decimal places every persisted price carries.
pub const PRICE_SCALE: u32 = 4;

/// Round a price to [`PRICE_SCALE`] places, half away from zero.
#[must_use]
pub fn round_price(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_price(dec!(10.12345)), dec!(10.1235));
        assert_eq!(round_price(dec!(-10.12345)), dec!(-10.1235));
    }

    #[test]
    fn leaves_short_prices_alone() {
        assert_eq!(round_price(dec!(150.5)), dec!(150.5));
    }
}
