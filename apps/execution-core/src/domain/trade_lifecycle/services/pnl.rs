//! Realized profit and loss.

use rust_decimal::Decimal;

use crate::domain::shared::round_price;
use crate::domain::trade_lifecycle::value_objects::TradeSide;

/// Realized P&L of closing `quantity` at `exit` after entering at `entry`.
///
/// Positive when the trade made money; the sign flips for shorts.
#[must_use]
pub fn realized_pnl(side: TradeSide, entry: Decimal, exit: Decimal, quantity: Decimal) -> Decimal {
    let per_share = match side {
        TradeSide::Long => exit - entry,
        TradeSide::Short => entry - exit,
    };
    round_price(per_share * quantity)
}

/// Capital at risk between `entry` and `stop` for `quantity` shares.
///
/// Zero once the stop has moved past entry in the trade's favor.
#[must_use]
pub fn risk_amount(side: TradeSide, entry: Decimal, stop: Decimal, quantity: Decimal) -> Decimal {
    let per_share = match side {
        TradeSide::Long => entry - stop,
        TradeSide::Short => stop - entry,
    };
    round_price(per_share.max(Decimal::ZERO) * quantity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    #[test_case(TradeSide::Long, dec!(100), dec!(110), dec!(10), dec!(100) ; "long winner")]
    #[test_case(TradeSide::Long, dec!(100), dec!(95), dec!(10), dec!(-50) ; "long loser")]
    #[test_case(TradeSide::Short, dec!(100), dec!(90), dec!(10), dec!(100) ; "short winner")]
    #[test_case(TradeSide::Short, dec!(100), dec!(104), dec!(10), dec!(-40) ; "short loser")]
    fn pnl(side: TradeSide, entry: Decimal, exit: Decimal, qty: Decimal, expected: Decimal) {
        assert_eq!(realized_pnl(side, entry, exit, qty), expected);
    }

    #[test]
    fn risk_is_distance_to_stop() {
        assert_eq!(risk_amount(TradeSide::Long, dec!(100), dec!(98), dec!(1000)), dec!(2000));
        assert_eq!(risk_amount(TradeSide::Short, dec!(50), dec!(53), dec!(100)), dec!(300));
    }

    #[test]
    fn stop_past_entry_carries_no_risk() {
        assert_eq!(risk_amount(TradeSide::Long, dec!(100), dec!(101), dec!(10)), Decimal::ZERO);
    }
}
