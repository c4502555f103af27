//! Execution cost model.
//!
//! Estimates spread, slippage, commission and tax for an order against a
//! reference quote, synthesizes paper fill prices, and reconciles the estimate
//! against the realized fill.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::value_objects::{ExecutionCost, OrderSide, Quote};
use crate::domain::shared::round_price;

/// Basis points divisor (1 bp = 0.0001).
const BPS_DIVISOR: Decimal = dec!(10000);

/// Cost model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModelConfig {
    /// Fraction of the half-spread paid when crossing (0 = mid, 1 = touch).
    pub spread_capture: Decimal,
    /// Slippage beyond the touch, in basis points of mid.
    pub slippage_bps: Decimal,
    /// Commission per share.
    pub commission_per_share: Decimal,
    /// Minimum commission per order.
    pub commission_minimum: Decimal,
    /// Tax on sell notional, in basis points.
    pub sell_tax_bps: Decimal,
}

impl Default for CostModelConfig {
    fn default() -> Self {
        Self {
            spread_capture: Decimal::ONE,
            slippage_bps: dec!(5),
            commission_per_share: Decimal::ZERO,
            commission_minimum: Decimal::ZERO,
            sell_tax_bps: Decimal::ZERO,
        }
    }
}

/// Spread/slippage/commission/tax cost model.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostModel {
    config: CostModelConfig,
}

impl CostModel {
    /// Create a cost model.
    #[must_use]
    pub const fn new(config: CostModelConfig) -> Self {
        Self { config }
    }

    /// Estimated cost of executing `quantity` against `quote`.
    #[must_use]
    pub fn estimate(&self, side: OrderSide, quantity: Decimal, quote: &Quote) -> ExecutionCost {
        let half_spread = (quote.ask - quote.bid).max(Decimal::ZERO) / Decimal::TWO;
        let spread = half_spread * self.config.spread_capture * quantity;
        let slippage = quote.mid() * self.config.slippage_bps / BPS_DIVISOR * quantity;
        let notional = quote.mid() * quantity;

        ExecutionCost {
            spread: round_price(spread),
            slippage: round_price(slippage),
            commission: self.commission(quantity),
            tax: self.tax(side, notional),
        }
    }

    /// Paper fill price: mid moved against the order by the captured
    /// half-spread plus slippage.
    #[must_use]
    pub fn fill_price(&self, side: OrderSide, quote: &Quote) -> Decimal {
        let mid = quote.mid();
        let half_spread = (quote.ask - quote.bid).max(Decimal::ZERO) / Decimal::TWO;
        let impact =
            half_spread * self.config.spread_capture + mid * self.config.slippage_bps / BPS_DIVISOR;

        let price = match side {
            OrderSide::Buy => mid + impact,
            OrderSide::Sell => (mid - impact).max(Decimal::ZERO),
        };
        round_price(price)
    }

    /// Realized cost once the fill price is known, measured against the
    /// reference mid. Price impact up to the half-spread counts as spread,
    /// the remainder as slippage (negative when the fill improved on it).
    #[must_use]
    pub fn realized(
        &self,
        side: OrderSide,
        quantity: Decimal,
        quote: &Quote,
        fill_price: Decimal,
    ) -> ExecutionCost {
        let mid = quote.mid();
        let per_share_impact = match side {
            OrderSide::Buy => fill_price - mid,
            OrderSide::Sell => mid - fill_price,
        };
        let half_spread = (quote.ask - quote.bid).max(Decimal::ZERO) / Decimal::TWO;
        let spread_part = per_share_impact.clamp(Decimal::ZERO, half_spread);

        ExecutionCost {
            spread: round_price(spread_part * quantity),
            slippage: round_price((per_share_impact - spread_part) * quantity),
            commission: self.commission(quantity),
            tax: self.tax(side, fill_price * quantity),
        }
    }

    fn commission(&self, quantity: Decimal) -> Decimal {
        round_price((quantity * self.config.commission_per_share).max(self.config.commission_minimum))
    }

    fn tax(&self, side: OrderSide, notional: Decimal) -> Decimal {
        match side {
            OrderSide::Sell => round_price(notional * self.config.sell_tax_bps / BPS_DIVISOR),
            OrderSide::Buy => Decimal::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::Symbol;
    use chrono::Utc;

    fn quote() -> Quote {
        Quote::new(Symbol::new("AAPL"), dec!(99.90), dec!(100.10), Utc::now())
    }

    fn model() -> CostModel {
        CostModel::new(CostModelConfig {
            spread_capture: Decimal::ONE,
            slippage_bps: dec!(10),
            commission_per_share: dec!(0.005),
            commission_minimum: dec!(1),
            sell_tax_bps: dec!(2),
        })
    }

    #[test]
    fn buy_fills_above_ask() {
        // mid 100, half spread 0.10, slippage 10bp = 0.10
        assert_eq!(model().fill_price(OrderSide::Buy, &quote()), dec!(100.2));
    }

    #[test]
    fn sell_fills_below_bid() {
        assert_eq!(model().fill_price(OrderSide::Sell, &quote()), dec!(99.8));
    }

    #[test]
    fn estimate_components() {
        let cost = model().estimate(OrderSide::Sell, dec!(100), &quote());
        assert_eq!(cost.spread, dec!(10));
        assert_eq!(cost.slippage, dec!(10));
        assert_eq!(cost.commission, dec!(1));
        assert_eq!(cost.tax, dec!(2));
        assert_eq!(cost.total(), dec!(23));
    }

    #[test]
    fn buys_pay_no_tax() {
        let cost = model().estimate(OrderSide::Buy, dec!(100), &quote());
        assert_eq!(cost.tax, Decimal::ZERO);
    }

    #[test]
    fn realized_matches_estimate_for_model_fill() {
        let model = model();
        let fill = model.fill_price(OrderSide::Buy, &quote());
        let realized = model.realized(OrderSide::Buy, dec!(100), &quote(), fill);
        let estimate = model.estimate(OrderSide::Buy, dec!(100), &quote());
        assert_eq!(realized.total(), estimate.total());
    }

    #[test]
    fn price_improvement_is_negative_slippage() {
        let realized = model().realized(OrderSide::Buy, dec!(10), &quote(), dec!(99.95));
        assert_eq!(realized.spread, Decimal::ZERO);
        assert_eq!(realized.slippage, dec!(-0.5));
    }
}
