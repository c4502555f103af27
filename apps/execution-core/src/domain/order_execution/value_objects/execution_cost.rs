//! Estimated and realized execution cost.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Breakdown of an execution cost estimate, in currency units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionCost {
    /// Half-spread crossed.
    pub spread: Decimal,
    /// Expected slippage beyond the touch.
    pub slippage: Decimal,
    /// Broker commission.
    pub commission: Decimal,
    /// Transaction tax or regulatory fee.
    pub tax: Decimal,
}

impl ExecutionCost {
    /// Sum of all components.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.spread + self.slippage + self.commission + self.tax
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn total_sums_components() {
        let cost = ExecutionCost {
            spread: dec!(1.5),
            slippage: dec!(0.5),
            commission: dec!(1),
            tax: dec!(0.25),
        };
        assert_eq!(cost.total(), dec!(3.25));
    }
}
