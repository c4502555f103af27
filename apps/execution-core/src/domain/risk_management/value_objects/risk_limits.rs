//! Risk gate thresholds.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Thresholds for the pre-trade risk checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Realized daily loss, as a fraction of equity, that blocks entries.
    pub daily_loss_limit: Decimal,
    /// Maximum concurrently open trades per user.
    pub max_open_positions: usize,
    /// Maximum open risk divided by equity (0.06 = 6%).
    pub portfolio_heat_ceiling: Decimal,
    /// Absolute correlation with an open position that blocks an entry.
    pub correlation_threshold: f64,
    /// Minutes after an exit before the same symbol may be re-entered.
    pub cooldown_minutes: i64,
    /// Maximum spread as a percentage of mid.
    pub max_spread_pct: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            daily_loss_limit: dec!(0.03),
            max_open_positions: 5,
            portfolio_heat_ceiling: dec!(0.06),
            correlation_threshold: 0.8,
            cooldown_minutes: 30,
            max_spread_pct: dec!(0.5),
        }
    }
}
