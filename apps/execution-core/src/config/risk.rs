//! Pre-trade risk thresholds and period loss limits.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::domain::risk_management::RiskLimits;

/// Risk configuration. Loss limits are fractions of starting capital.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Daily loss fraction that blocks entries and trips safe mode.
    pub daily_loss_limit: Decimal,
    /// Weekly loss fraction.
    pub weekly_loss_limit: Decimal,
    /// Monthly loss fraction.
    pub monthly_loss_limit: Decimal,
    /// Maximum concurrently open trades per user.
    pub max_open_positions: usize,
    /// Maximum open risk over equity.
    pub portfolio_heat_ceiling: Decimal,
    /// Absolute correlation that blocks a new entry.
    pub correlation_threshold: f64,
    /// Minutes before a symbol may be re-entered after an exit.
    pub cooldown_minutes: i64,
    /// Maximum spread as a percentage of mid.
    pub max_spread_pct: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        let limits = RiskLimits::default();
        Self {
            daily_loss_limit: limits.daily_loss_limit,
            weekly_loss_limit: dec!(0.06),
            monthly_loss_limit: dec!(0.10),
            max_open_positions: limits.max_open_positions,
            portfolio_heat_ceiling: limits.portfolio_heat_ceiling,
            correlation_threshold: limits.correlation_threshold,
            cooldown_minutes: limits.cooldown_minutes,
            max_spread_pct: limits.max_spread_pct,
        }
    }
}

impl RiskConfig {
    /// Thresholds for the risk gate.
    #[must_use]
    pub const fn limits(&self) -> RiskLimits {
        RiskLimits {
            daily_loss_limit: self.daily_loss_limit,
            max_open_positions: self.max_open_positions,
            portfolio_heat_ceiling: self.portfolio_heat_ceiling,
            correlation_threshold: self.correlation_threshold,
            cooldown_minutes: self.cooldown_minutes,
            max_spread_pct: self.max_spread_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_gate_defaults() {
        assert_eq!(RiskConfig::default().limits(), RiskLimits::default());
    }
}
