//! Entry-halt loss limits.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::domain::supervision::aggregate::LossCounters;
use crate::domain::supervision::value_objects::HaltReason;

/// Loss limits. Period limits are fractions of starting capital.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LossLimits {
    /// Losing trades in a row that halt entries.
    pub max_consecutive_losses: u32,
    /// Daily loss as a fraction of starting capital (0.03 = 3%).
    pub daily_loss_limit: Decimal,
    /// Weekly loss fraction.
    pub weekly_loss_limit: Decimal,
    /// Monthly loss fraction.
    pub monthly_loss_limit: Decimal,
}

impl Default for LossLimits {
    fn default() -> Self {
        Self {
            max_consecutive_losses: 5,
            daily_loss_limit: dec!(0.03),
            weekly_loss_limit: dec!(0.06),
            monthly_loss_limit: dec!(0.10),
        }
    }
}

/// A breached limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitBreach {
    /// Which limit.
    pub reason: HaltReason,
    /// Observed value (streak length or P&L fraction).
    pub current_value: Decimal,
    /// Configured limit.
    pub threshold: Decimal,
}

impl LimitBreach {
    /// Human-readable detail.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "{}: current {} vs limit {}",
            self.reason, self.current_value, self.threshold
        )
    }
}

impl LossLimits {
    /// First breached limit, checked streak, daily, weekly, monthly.
    ///
    /// A non-positive `starting_capital` skips the P&L limits.
    #[must_use]
    pub fn evaluate(&self, counters: &LossCounters, starting_capital: Decimal) -> Option<LimitBreach> {
        if self.max_consecutive_losses > 0
            && counters.consecutive_losses >= self.max_consecutive_losses
        {
            return Some(LimitBreach {
                reason: HaltReason::ConsecutiveLosses,
                current_value: Decimal::from(counters.consecutive_losses),
                threshold: Decimal::from(self.max_consecutive_losses),
            });
        }

        if starting_capital <= Decimal::ZERO {
            return None;
        }

        let periods = [
            (HaltReason::DailyLossLimit, counters.daily_pnl, self.daily_loss_limit),
            (HaltReason::WeeklyLossLimit, counters.weekly_pnl, self.weekly_loss_limit),
            (HaltReason::MonthlyLossLimit, counters.monthly_pnl, self.monthly_loss_limit),
        ];
        periods.into_iter().find_map(|(reason, pnl, limit)| {
            let fraction = pnl / starting_capital;
            (fraction <= -limit).then(|| LimitBreach {
                reason,
                current_value: fraction.round_dp(6),
                threshold: -limit,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn counters(streak: u32, daily: Decimal, weekly: Decimal) -> LossCounters {
        let mut c = LossCounters::new(Utc::now());
        c.consecutive_losses = streak;
        c.daily_pnl = daily;
        c.weekly_pnl = weekly;
        c.monthly_pnl = weekly;
        c
    }

    #[test]
    fn streak_at_ceiling_halts() {
        let breach = LossLimits::default()
            .evaluate(&counters(5, Decimal::ZERO, Decimal::ZERO), dec!(100000))
            .unwrap();
        assert_eq!(breach.reason, HaltReason::ConsecutiveLosses);
    }

    #[test]
    fn daily_loss_at_limit_halts() {
        let breach = LossLimits::default()
            .evaluate(&counters(1, dec!(-3000), dec!(-3000)), dec!(100000))
            .unwrap();
        assert_eq!(breach.reason, HaltReason::DailyLossLimit);
        assert_eq!(breach.current_value, dec!(-0.03));
    }

    #[test]
    fn weekly_loss_halts_when_daily_is_fine() {
        let breach = LossLimits::default()
            .evaluate(&counters(0, dec!(-100), dec!(-6500)), dec!(100000))
            .unwrap();
        assert_eq!(breach.reason, HaltReason::WeeklyLossLimit);
    }

    #[test]
    fn within_limits() {
        assert!(
            LossLimits::default()
                .evaluate(&counters(2, dec!(-2999), dec!(-2999)), dec!(100000))
                .is_none()
        );
    }

    #[test]
    fn unknown_capital_only_checks_streak() {
        assert!(
            LossLimits::default()
                .evaluate(&counters(0, dec!(-99999), dec!(-99999)), Decimal::ZERO)
                .is_none()
        );
    }
}
