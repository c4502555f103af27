//! Risk Gate Domain Service
//!
//! An ordered pipeline of independent checks over an explicit snapshot.
//! Evaluation is pure: the same request and snapshot always produce the same
//! decision, and nothing is mutated.

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

use crate::domain::risk_management::value_objects::{
    RejectCode, RiskDecision, RiskLimits, RiskRejection, RiskRequest, RiskSnapshot,
};

type CheckResult = Result<(), RiskRejection>;

/// Pre-trade risk gate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskGate {
    limits: RiskLimits,
}

impl RiskGate {
    /// Create a gate with the given limits.
    #[must_use]
    pub const fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    /// The configured limits.
    #[must_use]
    pub const fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Run the checks in order and stop at the first rejection.
    ///
    /// Exits skip the crisis, capital and position checks and only have to
    /// pass the liquidity check.
    #[must_use]
    pub fn evaluate(&self, request: &RiskRequest, snapshot: &RiskSnapshot) -> RiskDecision {
        match self.run(request, snapshot) {
            Ok(()) => RiskDecision::Allow,
            Err(rejection) => RiskDecision::Reject(rejection),
        }
    }

    fn run(&self, request: &RiskRequest, snapshot: &RiskSnapshot) -> CheckResult {
        if request.is_entry() {
            Self::check_crisis_mode(snapshot)?;
            self.check_daily_loss(snapshot)?;
            self.check_max_positions(snapshot)?;
            Self::check_cooldown(request, snapshot)?;
            self.check_correlation(request, snapshot)?;
            self.check_portfolio_heat(request, snapshot)?;
        }
        self.check_liquidity(snapshot)
    }

    fn check_crisis_mode(snapshot: &RiskSnapshot) -> CheckResult {
        if let Some(halt) = &snapshot.guard.emergency {
            return Err(RiskRejection::new(
                RejectCode::EmergencyHalt,
                format!("Emergency mode active ({})", halt.reason),
            ));
        }
        if let Some(halt) = &snapshot.guard.safe_mode {
            return Err(RiskRejection::new(
                RejectCode::SafeMode,
                format!("Safe mode active ({}): new entries are blocked", halt.reason),
            ));
        }
        Ok(())
    }

    fn check_daily_loss(&self, snapshot: &RiskSnapshot) -> CheckResult {
        if snapshot.equity <= Decimal::ZERO {
            return Err(RiskRejection::new(
                RejectCode::InvalidEquity,
                format!("Equity {} is not positive", snapshot.equity),
            ));
        }

        let loss_fraction = snapshot.realized_pnl_today / snapshot.equity;
        let limit = -self.limits.daily_loss_limit;
        if loss_fraction <= limit {
            return Err(RiskRejection::new(
                RejectCode::DailyLossLimit,
                format!(
                    "Daily realized P&L {} is {}% of equity",
                    snapshot.realized_pnl_today,
                    (loss_fraction * Decimal::ONE_HUNDRED).round_dp(2)
                ),
            )
            .with_values(limit, loss_fraction.round_dp(6)));
        }
        Ok(())
    }

    fn check_max_positions(&self, snapshot: &RiskSnapshot) -> CheckResult {
        let open = snapshot.open_positions.len();
        if open >= self.limits.max_open_positions {
            return Err(RiskRejection::new(
                RejectCode::MaxOpenPositions,
                format!(
                    "{open} open positions, maximum is {}",
                    self.limits.max_open_positions
                ),
            )
            .with_values(
                Decimal::from(self.limits.max_open_positions),
                Decimal::from(open),
            ));
        }
        Ok(())
    }

    fn check_cooldown(request: &RiskRequest, snapshot: &RiskSnapshot) -> CheckResult {
        match snapshot.cooldown_until {
            Some(until) if until > snapshot.now => {
                let remaining = (until - snapshot.now).num_seconds();
                Err(RiskRejection::new(
                    RejectCode::SymbolCooldown,
                    format!(
                        "{} is cooling down for another {remaining}s",
                        request.symbol
                    ),
                ))
            }
            _ => Ok(()),
        }
    }

    fn check_correlation(&self, request: &RiskRequest, snapshot: &RiskSnapshot) -> CheckResult {
        let threshold = self.limits.correlation_threshold;
        for position in &snapshot.open_positions {
            let correlation = if position.symbol == request.symbol {
                1.0
            } else {
                match position.correlation {
                    Some(c) => c,
                    None => continue,
                }
            };

            if correlation.abs() >= threshold {
                let rejection = RiskRejection::new(
                    RejectCode::HighCorrelation,
                    format!(
                        "{} correlates {correlation:.2} with open position {}",
                        request.symbol, position.symbol
                    ),
                );
                return Err(
                    match (Decimal::from_f64(threshold), Decimal::from_f64(correlation)) {
                        (Some(t), Some(c)) => rejection.with_values(t, c.round_dp(4)),
                        _ => rejection,
                    },
                );
            }
        }
        Ok(())
    }

    fn check_portfolio_heat(&self, request: &RiskRequest, snapshot: &RiskSnapshot) -> CheckResult {
        let Some(stop) = request.stop_price else {
            return Err(RiskRejection::new(
                RejectCode::MissingStop,
                "Entries must carry a protective stop",
            ));
        };

        let entry = request.entry_price.or_else(|| {
            snapshot
                .quote
                .as_ref()
                .map(|q| request.side.touch(q.bid, q.ask))
        });
        let Some(entry) = entry else {
            return Err(RiskRejection::new(
                RejectCode::NoQuote,
                format!("No entry price or quote for {}", request.symbol),
            ));
        };

        let current: Decimal = snapshot.open_positions.iter().map(|p| p.open_risk).sum();
        let proposed = (entry - stop).abs() * request.quantity;
        let heat = (current + proposed) / snapshot.equity;
        let ceiling = self.limits.portfolio_heat_ceiling;

        if heat > ceiling {
            return Err(RiskRejection::new(
                RejectCode::PortfolioHeat,
                format!(
                    "Open risk {current} plus new risk {proposed} is {}% of equity {}",
                    (heat * Decimal::ONE_HUNDRED).round_dp(2),
                    snapshot.equity
                ),
            )
            .with_values(ceiling, heat.round_dp(6)));
        }
        Ok(())
    }

    fn check_liquidity(&self, snapshot: &RiskSnapshot) -> CheckResult {
        let Some(quote) = snapshot.quote.as_ref().filter(|q| q.is_two_sided()) else {
            return Err(RiskRejection::new(
                RejectCode::NoQuote,
                "Missing or non-positive bid/ask",
            ));
        };

        let Some(spread_pct) = quote.spread_pct().filter(|s| *s >= Decimal::ZERO) else {
            return Err(RiskRejection::new(
                RejectCode::NoQuote,
                format!("Crossed quote for {}", quote.symbol),
            ));
        };

        if spread_pct > self.limits.max_spread_pct {
            return Err(RiskRejection::new(
                RejectCode::WideSpread,
                format!("Spread {}% of mid on {}", spread_pct.round_dp(3), quote.symbol),
            )
            .with_values(self.limits.max_spread_pct, spread_pct.round_dp(4)));
        }
        Ok(())
    }
}
