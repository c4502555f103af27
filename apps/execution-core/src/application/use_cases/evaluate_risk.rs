//! Evaluate Risk Use Case
//!
//! Assembles a point-in-time [`RiskSnapshot`] from the guard, capital,
//! open trades, cooldowns and the current quote, then runs the risk gate
//! over it. The gate never reads live state itself.

use std::sync::Arc;

use chrono::Duration;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::ports::{BrokerPort, CapitalPort, Clock, CorrelationPort, PortError};
use crate::application::services::CooldownTracker;
use crate::domain::order_execution::Quote;
use crate::domain::risk_management::{
    OpenExposure, RiskDecision, RiskGate, RiskRequest, RiskSnapshot,
};
use crate::domain::shared::RepositoryError;
use crate::domain::supervision::{LossCounterRepository, SystemGuardRepository};
use crate::domain::trade_lifecycle::TradeRepository;
use crate::observability::{record_broker_failure, record_order_rejection};

/// Errors gathering risk inputs.
#[derive(Debug, Error)]
pub enum RiskEvaluationError {
    /// Storage failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Capital or account lookup failure.
    #[error(transparent)]
    Port(#[from] PortError),
}

/// Gate decision plus the quote it was made against.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskAssessment {
    /// Allow or reject.
    pub decision: RiskDecision,
    /// Quote used for the liquidity check, reused for pricing.
    pub quote: Option<Quote>,
}

/// Use case for pre-trade risk evaluation.
pub struct EvaluateRiskUseCase {
    gate: RiskGate,
    guard_repo: Arc<dyn SystemGuardRepository>,
    loss_repo: Arc<dyn LossCounterRepository>,
    trade_repo: Arc<dyn TradeRepository>,
    capital: Arc<dyn CapitalPort>,
    correlations: Arc<dyn CorrelationPort>,
    cooldowns: Arc<CooldownTracker>,
    broker: Arc<dyn BrokerPort>,
    clock: Arc<dyn Clock>,
}

impl EvaluateRiskUseCase {
    /// Create the use case.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gate: RiskGate,
        guard_repo: Arc<dyn SystemGuardRepository>,
        loss_repo: Arc<dyn LossCounterRepository>,
        trade_repo: Arc<dyn TradeRepository>,
        capital: Arc<dyn CapitalPort>,
        correlations: Arc<dyn CorrelationPort>,
        cooldowns: Arc<CooldownTracker>,
        broker: Arc<dyn BrokerPort>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gate,
            guard_repo,
            loss_repo,
            trade_repo,
            capital,
            correlations,
            cooldowns,
            broker,
            clock,
        }
    }

    /// Evaluate a request. No state is mutated, so repeated calls are safe.
    pub async fn execute(&self, request: &RiskRequest) -> Result<RiskAssessment, RiskEvaluationError> {
        let snapshot = self.snapshot(request).await?;
        let decision = self.gate.evaluate(request, &snapshot);

        if let RiskDecision::Reject(rejection) = &decision {
            record_order_rejection(rejection.code.as_str());
            warn!(
                user_id = %request.user_id,
                symbol = %request.symbol,
                code = rejection.code.as_str(),
                message = %rejection.message,
                "Risk gate rejected order"
            );
        } else {
            debug!(user_id = %request.user_id, symbol = %request.symbol, "Risk gate allowed order");
        }

        Ok(RiskAssessment {
            decision,
            quote: snapshot.quote,
        })
    }

    /// Gather the snapshot a request is judged against. Exits only need the
    /// guard and the quote.
    pub async fn snapshot(&self, request: &RiskRequest) -> Result<RiskSnapshot, RiskEvaluationError> {
        let now = self.clock.now();
        let guard = self.guard_repo.load().await?;
        let quote = self.fetch_quote(request).await;

        if !request.is_entry() {
            return Ok(RiskSnapshot {
                guard,
                equity: Decimal::ZERO,
                realized_pnl_today: Decimal::ZERO,
                open_positions: Vec::new(),
                cooldown_until: None,
                quote,
                now,
            });
        }

        let equity = self.capital.equity(&request.user_id).await?;
        let realized_pnl_today = self
            .loss_repo
            .get(&request.user_id)
            .await?
            .map_or(Decimal::ZERO, |c| c.daily_pnl);

        let trades = self.trade_repo.find_open_for_user(&request.user_id).await?;
        let mut open_positions = Vec::with_capacity(trades.len());
        for trade in &trades {
            let correlation = if trade.symbol() == &request.symbol {
                Some(1.0)
            } else {
                self.correlations
                    .correlation(&request.symbol, trade.symbol())
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "Correlation lookup failed, skipping pair");
                        None
                    })
            };
            open_positions.push(OpenExposure {
                trade_id: trade.id().clone(),
                symbol: trade.symbol().clone(),
                open_risk: trade.open_risk(),
                correlation,
            });
        }

        let window = Duration::minutes(self.gate.limits().cooldown_minutes);
        let cooldown_until =
            self.cooldowns
                .cooldown_until(&request.user_id, &request.symbol, window, now);

        Ok(RiskSnapshot {
            guard,
            equity,
            realized_pnl_today,
            open_positions,
            cooldown_until,
            quote,
            now,
        })
    }

    async fn fetch_quote(&self, request: &RiskRequest) -> Option<Quote> {
        match self.broker.get_quote(&request.symbol).await {
            Ok(quote) => Some(quote),
            Err(e) => {
                record_broker_failure("get_quote", e.kind());
                warn!(symbol = %request.symbol, error = %e, "Quote unavailable for risk check");
                None
            }
        }
    }
}
