//! Circuit Breaker Use Case
//!
//! Folds closed-trade results into per-user loss counters and trips the
//! system-wide entry halt when any user breaches a loss limit. The daily
//! reset clears the daily total and the streak, and lifts safe mode only
//! when a daily limit set it.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::application::ports::{AuditEvent, AuditSink, CapitalPort, Clock};
use crate::application::services::{SupervisorError, SystemGuardService};
use crate::domain::shared::UserId;
use crate::domain::supervision::{LimitBreach, LossCounterRepository, LossCounters, LossLimits};

/// Attempts before a contended counter update gives up.
const MAX_COUNTER_WRITE_ATTEMPTS: u32 = 8;

/// Outcome of a daily reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyResetSummary {
    /// Users whose counters were reset.
    pub users: usize,
    /// Whether a daily halt was lifted.
    pub halt_lifted: bool,
}

/// Entry-halt supervisor over realized losses.
pub struct CircuitBreakerUseCase {
    loss_repo: Arc<dyn LossCounterRepository>,
    capital: Arc<dyn CapitalPort>,
    guard: Arc<SystemGuardService>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    limits: LossLimits,
}

impl CircuitBreakerUseCase {
    /// Create the use case.
    pub fn new(
        loss_repo: Arc<dyn LossCounterRepository>,
        capital: Arc<dyn CapitalPort>,
        guard: Arc<SystemGuardService>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        limits: LossLimits,
    ) -> Self {
        Self {
            loss_repo,
            capital,
            guard,
            audit,
            clock,
            limits,
        }
    }

    /// Configured limits.
    #[must_use]
    pub const fn limits(&self) -> &LossLimits {
        &self.limits
    }

    /// Add one closed trade's P&L and check the user's limits.
    pub async fn record_trade_result(
        &self,
        user_id: &UserId,
        pnl: Decimal,
    ) -> Result<Option<LimitBreach>, SupervisorError> {
        let now = self.clock.now();
        let counters = self
            .update_counters(user_id, |counters| counters.record(pnl, now))
            .await?;

        info!(
            %user_id,
            %pnl,
            daily_pnl = %counters.daily_pnl,
            consecutive_losses = counters.consecutive_losses,
            "Trade result recorded"
        );
        self.check_user(user_id, &counters).await
    }

    /// Re-check every user's counters. Used by the periodic supervisor tick.
    pub async fn evaluate(&self) -> Result<Vec<(UserId, LimitBreach)>, SupervisorError> {
        let now = self.clock.now();
        let mut breaches = Vec::new();
        for user_id in self.loss_repo.users().await? {
            let Some(mut counters) = self.loss_repo.get(&user_id).await? else {
                continue;
            };
            counters.roll_over(now);
            if let Some(breach) = self.check_user(&user_id, &counters).await? {
                breaches.push((user_id, breach));
            }
        }
        Ok(breaches)
    }

    /// Clear daily totals and streaks, then lift a daily halt.
    pub async fn daily_reset(&self) -> Result<DailyResetSummary, SupervisorError> {
        let now = self.clock.now();
        let users = self.loss_repo.users().await?;
        for user_id in &users {
            self.update_counters(user_id, |counters| counters.reset_daily(now))
                .await?;
        }

        let halt_lifted = self.guard.clear_daily_halt().await?;
        info!(users = users.len(), halt_lifted, "Daily loss counters reset");
        self.audit
            .record_best_effort(
                AuditEvent::new(
                    "circuit_breaker",
                    "daily_reset",
                    format!("Daily reset for {} users", users.len()),
                    now,
                )
                .with_metadata(json!({ "users": users.len(), "halt_lifted": halt_lifted })),
            )
            .await;

        Ok(DailyResetSummary {
            users: users.len(),
            halt_lifted,
        })
    }

    /// Read-modify-write a user's counters against the stored version. A
    /// lost race re-reads and applies `change` to the fresh counters.
    async fn update_counters<F>(
        &self,
        user_id: &UserId,
        change: F,
    ) -> Result<LossCounters, SupervisorError>
    where
        F: Fn(&mut LossCounters) + Send + Sync,
    {
        for _ in 0..MAX_COUNTER_WRITE_ATTEMPTS {
            let mut counters = self
                .loss_repo
                .get(user_id)
                .await?
                .unwrap_or_else(|| LossCounters::new(self.clock.now()));
            let expected = counters.version;
            change(&mut counters);
            match self.loss_repo.store(user_id, &counters, expected).await {
                Ok(()) => return Ok(counters),
                Err(e) if e.is_conflict() => {
                    debug!(%user_id, expected_version = expected, "Loss counter write lost a race, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(SupervisorError::Contended {
            what: "Loss counter",
            attempts: MAX_COUNTER_WRITE_ATTEMPTS,
        })
    }

    async fn check_user(
        &self,
        user_id: &UserId,
        counters: &LossCounters,
    ) -> Result<Option<LimitBreach>, SupervisorError> {
        let starting_capital = self.capital.starting_capital(user_id).await?;
        let Some(breach) = self.limits.evaluate(counters, starting_capital) else {
            return Ok(None);
        };

        let detail = format!("{user_id}: {}", breach.describe());
        if self.guard.enter_safe_mode(breach.reason, detail.clone()).await? {
            warn!(%user_id, reason = %breach.reason, %detail, "Loss limit breached, entries halted");
            self.audit
                .record_best_effort(
                    AuditEvent::new("circuit_breaker", "limit_breached", detail, self.clock.now())
                        .for_user(user_id.clone())
                        .with_metadata(json!({
                            "reason": breach.reason.code(),
                            "current_value": breach.current_value,
                            "threshold": breach.threshold,
                        })),
                )
                .await;
        }
        Ok(Some(breach))
    }
}
