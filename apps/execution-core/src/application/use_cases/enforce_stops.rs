//! Enforce Stops Use Case
//!
//! Every position must have a broker-acknowledged protective stop within
//! the acknowledgement timeout. A sweep first asks the broker about pending
//! live stops; any trade still unprotected past the timeout is moved to
//! `error`, flattened at market and escalated to safe mode, or to a global
//! panic when the failure mode says so.
//!
//! A filled flatten is the trade's exit: the trade stays in `error` with the
//! fill and P&L recorded, for an operator to review. A flatten that fails or
//! does not confirm a fill hands the trade to the exit retry coordinator,
//! seeded with the flatten order so a late fill settles the trade and a
//! still-working flatten is cancelled before any further exit is sent.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::execute_order::{ExecuteOrderCommand, ExecuteOrderUseCase};
use super::exit_retry::ExitRetryCoordinator;
use super::trade_lifecycle::{TradeLifecycleError, TradeLifecycleUseCase};
use crate::application::ports::{
    AuditEvent, AuditSink, Clock, EscalationPort, Notification, NotificationKind,
    NotificationPort, PanicRequest,
};
use crate::application::services::SystemGuardService;
use crate::domain::order_execution::{OrderPurpose, TradingMode};
use crate::domain::shared::{ClientOrderId, RepositoryError};
use crate::domain::supervision::{FailureMode, HaltReason};
use crate::domain::trade_lifecycle::{ExitReason, PositionState, Trade, TradeRepository};
use crate::observability::{record_emergency_flatten, record_stop_loss_failure};

/// Stop enforcement settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopEnforcementPolicy {
    /// How long an opening trade may wait for its stop acknowledgement.
    pub ack_timeout: Duration,
    /// What a protection failure escalates to.
    pub failure_mode: FailureMode,
}

impl Default for StopEnforcementPolicy {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(30),
            failure_mode: FailureMode::Safe,
        }
    }
}

/// Stop enforcement errors.
#[derive(Debug, Error)]
pub enum StopEnforcementError {
    /// Storage failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Trade update failed.
    #[error(transparent)]
    Lifecycle(#[from] TradeLifecycleError),
}

/// Tally of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnforcementSummary {
    /// Opening trades examined.
    pub checked: usize,
    /// Stops confirmed by the broker this sweep.
    pub confirmed: usize,
    /// Trades escalated for missing protection.
    pub escalated: usize,
    /// Flattens that filled.
    pub flattened: usize,
    /// Trades handed to the exit retry coordinator.
    pub queued_for_exit: usize,
    /// Trades that errored.
    pub errors: usize,
}

/// The stop-loss enforcer.
pub struct EnforceStopsUseCase {
    trades: Arc<dyn TradeRepository>,
    lifecycle: Arc<TradeLifecycleUseCase>,
    engine: Arc<ExecuteOrderUseCase>,
    exits: Arc<ExitRetryCoordinator>,
    guard: Arc<SystemGuardService>,
    escalation: Arc<dyn EscalationPort>,
    notifier: Arc<dyn NotificationPort>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    policy: StopEnforcementPolicy,
}

enum Enforced {
    Skipped,
    Flattened,
    Queued,
}

impl EnforceStopsUseCase {
    /// Create the use case.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        trades: Arc<dyn TradeRepository>,
        lifecycle: Arc<TradeLifecycleUseCase>,
        engine: Arc<ExecuteOrderUseCase>,
        exits: Arc<ExitRetryCoordinator>,
        guard: Arc<SystemGuardService>,
        escalation: Arc<dyn EscalationPort>,
        notifier: Arc<dyn NotificationPort>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        policy: StopEnforcementPolicy,
    ) -> Self {
        Self {
            trades,
            lifecycle,
            engine,
            exits,
            guard,
            escalation,
            notifier,
            audit,
            clock,
            policy,
        }
    }

    /// Check every opening trade once.
    pub async fn sweep(&self) -> Result<EnforcementSummary, StopEnforcementError> {
        let opening = self.trades.find_by_state(PositionState::Opening).await?;
        let mut summary = EnforcementSummary {
            checked: opening.len(),
            ..EnforcementSummary::default()
        };
        if opening.is_empty() {
            return Ok(summary);
        }

        let timeout = chrono::Duration::from_std(self.policy.ack_timeout)
            .unwrap_or(chrono::Duration::MAX);

        for trade in opening {
            match self.lifecycle.confirm_stop(&trade).await {
                Ok(true) => {
                    summary.confirmed += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(trade_id = %trade.id(), error = %e, "Stop confirmation failed");
                }
            }

            if !trade.stop_ack_overdue(self.clock.now(), timeout) {
                continue;
            }

            match self.enforce(trade).await {
                Ok(Enforced::Skipped) => {}
                Ok(Enforced::Flattened) => {
                    summary.escalated += 1;
                    summary.flattened += 1;
                }
                Ok(Enforced::Queued) => {
                    summary.escalated += 1;
                    summary.queued_for_exit += 1;
                }
                Err(e) => {
                    summary.errors += 1;
                    error!(error = %e, "Stop enforcement failed for trade");
                }
            }
        }

        if summary.escalated > 0 || summary.errors > 0 {
            warn!(
                checked = summary.checked,
                escalated = summary.escalated,
                flattened = summary.flattened,
                queued = summary.queued_for_exit,
                errors = summary.errors,
                "Stop enforcement sweep escalated trades"
            );
        } else {
            debug!(checked = summary.checked, confirmed = summary.confirmed, "Stop sweep clean");
        }
        Ok(summary)
    }

    async fn enforce(&self, mut trade: Trade) -> Result<Enforced, StopEnforcementError> {
        let detail = format!(
            "trade {} ({} {}) has no acknowledged stop after {}s",
            trade.id(),
            trade.symbol(),
            trade.quantity(),
            self.policy.ack_timeout.as_secs()
        );
        if !self.lifecycle.mark_error(&mut trade, &detail).await? {
            debug!(trade_id = %trade.id(), "Trade moved before enforcement, skipping");
            return Ok(Enforced::Skipped);
        }

        record_stop_loss_failure();
        error!(
            trade_id = %trade.id(),
            user_id = %trade.user_id(),
            symbol = %trade.symbol(),
            failure_mode = %self.policy.failure_mode,
            "Protective stop not acknowledged, flattening"
        );

        self.lifecycle.cancel_stop(&trade).await;
        let client_order_id = ClientOrderId::new(format!("flatten-{}", trade.id()));
        let fill_price = self.flatten(&trade, &client_order_id).await;
        let recorded = self
            .lifecycle
            .record_flatten(&mut trade, &client_order_id, fill_price)
            .await;

        let enforced = if fill_price.is_some() {
            record_emergency_flatten("stop_enforcer");
            Enforced::Flattened
        } else {
            self.hand_off(&trade, client_order_id).await;
            Enforced::Queued
        };
        self.escalate(&trade, &detail).await;
        recorded?;
        Ok(enforced)
    }

    /// Market-flatten the position. Returns the fill price, or `None` when
    /// the order failed or no fill was confirmed.
    async fn flatten(&self, trade: &Trade, client_order_id: &ClientOrderId) -> Option<Decimal> {
        let mode = if trade.is_paper() {
            TradingMode::Paper
        } else {
            TradingMode::Live
        };
        let command = ExecuteOrderCommand::market(
            trade.user_id().clone(),
            trade.symbol().clone(),
            trade.exit_side(),
            trade.quantity(),
            OrderPurpose::Flatten,
            mode,
        )
        .with_client_order_id(client_order_id.clone())
        .with_trade(trade.id().clone());

        match self.engine.execute(command).await {
            Ok(report) if report.is_filled() && report.avg_price.is_some() => report.avg_price,
            Ok(report) => {
                warn!(
                    trade_id = %trade.id(),
                    status = %report.status,
                    reason = ?report.rejection_reason,
                    "Flatten did not confirm a fill"
                );
                None
            }
            Err(e) => {
                error!(trade_id = %trade.id(), error = %e, "Flatten attempt failed");
                None
            }
        }
    }

    /// Queue the exit behind the flatten order, so the coordinator settles
    /// or cancels that order before selling again.
    async fn hand_off(&self, trade: &Trade, flatten_order_id: ClientOrderId) {
        match self
            .exits
            .enqueue_after(
                trade.id(),
                ExitReason::StopProtectionFailure,
                Some(flatten_order_id),
            )
            .await
        {
            Ok(report) => {
                info!(trade_id = %trade.id(), request_id = %report.request.id(), "Unflattened trade handed to exit retry");
            }
            Err(e) => {
                error!(trade_id = %trade.id(), error = %e, "Failed to queue exit after stop failure");
            }
        }
    }

    async fn escalate(&self, trade: &Trade, detail: &str) {
        let now = self.clock.now();
        match self.policy.failure_mode {
            FailureMode::Safe => {
                if let Err(e) = self
                    .guard
                    .enter_safe_mode(HaltReason::StopLossFailure, detail)
                    .await
                {
                    error!(trade_id = %trade.id(), error = %e, "Failed to enter safe mode");
                }
            }
            FailureMode::Panic => {
                let request = PanicRequest {
                    reason: HaltReason::StopLossFailure,
                    detail: detail.to_string(),
                    requested_at: now,
                };
                if let Err(e) = self.escalation.request_panic(request).await {
                    error!(trade_id = %trade.id(), error = %e, "Failed to request panic");
                }
            }
        }

        let payload = json!({
            "trade_id": trade.id(),
            "symbol": trade.symbol(),
            "failure_mode": self.policy.failure_mode,
            "flatten_price": trade.exit_price(),
        });
        self.audit
            .record_best_effort(
                AuditEvent::new("stop_enforcer", "stop_failure", detail, now)
                    .for_user(trade.user_id().clone())
                    .with_metadata(payload.clone()),
            )
            .await;
        self.notifier
            .publish_best_effort(
                Notification::new(
                    NotificationKind::Alert,
                    format!("Protective stop missing for {}, flattening position", trade.symbol()),
                    now,
                )
                .for_user(trade.user_id().clone())
                .with_payload(payload),
            )
            .await;
    }
}
