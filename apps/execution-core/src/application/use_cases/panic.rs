//! Emergency Panic Use Case
//!
//! The global halt. Sets emergency mode, then for every user cancels all
//! open broker orders (best-effort) and queues every trade with exposure
//! for exit, and finally revokes all stored broker credentials. Exits are
//! queued before revocation so their first attempt can still reach the
//! broker. A panic while emergency mode is already on only records the
//! request.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};

use super::exit_retry::{AttemptReport, ExitRetryCoordinator};
use crate::application::ports::{
    AuditEvent, AuditSink, BrokerPort, Clock, CredentialStore, Notification, NotificationKind,
    NotificationPort, PanicRequest, PortError,
};
use crate::application::services::{SupervisorError, SystemGuardService};
use crate::domain::shared::{RepositoryError, UserId};
use crate::domain::trade_lifecycle::{ExitReason, PositionState, Trade, TradeRepository};
use crate::observability::{record_broker_failure, record_emergency_flatten};

/// States a trade can be in while it may still hold a position.
const EXPOSED_STATES: [PositionState; 4] = [
    PositionState::Opening,
    PositionState::Open,
    PositionState::Closing,
    PositionState::Error,
];

/// Panic errors that abort the run before any order is touched.
#[derive(Debug, Error)]
pub enum PanicError {
    /// Emergency flag could not be set.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// Users could not be listed.
    #[error(transparent)]
    Port(#[from] PortError),

    /// Trades could not be listed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// What a panic run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanicReport {
    /// Emergency mode was already on; nothing was re-run.
    pub already_active: bool,
    /// Users processed.
    pub users: usize,
    /// Broker orders cancelled.
    pub orders_cancelled: usize,
    /// Trades queued for exit.
    pub exits_queued: usize,
    /// Exits that filled on their first attempt.
    pub exits_filled: usize,
    /// Credentials revoked.
    pub credentials_revoked: usize,
    /// Individual failures, logged and skipped.
    pub errors: Vec<String>,
    /// When the panic started.
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct UserFlatten {
    orders_cancelled: usize,
    exits_queued: usize,
    exits_filled: usize,
    errors: Vec<String>,
}

/// The global emergency flatten.
pub struct PanicUseCase {
    guard: Arc<SystemGuardService>,
    broker: Arc<dyn BrokerPort>,
    credentials: Arc<dyn CredentialStore>,
    trades: Arc<dyn TradeRepository>,
    exits: Arc<ExitRetryCoordinator>,
    notifier: Arc<dyn NotificationPort>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl PanicUseCase {
    /// Create the use case.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        guard: Arc<SystemGuardService>,
        broker: Arc<dyn BrokerPort>,
        credentials: Arc<dyn CredentialStore>,
        trades: Arc<dyn TradeRepository>,
        exits: Arc<ExitRetryCoordinator>,
        notifier: Arc<dyn NotificationPort>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            guard,
            broker,
            credentials,
            trades,
            exits,
            notifier,
            audit,
            clock,
        }
    }

    /// Run the panic.
    pub async fn execute(&self, request: PanicRequest) -> Result<PanicReport, PanicError> {
        let started_at = self.clock.now();
        let newly_set = self
            .guard
            .enter_emergency(request.reason, request.detail.clone())
            .await?;

        if !newly_set {
            info!(reason = %request.reason, detail = %request.detail, "Panic requested while emergency mode is active");
            self.audit
                .record_best_effort(
                    AuditEvent::new(
                        "panic",
                        "already_active",
                        format!("Panic ignored, emergency already active: {}", request.detail),
                        started_at,
                    )
                    .with_metadata(json!({ "reason": request.reason.code() })),
                )
                .await;
            return Ok(PanicReport {
                already_active: true,
                started_at: Some(started_at),
                ..PanicReport::default()
            });
        }

        error!(reason = %request.reason, detail = %request.detail, "PANIC: flattening all users");

        let mut exposed: Vec<Trade> = Vec::new();
        for state in EXPOSED_STATES {
            exposed.extend(
                self.trades
                    .find_by_state(state)
                    .await?
                    .into_iter()
                    .filter(Trade::holds_position),
            );
        }
        let mut users: BTreeSet<UserId> = self.credentials.active_users().await?.into_iter().collect();
        users.extend(exposed.iter().map(|t| t.user_id().clone()));

        let flattens = join_all(users.iter().map(|user_id| {
            let trades: Vec<&Trade> = exposed.iter().filter(|t| t.user_id() == user_id).collect();
            self.flatten_user(user_id, trades)
        }))
        .await;

        let mut report = PanicReport {
            users: users.len(),
            started_at: Some(started_at),
            ..PanicReport::default()
        };
        for flatten in flattens {
            report.orders_cancelled += flatten.orders_cancelled;
            report.exits_queued += flatten.exits_queued;
            report.exits_filled += flatten.exits_filled;
            report.errors.extend(flatten.errors);
        }

        match self.credentials.revoke_all().await {
            Ok(n) => report.credentials_revoked = n,
            Err(e) => {
                error!(error = %e, "Credential revocation failed during panic");
                report.errors.push(format!("credential revocation failed: {e}"));
            }
        }

        record_emergency_flatten("panic");
        warn!(
            users = report.users,
            orders_cancelled = report.orders_cancelled,
            exits_queued = report.exits_queued,
            exits_filled = report.exits_filled,
            credentials_revoked = report.credentials_revoked,
            errors = report.errors.len(),
            "Panic complete"
        );
        self.publish(&request, &report).await;
        Ok(report)
    }

    async fn flatten_user(&self, user_id: &UserId, trades: Vec<&Trade>) -> UserFlatten {
        let mut out = UserFlatten::default();

        match self.broker.open_orders(user_id).await {
            Ok(orders) => {
                for order in orders {
                    match self.broker.cancel_order(user_id, &order.broker_order_id).await {
                        Ok(()) => out.orders_cancelled += 1,
                        Err(e) => {
                            record_broker_failure("cancel_order", e.kind());
                            warn!(%user_id, broker_order_id = %order.broker_order_id, error = %e, "Panic cancel failed");
                            out.errors.push(format!(
                                "{user_id}: cancel {} failed: {e}",
                                order.broker_order_id
                            ));
                        }
                    }
                }
            }
            Err(e) => {
                record_broker_failure("open_orders", e.kind());
                warn!(%user_id, error = %e, "Panic could not list open orders");
                out.errors.push(format!("{user_id}: open orders unavailable: {e}"));
            }
        }

        for trade in trades {
            match self.exits.enqueue(trade.id(), ExitReason::Panic).await {
                Ok(enqueued) => {
                    out.exits_queued += 1;
                    if matches!(
                        enqueued.attempt,
                        Some(AttemptReport::Filled { .. } | AttemptReport::AlreadyClosed)
                    ) {
                        out.exits_filled += 1;
                    }
                }
                Err(e) => {
                    error!(trade_id = %trade.id(), error = %e, "Panic could not queue exit");
                    out.errors.push(format!("{}: exit not queued: {e}", trade.id()));
                }
            }
        }
        out
    }

    async fn publish(&self, request: &PanicRequest, report: &PanicReport) {
        let now = self.clock.now();
        let payload = json!({
            "reason": request.reason.code(),
            "detail": request.detail,
            "users": report.users,
            "orders_cancelled": report.orders_cancelled,
            "exits_queued": report.exits_queued,
            "credentials_revoked": report.credentials_revoked,
            "errors": report.errors,
        });
        let message = format!(
            "PANIC ({}): {} exits queued, {} orders cancelled, credentials revoked",
            request.reason, report.exits_queued, report.orders_cancelled
        );
        self.audit
            .record_best_effort(
                AuditEvent::new("panic", "executed", message.clone(), now)
                    .with_metadata(payload.clone()),
            )
            .await;
        self.notifier
            .publish_best_effort(
                Notification::new(NotificationKind::Alert, message, now).with_payload(payload),
            )
            .await;
    }
}
