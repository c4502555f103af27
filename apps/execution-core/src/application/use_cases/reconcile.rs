//! Reconcile Use Case
//!
//! Diffs what the broker reports against local records for every user with
//! live credentials:
//!
//! - **ghost**: broker order with no local intent; a minimal `unknown`
//!   intent is created so it is tracked from now on.
//! - **zombie**: local working intent the broker no longer knows; moved to
//!   `unknown` with a note instead of being assumed filled or cancelled.
//! - **orphan**: broker position with no local open trade; flagged only,
//!   since closing on a possibly stale read is unsafe.
//! - **missing position**: local open trade with no broker position.
//!
//! Per-user failures are collected, never abort the run.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::ports::{
    AuditEvent, AuditSink, BrokerError, BrokerOrder, BrokerPort, Clock, CredentialStore,
    Notification, NotificationKind, NotificationPort, PortError,
};
use crate::application::services::{SupervisorError, SystemGuardService};
use crate::domain::order_execution::{
    OrderError, OrderIntent, OrderIntentRepository, OrderStateMachine, OrderStatus, TradingMode,
};
use crate::domain::shared::{
    BrokerOrderId, ClientOrderId, RepositoryError, Symbol, TradeId, TransitionContext, UserId,
};
use crate::domain::supervision::HaltReason;
use crate::domain::trade_lifecycle::{PositionState, TradeRepository};
use crate::observability::{record_broker_failure, record_reconciliation_mismatch};

/// Reconciliation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationPolicy {
    /// Trip safe mode when any mismatch is found.
    pub safe_mode_on_mismatch: bool,
}

impl Default for ReconciliationPolicy {
    fn default() -> Self {
        Self {
            safe_mode_on_mismatch: true,
        }
    }
}

/// Errors that stop a whole run.
#[derive(Debug, Error)]
pub enum ReconciliationError {
    /// Users could not be listed.
    #[error(transparent)]
    Port(#[from] PortError),

    /// Guard bookkeeping failed.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Kind of disagreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// Broker order unknown locally.
    Ghost,
    /// Local working order unknown to the broker.
    Zombie,
    /// Broker position without a local trade.
    Orphan,
    /// Local open trade without a broker position.
    MissingPosition,
}

impl MismatchKind {
    /// Stable name used in metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ghost => "ghost",
            Self::Zombie => "zombie",
            Self::Orphan => "orphan",
            Self::MissingPosition => "missing_position",
        }
    }

    const ALL: [Self; 4] = [Self::Ghost, Self::Zombie, Self::Orphan, Self::MissingPosition];
}

/// One finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    /// Kind.
    pub kind: MismatchKind,
    /// User it belongs to.
    pub user_id: UserId,
    /// Symbol involved.
    pub symbol: Symbol,
    /// Broker order, for order mismatches.
    pub broker_order_id: Option<BrokerOrderId>,
    /// Local intent, for order mismatches.
    pub client_order_id: Option<ClientOrderId>,
    /// Local trade, for position mismatches.
    pub trade_id: Option<TradeId>,
    /// Human-readable detail.
    pub detail: String,
}

/// Result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    /// Users checked.
    pub users_checked: usize,
    /// Every finding.
    pub mismatches: Vec<Mismatch>,
    /// Zombie candidates the broker resolved after all.
    pub late_resolutions: usize,
    /// Per-user failures.
    pub errors: Vec<String>,
    /// Whether this run engaged safe mode.
    pub safe_mode_engaged: bool,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
}

impl ReconciliationReport {
    /// Number of findings of `kind`.
    #[must_use]
    pub fn count(&self, kind: MismatchKind) -> usize {
        self.mismatches.iter().filter(|m| m.kind == kind).count()
    }

    /// No findings and no errors.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty() && self.errors.is_empty()
    }

    fn summary(&self) -> String {
        MismatchKind::ALL
            .iter()
            .filter_map(|kind| {
                let n = self.count(*kind);
                (n > 0).then(|| format!("{} {}", n, kind.as_str()))
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Default)]
struct UserOutcome {
    mismatches: Vec<Mismatch>,
    late_resolutions: usize,
    errors: Vec<String>,
}

/// Use case for reconciling local state against the broker.
pub struct ReconcileUseCase {
    credentials: Arc<dyn CredentialStore>,
    broker: Arc<dyn BrokerPort>,
    orders: Arc<dyn OrderIntentRepository>,
    trades: Arc<dyn TradeRepository>,
    guard: Arc<SystemGuardService>,
    notifier: Arc<dyn NotificationPort>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    policy: ReconciliationPolicy,
}

impl ReconcileUseCase {
    /// Create the use case.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        broker: Arc<dyn BrokerPort>,
        orders: Arc<dyn OrderIntentRepository>,
        trades: Arc<dyn TradeRepository>,
        guard: Arc<SystemGuardService>,
        notifier: Arc<dyn NotificationPort>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        policy: ReconciliationPolicy,
    ) -> Self {
        Self {
            credentials,
            broker,
            orders,
            trades,
            guard,
            notifier,
            audit,
            clock,
            policy,
        }
    }

    /// Reconcile every user with live credentials.
    pub async fn execute(&self) -> Result<ReconciliationReport, ReconciliationError> {
        let users = self.credentials.active_users().await?;
        let outcomes = join_all(users.iter().map(|user| self.reconcile_user(user))).await;

        let mut report = ReconciliationReport {
            users_checked: users.len(),
            mismatches: Vec::new(),
            late_resolutions: 0,
            errors: Vec::new(),
            safe_mode_engaged: false,
            finished_at: self.clock.now(),
        };
        for outcome in outcomes {
            report.mismatches.extend(outcome.mismatches);
            report.late_resolutions += outcome.late_resolutions;
            report.errors.extend(outcome.errors);
        }

        if report.mismatches.is_empty() {
            self.guard.record_reconciliation(None).await?;
            info!(
                users = report.users_checked,
                late_resolutions = report.late_resolutions,
                errors = report.errors.len(),
                "Reconciliation clean"
            );
            return Ok(report);
        }

        let summary = report.summary();
        for kind in MismatchKind::ALL {
            let n = report.count(kind);
            if n > 0 {
                record_reconciliation_mismatch(kind.as_str(), n);
            }
        }
        warn!(
            users = report.users_checked,
            mismatches = report.mismatches.len(),
            %summary,
            "Reconciliation found mismatches"
        );

        self.guard.record_reconciliation(Some(summary.clone())).await?;
        self.publish(&report, &summary).await;

        if self.policy.safe_mode_on_mismatch {
            report.safe_mode_engaged = self
                .guard
                .enter_safe_mode(HaltReason::ReconciliationMismatch, summary)
                .await?;
        }
        Ok(report)
    }

    async fn reconcile_user(&self, user_id: &UserId) -> UserOutcome {
        let mut outcome = UserOutcome::default();

        let broker_orders = match self.broker.open_orders(user_id).await {
            Ok(orders) => orders,
            Err(e) => {
                record_broker_failure("open_orders", e.kind());
                outcome.errors.push(format!("{user_id}: failed to load broker orders: {e}"));
                return outcome;
            }
        };
        let broker_positions = match self.broker.open_positions(user_id).await {
            Ok(positions) => positions,
            Err(e) => {
                record_broker_failure("open_positions", e.kind());
                outcome.errors.push(format!("{user_id}: failed to load broker positions: {e}"));
                return outcome;
            }
        };
        let local_orders: Vec<OrderIntent> = match self.orders.find_open_for_user(user_id).await {
            Ok(orders) => orders.into_iter().filter(|o| o.mode() == TradingMode::Live).collect(),
            Err(e) => {
                outcome.errors.push(format!("{user_id}: failed to load local orders: {e}"));
                return outcome;
            }
        };
        let local_trades = match self.trades.find_open_for_user(user_id).await {
            Ok(trades) => trades.into_iter().filter(|t| !t.is_paper()).collect::<Vec<_>>(),
            Err(e) => {
                outcome.errors.push(format!("{user_id}: failed to load local trades: {e}"));
                return outcome;
            }
        };

        debug!(
            %user_id,
            broker_orders = broker_orders.len(),
            broker_positions = broker_positions.len(),
            local_orders = local_orders.len(),
            local_trades = local_trades.len(),
            "Reconciling user"
        );

        let local_broker_ids: HashSet<&BrokerOrderId> = local_orders
            .iter()
            .filter_map(|o| o.broker_order_id())
            .collect();
        for order in &broker_orders {
            if !local_broker_ids.contains(&order.broker_order_id) {
                self.check_ghost(user_id, order, &mut outcome).await;
            }
        }

        let broker_ids: HashSet<&BrokerOrderId> =
            broker_orders.iter().map(|o| &o.broker_order_id).collect();
        for intent in local_orders {
            let Some(broker_id) = intent.broker_order_id().cloned() else {
                continue;
            };
            if intent.status().is_working() && !broker_ids.contains(&broker_id) {
                self.check_zombie(intent, broker_id, &mut outcome).await;
            }
        }

        let traded: HashSet<&Symbol> = local_trades.iter().map(|t| t.symbol()).collect();
        for position in &broker_positions {
            if position.quantity != Decimal::ZERO && !traded.contains(&position.symbol) {
                outcome.mismatches.push(Mismatch {
                    kind: MismatchKind::Orphan,
                    user_id: user_id.clone(),
                    symbol: position.symbol.clone(),
                    broker_order_id: None,
                    client_order_id: None,
                    trade_id: None,
                    detail: format!(
                        "broker holds {} {} with no local trade",
                        position.quantity, position.symbol
                    ),
                });
            }
        }

        let held: HashSet<&Symbol> = broker_positions
            .iter()
            .filter(|p| p.quantity != Decimal::ZERO)
            .map(|p| &p.symbol)
            .collect();
        for trade in local_trades
            .iter()
            .filter(|t| t.state() == PositionState::Open)
        {
            if !held.contains(trade.symbol()) {
                outcome.mismatches.push(Mismatch {
                    kind: MismatchKind::MissingPosition,
                    user_id: user_id.clone(),
                    symbol: trade.symbol().clone(),
                    broker_order_id: None,
                    client_order_id: None,
                    trade_id: Some(trade.id().clone()),
                    detail: format!("trade {} is open but the broker reports no position", trade.id()),
                });
            }
        }

        outcome
    }

    async fn check_ghost(&self, user_id: &UserId, order: &BrokerOrder, outcome: &mut UserOutcome) {
        match self.orders.find_by_broker_id(&order.broker_order_id).await {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(e) => {
                outcome.errors.push(format!("{user_id}: ghost lookup failed: {e}"));
                return;
            }
        }

        let mut ghost = OrderIntent::ghost(
            user_id.clone(),
            order.broker_order_id.clone(),
            order.symbol.clone(),
            order.side,
            order.quantity,
            order.raw_status.clone(),
            self.clock.now(),
        );
        let record = match ghost.transition(
            OrderStatus::Unknown,
            &TransitionContext::new("GHOST_ORDER").with_detail("broker order with no local record"),
            self.clock.now(),
        ) {
            Ok(record) => record,
            Err(e) => {
                outcome.errors.push(format!("{user_id}: ghost intent refused: {e}"));
                return;
            }
        };

        match self.orders.insert_with_history(&ghost, &[record]).await {
            Ok(()) => {
                warn!(
                    %user_id,
                    broker_order_id = %order.broker_order_id,
                    symbol = %order.symbol,
                    "Ghost order found, now tracked as unknown"
                );
                outcome.mismatches.push(Mismatch {
                    kind: MismatchKind::Ghost,
                    user_id: user_id.clone(),
                    symbol: order.symbol.clone(),
                    broker_order_id: Some(order.broker_order_id.clone()),
                    client_order_id: Some(ghost.client_order_id().clone()),
                    trade_id: None,
                    detail: format!(
                        "broker order {} ({} {} {}) has no local record",
                        order.broker_order_id, order.side, order.quantity, order.symbol
                    ),
                });
            }
            Err(RepositoryError::Duplicate { .. }) => {
                debug!(broker_order_id = %order.broker_order_id, "Ghost already tracked");
            }
            Err(e) => outcome.errors.push(format!("{user_id}: ghost insert failed: {e}")),
        }
    }

    /// A working intent missing from the broker's open orders either reached
    /// a final status there (applied here) or is gone (zombie).
    async fn check_zombie(
        &self,
        mut intent: OrderIntent,
        broker_id: BrokerOrderId,
        outcome: &mut UserOutcome,
    ) {
        let now = self.clock.now();
        let lookup = self.broker.get_order_status(intent.user_id(), &broker_id).await;

        let (target, reason, note) = match lookup {
            Ok(order) if order.status.is_terminal() => {
                if order.filled_qty > intent.filled_qty() {
                    if let Err(e) = intent.record_fill(order.filled_qty, order.avg_price, now) {
                        outcome
                            .errors
                            .push(format!("{}: fill refused: {e}", intent.client_order_id()));
                        return;
                    }
                }
                outcome.late_resolutions += 1;
                (order.status, "broker_final_status", order.raw_status)
            }
            Ok(_) => return,
            Err(BrokerError::NotFound { .. }) => (
                OrderStatus::Unknown,
                "ZOMBIE_ORDER",
                "not found at broker during reconciliation".to_string(),
            ),
            Err(e) => {
                record_broker_failure("get_order_status", e.kind());
                (
                    OrderStatus::Unknown,
                    "ZOMBIE_ORDER",
                    format!("broker lookup failed during reconciliation: {e}"),
                )
            }
        };

        intent.note_broker_status(note.clone(), now);
        let from = intent.status();
        if let Err(e) = self.advance(&mut intent, target, reason, &note).await {
            outcome
                .errors
                .push(format!("{}: {from} -> {target} failed: {e}", intent.client_order_id()));
            return;
        }

        if target == OrderStatus::Unknown {
            warn!(
                client_order_id = %intent.client_order_id(),
                %broker_id,
                from = %from,
                %note,
                "Zombie order moved to unknown"
            );
            outcome.mismatches.push(Mismatch {
                kind: MismatchKind::Zombie,
                user_id: intent.user_id().clone(),
                symbol: intent.symbol().clone(),
                broker_order_id: Some(broker_id),
                client_order_id: Some(intent.client_order_id().clone()),
                trade_id: intent.trade_id().cloned(),
                detail: note,
            });
        } else {
            info!(
                client_order_id = %intent.client_order_id(),
                status = %target,
                "Order resolved by reconciliation"
            );
        }
    }

    async fn advance(
        &self,
        intent: &mut OrderIntent,
        to: OrderStatus,
        reason: &str,
        detail: &str,
    ) -> Result<(), AdvanceError> {
        let context = TransitionContext::new(reason).with_detail(detail);
        for step in OrderStateMachine::path(intent.status(), to) {
            let expected = intent.status();
            let record = intent.transition(step, &context, self.clock.now())?;
            self.orders.save_transition(intent, expected, &record).await?;
        }
        Ok(())
    }

    async fn publish(&self, report: &ReconciliationReport, summary: &str) {
        let now = self.clock.now();
        let payload = json!({
            "mismatches": report.mismatches,
            "users_checked": report.users_checked,
        });
        self.audit
            .record_best_effort(
                AuditEvent::new(
                    "reconciliation",
                    "mismatch",
                    format!("Reconciliation mismatch: {summary}"),
                    now,
                )
                .with_metadata(payload.clone()),
            )
            .await;
        self.notifier
            .publish_best_effort(
                Notification::new(
                    NotificationKind::Reconciliation,
                    format!("Reconciliation mismatch: {summary}"),
                    now,
                )
                .with_payload(payload),
            )
            .await;
    }
}

#[derive(Debug, Error)]
enum AdvanceError {
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::PlaceOrderRequest;
    use crate::domain::order_execution::{NewOrderIntent, OrderPurpose, OrderSide, OrderType};
    use crate::infrastructure::account::InMemoryCredentialStore;
    use crate::infrastructure::broker::PaperBroker;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::notify::{BroadcastNotifier, InMemoryAuditLog};
    use crate::infrastructure::persistence::{
        InMemoryOrderIntentRepository, InMemorySystemGuardRepository, InMemoryTradeRepository,
    };
    use rust_decimal_macros::dec;

    struct Fixture {
        use_case: ReconcileUseCase,
        broker: Arc<PaperBroker>,
        orders: Arc<InMemoryOrderIntentRepository>,
        guard: Arc<SystemGuardService>,
        clock: Arc<ManualClock>,
    }

    fn fixture(policy: ReconciliationPolicy) -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let audit = Arc::new(InMemoryAuditLog::new());
        let notifier = Arc::new(BroadcastNotifier::new(16));
        let broker = Arc::new(PaperBroker::new());
        let orders = Arc::new(InMemoryOrderIntentRepository::new());
        let guard = Arc::new(SystemGuardService::new(
            Arc::new(InMemorySystemGuardRepository::new()),
            notifier.clone(),
            audit.clone(),
            clock.clone(),
        ));
        let credentials = Arc::new(InMemoryCredentialStore::new());
        credentials.activate(UserId::new("u-1"));
        let use_case = ReconcileUseCase::new(
            credentials,
            broker.clone(),
            orders.clone(),
            Arc::new(InMemoryTradeRepository::new()),
            Arc::clone(&guard),
            notifier,
            audit,
            clock.clone(),
            policy,
        );
        Fixture {
            use_case,
            broker,
            orders,
            guard,
            clock,
        }
    }

    async fn place_external(broker: &PaperBroker) -> BrokerOrderId {
        broker
            .place_order(
                &UserId::new("u-1"),
                PlaceOrderRequest::stop(
                    ClientOrderId::new("elsewhere-1"),
                    Symbol::new("AAPL"),
                    OrderSide::Sell,
                    dec!(5),
                    dec!(90),
                ),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn ghost_is_tracked_once() {
        let f = fixture(ReconciliationPolicy::default());
        let broker_id = place_external(&f.broker).await;

        let first = f.use_case.execute().await.unwrap();
        assert_eq!(first.count(MismatchKind::Ghost), 1);
        assert!(first.safe_mode_engaged);

        let ghost = f.orders.find_by_broker_id(&broker_id).await.unwrap().unwrap();
        assert_eq!(ghost.status(), OrderStatus::Unknown);

        let second = f.use_case.execute().await.unwrap();
        assert_eq!(second.count(MismatchKind::Ghost), 0);
    }

    #[tokio::test]
    async fn missing_working_order_becomes_unknown() {
        let f = fixture(ReconciliationPolicy {
            safe_mode_on_mismatch: false,
        });
        let now = f.clock.now();
        let mut intent = OrderIntent::new(
            NewOrderIntent {
                client_order_id: ClientOrderId::new("co-1"),
                user_id: UserId::new("u-1"),
                symbol: Symbol::new("AAPL"),
                side: OrderSide::Buy,
                quantity: dec!(10),
                order_type: OrderType::Limit,
                limit_price: Some(dec!(100)),
                stop_price: None,
                purpose: OrderPurpose::Entry,
                mode: TradingMode::Live,
                trade_id: None,
            },
            now,
        );
        f.orders.insert(&intent).await.unwrap();
        intent.assign_broker_order_id(BrokerOrderId::new("gone-1"), now);
        let record = intent
            .transition(OrderStatus::Sent, &TransitionContext::new("test"), now)
            .unwrap();
        f.orders
            .save_transition(&intent, OrderStatus::Created, &record)
            .await
            .unwrap();

        let report = f.use_case.execute().await.unwrap();
        assert_eq!(report.count(MismatchKind::Zombie), 1);
        assert!(!report.safe_mode_engaged);
        assert!(f.guard.snapshot().await.unwrap().allows_entries());

        let stored = f.orders.find(&ClientOrderId::new("co-1")).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Unknown);
        assert!(stored.last_broker_status().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn orphan_position_is_flagged_not_closed() {
        let f = fixture(ReconciliationPolicy::default());
        f.broker
            .set_position(&UserId::new("u-1"), &Symbol::new("TSLA"), dec!(3), dec!(250));

        let report = f.use_case.execute().await.unwrap();
        assert_eq!(report.count(MismatchKind::Orphan), 1);
        assert_eq!(f.broker.open_positions(&UserId::new("u-1")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clean_run_records_reconciliation_time() {
        let f = fixture(ReconciliationPolicy::default());
        let report = f.use_case.execute().await.unwrap();

        assert!(report.is_clean());
        let state = f.guard.snapshot().await.unwrap();
        assert!(state.last_reconciled_at.is_some());
        assert!(state.allows_entries());
    }
}
