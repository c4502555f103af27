//! Exit Retry Coordinator
//!
//! Keeps resubmitting a trade's market exit until it fills. Each trade has at
//! most one unresolved request; a failed attempt is rescheduled with capped
//! exponential backoff and a request that runs out of attempts is
//! dead-lettered once, audited, alerted and escalated to a panic.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::execute_order::{ExecuteOrderCommand, ExecuteOrderUseCase, ExecutionError};
use super::trade_lifecycle::{TradeLifecycleError, TradeLifecycleUseCase};
use crate::application::ports::{
    AuditEvent, AuditSink, BrokerPort, Clock, EscalationPort, Notification, NotificationKind,
    NotificationPort, PanicRequest,
};
use crate::domain::exit_retry::{
    AttemptOutcome, BackoffPolicy, EnqueueOutcome, ExitRetryRepository, ExitRetryRequest,
    ExitRetryRequestError, RetryDecision, decide,
};
use crate::domain::order_execution::{
    ExecutionReport, OrderIntentRepository, OrderPurpose, OrderStatus, TradingMode,
};
use crate::domain::shared::{ClientOrderId, ExitRetryId, RepositoryError, TradeId};
use crate::domain::supervision::HaltReason;
use crate::domain::trade_lifecycle::{ExitReason, PositionState, Trade};
use crate::observability::{record_broker_failure, record_dead_letter, record_exit_attempt};

/// Exit retry errors.
#[derive(Debug, Error)]
pub enum ExitRetryError {
    /// Storage failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Trade could not be moved or settled.
    #[error(transparent)]
    Lifecycle(#[from] TradeLifecycleError),

    /// Request already settled.
    #[error(transparent)]
    Request(#[from] ExitRetryRequestError),
}

/// Result of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptReport {
    /// The exit filled and the trade is closed.
    Filled {
        /// Exit price.
        exit_price: Decimal,
        /// Realized P&L stored on the trade.
        realized_pnl: Decimal,
    },
    /// The trade was already closed; the request was resolved.
    AlreadyClosed,
    /// Another attempt is scheduled.
    RetryScheduled {
        /// When.
        at: chrono::DateTime<chrono::Utc>,
        /// Why this attempt failed.
        error: String,
    },
    /// The request was given up on.
    DeadLettered {
        /// Final error.
        error: String,
    },
    /// Nothing done: settled, in flight elsewhere or lost a race.
    Skipped,
}

/// Result of an enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueReport {
    /// The request as stored after the immediate attempt.
    pub request: ExitRetryRequest,
    /// False when an unresolved request already existed.
    pub created: bool,
    /// The immediate attempt, for new requests.
    pub attempt: Option<AttemptReport>,
}

/// Tally of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Requests that were due.
    pub due: usize,
    /// Exits filled (or found closed).
    pub resolved: usize,
    /// Attempts rescheduled.
    pub retried: usize,
    /// Requests dead-lettered.
    pub dead_lettered: usize,
    /// Attempts skipped.
    pub skipped: usize,
    /// Attempts that errored.
    pub errors: usize,
}

/// Removes a trade from the in-flight set on drop.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<TradeId>>,
    trade_id: TradeId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.trade_id);
    }
}

/// The exit retry coordinator.
pub struct ExitRetryCoordinator {
    requests: Arc<dyn ExitRetryRepository>,
    lifecycle: Arc<TradeLifecycleUseCase>,
    engine: Arc<ExecuteOrderUseCase>,
    orders: Arc<dyn OrderIntentRepository>,
    broker: Arc<dyn BrokerPort>,
    notifier: Arc<dyn NotificationPort>,
    audit: Arc<dyn AuditSink>,
    escalation: Arc<dyn EscalationPort>,
    clock: Arc<dyn Clock>,
    policy: BackoffPolicy,
    concurrency: usize,
    in_flight: Mutex<HashSet<TradeId>>,
}

impl ExitRetryCoordinator {
    /// Create the coordinator.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        requests: Arc<dyn ExitRetryRepository>,
        lifecycle: Arc<TradeLifecycleUseCase>,
        engine: Arc<ExecuteOrderUseCase>,
        orders: Arc<dyn OrderIntentRepository>,
        broker: Arc<dyn BrokerPort>,
        notifier: Arc<dyn NotificationPort>,
        audit: Arc<dyn AuditSink>,
        escalation: Arc<dyn EscalationPort>,
        clock: Arc<dyn Clock>,
        policy: BackoffPolicy,
        concurrency: usize,
    ) -> Self {
        Self {
            requests,
            lifecycle,
            engine,
            orders,
            broker,
            notifier,
            audit,
            escalation,
            clock,
            policy,
            concurrency: concurrency.max(1),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Queue an exit for a trade and attempt it once. A trade that already
    /// has an unresolved request gets that request back untouched.
    pub async fn enqueue(
        &self,
        trade_id: &TradeId,
        reason: ExitReason,
    ) -> Result<EnqueueReport, ExitRetryError> {
        self.enqueue_after(trade_id, reason, None).await
    }

    /// Like [`Self::enqueue`], for a trade that already sent an order to
    /// close the position. The first attempt settles that order when it
    /// filled, or cancels it when still working, before selling again.
    pub async fn enqueue_after(
        &self,
        trade_id: &TradeId,
        reason: ExitReason,
        previous: Option<ClientOrderId>,
    ) -> Result<EnqueueReport, ExitRetryError> {
        let trade = self.lifecycle.get(trade_id).await?;
        let mut request = ExitRetryRequest::for_trade(&trade, reason, self.clock.now());
        if let Some(previous) = previous {
            request = request.after_order(previous);
        }

        match self.requests.insert_if_absent(&request).await? {
            EnqueueOutcome::Existing(existing) => {
                debug!(%trade_id, request_id = %existing.id(), "Exit already queued");
                Ok(EnqueueReport {
                    request: existing,
                    created: false,
                    attempt: None,
                })
            }
            EnqueueOutcome::Created => {
                info!(%trade_id, request_id = %request.id(), reason = %reason, "Exit queued");
                let attempt = self.attempt(request.id()).await?;
                let stored = self.requests.find(request.id()).await?.unwrap_or(request);
                Ok(EnqueueReport {
                    request: stored,
                    created: true,
                    attempt: Some(attempt),
                })
            }
        }
    }

    /// Attempt every due request, a bounded number at a time. Failures of
    /// single requests are logged and counted, never abort the sweep.
    pub async fn sweep(&self) -> Result<SweepSummary, ExitRetryError> {
        let due = self.requests.find_due(self.clock.now()).await?;
        let mut summary = SweepSummary {
            due: due.len(),
            ..SweepSummary::default()
        };
        if due.is_empty() {
            return Ok(summary);
        }

        let results: Vec<_> = stream::iter(due)
            .map(|request| async move {
                let id = request.id().clone();
                (id.clone(), self.attempt(&id).await)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (id, result) in results {
            match result {
                Ok(AttemptReport::Filled { .. } | AttemptReport::AlreadyClosed) => {
                    summary.resolved += 1;
                }
                Ok(AttemptReport::RetryScheduled { .. }) => summary.retried += 1,
                Ok(AttemptReport::DeadLettered { .. }) => summary.dead_lettered += 1,
                Ok(AttemptReport::Skipped) => summary.skipped += 1,
                Err(e) => {
                    summary.errors += 1;
                    error!(request_id = %id, error = %e, "Exit retry attempt failed");
                }
            }
        }

        info!(
            due = summary.due,
            resolved = summary.resolved,
            retried = summary.retried,
            dead_lettered = summary.dead_lettered,
            errors = summary.errors,
            "Exit retry sweep finished"
        );
        Ok(summary)
    }

    /// Queue exits for paper trades whose stop was crossed.
    pub async fn on_stop_hits(&self, trade_ids: &[TradeId]) -> usize {
        let mut queued = 0;
        for trade_id in trade_ids {
            match self.enqueue(trade_id, ExitReason::StopLoss).await {
                Ok(report) if report.created => queued += 1,
                Ok(_) => {}
                Err(e) => error!(%trade_id, error = %e, "Failed to queue stop-loss exit"),
            }
        }
        queued
    }

    /// All requests, for inspection.
    pub async fn list(&self) -> Result<Vec<ExitRetryRequest>, ExitRetryError> {
        Ok(self.requests.list().await?)
    }

    /// Run one attempt for a stored request.
    pub async fn attempt(&self, request_id: &ExitRetryId) -> Result<AttemptReport, ExitRetryError> {
        let Some(request) = self.requests.find(request_id).await? else {
            return Ok(AttemptReport::Skipped);
        };
        if !request.is_pending() {
            debug!(%request_id, "Request already settled, not attempting");
            return Ok(AttemptReport::Skipped);
        }
        let Some(_guard) = self.claim(request.trade_id()) else {
            debug!(trade_id = %request.trade_id(), "Exit attempt already in flight");
            return Ok(AttemptReport::Skipped);
        };
        self.run_attempt(request).await
    }

    fn claim(&self, trade_id: &TradeId) -> Option<InFlight<'_>> {
        let mut set = self.in_flight.lock();
        if !set.insert(trade_id.clone()) {
            return None;
        }
        Some(InFlight {
            set: &self.in_flight,
            trade_id: trade_id.clone(),
        })
    }

    async fn run_attempt(&self, mut request: ExitRetryRequest) -> Result<AttemptReport, ExitRetryError> {
        let trade_id = request.trade_id().clone();
        let trade = match self.lifecycle.get(&trade_id).await {
            Ok(trade) => trade,
            Err(TradeLifecycleError::NotFound(_)) => {
                return self
                    .finish(request, AttemptOutcome::Fatal(format!("trade {trade_id} not found")))
                    .await;
            }
            Err(e) => return Err(e.into()),
        };

        if trade.state() == PositionState::Closed {
            let expected = request.version();
            if request.resolve(self.clock.now()) {
                self.store(&request, expected).await?;
            }
            info!(%trade_id, "Trade already closed, exit request resolved");
            return Ok(AttemptReport::AlreadyClosed);
        }

        // A flatten that already filled only needs settling.
        if trade.state() == PositionState::Error {
            if let Some(price) = trade.exit_price() {
                return self.finish(request, AttemptOutcome::Filled { price }).await;
            }
        }

        if trade.quantity() <= Decimal::ZERO {
            return self
                .finish(request, AttemptOutcome::Fatal("trade has no quantity".to_string()))
                .await;
        }

        self.lifecycle.begin_exit(&trade_id, request.reason()).await?;

        let previous = request.last_client_order_id().cloned();
        let expected = request.version();
        let client_order_id = request.begin_attempt(self.clock.now())?;
        match self.requests.save(&request, expected).await {
            Ok(()) => {}
            Err(e) if e.is_conflict() => {
                debug!(%trade_id, "Exit request changed underneath, skipping attempt");
                return Ok(AttemptReport::Skipped);
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(previous) = previous {
            if let Some(price) = self.settle_previous(&request, &previous).await {
                return self.finish(request, AttemptOutcome::Filled { price }).await;
            }
        }

        let outcome = self.submit_exit(&trade, &request, client_order_id).await;
        self.finish(request, outcome).await
    }

    async fn submit_exit(
        &self,
        trade: &Trade,
        request: &ExitRetryRequest,
        client_order_id: ClientOrderId,
    ) -> AttemptOutcome {
        let mode = if trade.is_paper() {
            TradingMode::Paper
        } else {
            TradingMode::Live
        };
        let command = ExecuteOrderCommand::market(
            request.user_id().clone(),
            request.symbol().clone(),
            request.side(),
            request.quantity(),
            OrderPurpose::Exit,
            mode,
        )
        .with_client_order_id(client_order_id)
        .with_trade(trade.id().clone());

        info!(
            trade_id = %trade.id(),
            attempt = request.attempts(),
            side = %request.side(),
            quantity = %request.quantity(),
            "Submitting exit"
        );
        match self.engine.execute(command).await {
            Ok(report) => outcome_from_report(&report),
            Err(ExecutionError::Invalid(e)) => AttemptOutcome::Fatal(e.to_string()),
            Err(e) => AttemptOutcome::Retryable(e.to_string()),
        }
    }

    /// Check the previous attempt's order before sending another: a late fill
    /// settles the request, a still-working order is cancelled.
    async fn settle_previous(
        &self,
        request: &ExitRetryRequest,
        previous: &ClientOrderId,
    ) -> Option<Decimal> {
        let intent = match self.orders.find(previous).await {
            Ok(Some(intent)) => intent,
            Ok(None) => return None,
            Err(e) => {
                warn!(client_order_id = %previous, error = %e, "Previous exit lookup failed");
                return None;
            }
        };
        if intent.status() == OrderStatus::Filled {
            return intent.avg_fill_price();
        }
        let Some(broker_order_id) = intent.broker_order_id() else {
            return None;
        };

        match self
            .broker
            .get_order_status(request.user_id(), broker_order_id)
            .await
        {
            Ok(order) if order.status == OrderStatus::Filled => {
                info!(client_order_id = %previous, "Previous exit attempt filled late");
                return order.avg_price;
            }
            Ok(order) if !order.status.is_working() => return None,
            Ok(_) => {}
            Err(e) => {
                record_broker_failure("get_order_status", e.kind());
                warn!(client_order_id = %previous, error = %e, "Previous exit status unknown");
            }
        }

        if let Err(e) = self.broker.cancel_order(request.user_id(), broker_order_id).await {
            record_broker_failure("cancel_order", e.kind());
            warn!(client_order_id = %previous, error = %e, "Failed to cancel previous exit attempt");
        }
        None
    }

    async fn finish(
        &self,
        mut request: ExitRetryRequest,
        outcome: AttemptOutcome,
    ) -> Result<AttemptReport, ExitRetryError> {
        let now = self.clock.now();
        let trade_id = request.trade_id().clone();
        let expected = request.version();

        match decide(outcome, request.attempts(), &self.policy, now) {
            RetryDecision::Resolve { price } => {
                let settled = self
                    .lifecycle
                    .finalize(&trade_id, price, request.reason())
                    .await?;
                request.resolve(now);
                self.store(&request, expected).await?;
                record_exit_attempt("filled");
                info!(
                    %trade_id,
                    attempts = request.attempts(),
                    exit_price = %price,
                    realized_pnl = %settled.realized_pnl,
                    "Exit filled"
                );
                Ok(AttemptReport::Filled {
                    exit_price: price,
                    realized_pnl: settled.realized_pnl,
                })
            }
            RetryDecision::Retry { at, error } => {
                request.schedule_retry(at, error.clone(), now)?;
                self.store(&request, expected).await?;
                record_exit_attempt("retry");
                warn!(
                    %trade_id,
                    attempts = request.attempts(),
                    next_attempt_at = %at,
                    %error,
                    "Exit attempt failed, retry scheduled"
                );
                Ok(AttemptReport::RetryScheduled { at, error })
            }
            RetryDecision::DeadLetter { error } => {
                if !request.dead_letter(error.clone(), now) {
                    return Ok(AttemptReport::DeadLettered { error });
                }
                // Escalate only the writer whose dead-letter landed.
                if !self.store(&request, expected).await? {
                    return Ok(AttemptReport::Skipped);
                }
                record_exit_attempt("dead_letter");
                self.escalate_dead_letter(&request, &error).await;
                Ok(AttemptReport::DeadLettered { error })
            }
        }
    }

    /// Compare-and-write a request. Returns false when another writer got
    /// there first.
    async fn store(&self, request: &ExitRetryRequest, expected: u64) -> Result<bool, ExitRetryError> {
        match self.requests.save(request, expected).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_conflict() => {
                warn!(request_id = %request.id(), "Exit request was updated concurrently");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn escalate_dead_letter(&self, request: &ExitRetryRequest, reason: &str) {
        let now = self.clock.now();
        record_dead_letter();
        error!(
            request_id = %request.id(),
            trade_id = %request.trade_id(),
            user_id = %request.user_id(),
            attempts = request.attempts(),
            error = reason,
            "Exit dead-lettered, manual intervention required"
        );

        let payload = json!({
            "request_id": request.id(),
            "trade_id": request.trade_id(),
            "symbol": request.symbol(),
            "attempts": request.attempts(),
            "error": reason,
        });
        self.audit
            .record_best_effort(
                AuditEvent::new(
                    "exit_retry",
                    "dead_letter",
                    format!("Exit for trade {} dead-lettered: {reason}", request.trade_id()),
                    now,
                )
                .for_user(request.user_id().clone())
                .with_metadata(payload.clone()),
            )
            .await;
        self.notifier
            .publish_best_effort(
                Notification::new(
                    NotificationKind::Alert,
                    format!("Exit for {} could not be completed", request.symbol()),
                    now,
                )
                .for_user(request.user_id().clone())
                .with_payload(payload),
            )
            .await;

        let panic = PanicRequest {
            reason: HaltReason::ExitDeadLetter,
            detail: format!("trade {}: {reason}", request.trade_id()),
            requested_at: now,
        };
        if let Err(e) = self.escalation.request_panic(panic).await {
            error!(trade_id = %request.trade_id(), error = %e, "Failed to escalate dead-lettered exit");
        }
    }
}

/// Classify an execution report as an exit attempt outcome.
fn outcome_from_report(report: &ExecutionReport) -> AttemptOutcome {
    match (report.status, report.avg_price) {
        (OrderStatus::Filled, Some(price)) => AttemptOutcome::Filled { price },
        (OrderStatus::Filled, None) => {
            AttemptOutcome::Retryable("exit filled without a reported price".to_string())
        }
        (OrderStatus::Rejected, _) => AttemptOutcome::Retryable(
            report
                .rejection_reason
                .clone()
                .unwrap_or_else(|| "exit rejected".to_string()),
        ),
        (status, _) => AttemptOutcome::Retryable(format!("exit order {status} after polling")),
    }
}
