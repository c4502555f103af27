//! Execute Order Use Case
//!
//! The execution engine. Runs the risk gate, persists the order intent, then
//! either synthesizes a paper fill from the cost model or submits to the
//! broker and polls until the order is terminal, the attempt budget is spent
//! or the deadline passes.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::evaluate_risk::{EvaluateRiskUseCase, RiskEvaluationError};
use crate::application::ports::{
    BrokerError, BrokerOrder, BrokerPort, Clock, CredentialStore, EscalationPort, Notification,
    NotificationKind, NotificationPort, PanicRequest, PlaceOrderRequest, PortError,
};
use crate::domain::order_execution::{
    CostModel, ExecutionReport, NewOrderIntent, OrderError, OrderIntent, OrderIntentRepository,
    OrderPurpose, OrderSide, OrderStateMachine, OrderStatus, OrderType, Quote, TradingMode,
};
use crate::domain::risk_management::{RejectCode, RiskDecision, RiskRequest};
use crate::domain::shared::{
    ClientOrderId, RepositoryError, Symbol, TradeId, TransitionContext, UserId,
};
use crate::domain::supervision::HaltReason;
use crate::observability::{
    record_broker_failure, record_order_placed, record_order_polls, record_order_rejection,
};

/// Polling budget for live orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionPolicy {
    /// Wait between status polls.
    pub poll_interval: Duration,
    /// Maximum status polls.
    pub max_poll_attempts: u32,
    /// Overall time budget for polling.
    pub poll_deadline: Duration,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_poll_attempts: 30,
            poll_deadline: Duration::from_secs(60),
        }
    }
}

/// Request to execute an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteOrderCommand {
    /// Client key; generated when absent.
    pub client_order_id: Option<ClientOrderId>,
    /// Owner.
    pub user_id: UserId,
    /// Symbol.
    pub symbol: Symbol,
    /// Side.
    pub side: OrderSide,
    /// Quantity.
    pub quantity: Decimal,
    /// Order type.
    pub order_type: OrderType,
    /// Limit price for limit orders.
    pub limit_price: Option<Decimal>,
    /// Stop price for stop orders.
    pub stop_price: Option<Decimal>,
    /// Protective stop the position will carry (entries).
    pub protective_stop: Option<Decimal>,
    /// Why the order is placed.
    pub purpose: OrderPurpose,
    /// Paper or live.
    pub mode: TradingMode,
    /// Trade the order belongs to.
    pub trade_id: Option<TradeId>,
}

impl ExecuteOrderCommand {
    /// Market order command.
    #[must_use]
    pub const fn market(
        user_id: UserId,
        symbol: Symbol,
        side: OrderSide,
        quantity: Decimal,
        purpose: OrderPurpose,
        mode: TradingMode,
    ) -> Self {
        Self {
            client_order_id: None,
            user_id,
            symbol,
            side,
            quantity,
            order_type: OrderType::Market,
            limit_price: None,
            stop_price: None,
            protective_stop: None,
            purpose,
            mode,
            trade_id: None,
        }
    }

    /// Use a caller-chosen client key.
    #[must_use]
    pub fn with_client_order_id(mut self, id: ClientOrderId) -> Self {
        self.client_order_id = Some(id);
        self
    }

    /// Link to a trade.
    #[must_use]
    pub fn with_trade(mut self, trade_id: TradeId) -> Self {
        self.trade_id = Some(trade_id);
        self
    }

    /// Set the protective stop for an entry.
    #[must_use]
    pub const fn with_protective_stop(mut self, stop: Decimal) -> Self {
        self.protective_stop = Some(stop);
        self
    }

    fn risk_request(&self) -> RiskRequest {
        RiskRequest {
            user_id: self.user_id.clone(),
            symbol: self.symbol.clone(),
            side: self.side,
            quantity: self.quantity,
            purpose: self.purpose,
            entry_price: self.limit_price,
            stop_price: self.protective_stop,
        }
    }

    fn intent(&self, client_order_id: ClientOrderId) -> NewOrderIntent {
        NewOrderIntent {
            client_order_id,
            user_id: self.user_id.clone(),
            symbol: self.symbol.clone(),
            side: self.side,
            quantity: self.quantity,
            order_type: self.order_type,
            limit_price: self.limit_price,
            stop_price: self.stop_price,
            purpose: self.purpose,
            mode: self.mode,
            trade_id: self.trade_id.clone(),
        }
    }
}

/// Execution engine errors.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Invalid order parameters.
    #[error("Invalid order: {0}")]
    Invalid(OrderError),

    /// Order state error while applying broker updates.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Risk inputs could not be gathered.
    #[error(transparent)]
    Risk(#[from] RiskEvaluationError),

    /// Storage failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Broker call failed.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Account port failure.
    #[error(transparent)]
    Port(#[from] PortError),
}

/// The execution engine.
pub struct ExecuteOrderUseCase {
    risk: Arc<EvaluateRiskUseCase>,
    orders: Arc<dyn OrderIntentRepository>,
    broker: Arc<dyn BrokerPort>,
    credentials: Arc<dyn CredentialStore>,
    notifier: Arc<dyn NotificationPort>,
    escalation: Arc<dyn EscalationPort>,
    clock: Arc<dyn Clock>,
    cost_model: CostModel,
    policy: ExecutionPolicy,
}

impl ExecuteOrderUseCase {
    /// Create the engine.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        risk: Arc<EvaluateRiskUseCase>,
        orders: Arc<dyn OrderIntentRepository>,
        broker: Arc<dyn BrokerPort>,
        credentials: Arc<dyn CredentialStore>,
        notifier: Arc<dyn NotificationPort>,
        escalation: Arc<dyn EscalationPort>,
        clock: Arc<dyn Clock>,
        cost_model: CostModel,
        policy: ExecutionPolicy,
    ) -> Self {
        Self {
            risk,
            orders,
            broker,
            credentials,
            notifier,
            escalation,
            clock,
            cost_model,
            policy,
        }
    }

    /// Execute an order and return its current projection.
    ///
    /// Resubmitting an existing client key returns the stored projection
    /// without side effects.
    pub async fn execute(
        &self,
        command: ExecuteOrderCommand,
    ) -> Result<ExecutionReport, ExecutionError> {
        let client_order_id = command
            .client_order_id
            .clone()
            .unwrap_or_else(ClientOrderId::generate);

        if let Some(existing) = self.orders.find(&client_order_id).await? {
            debug!(%client_order_id, status = %existing.status(), "Client order id already known");
            return Ok(existing.report());
        }

        let new_intent = command.intent(client_order_id);
        new_intent.validate().map_err(ExecutionError::Invalid)?;
        let mut intent = OrderIntent::new(new_intent, self.clock.now());

        let assessment = self.risk.execute(&command.risk_request()).await?;
        if let RiskDecision::Reject(rejection) = assessment.decision {
            return self
                .reject_new(intent, rejection.code.as_str(), &rejection.message)
                .await;
        }

        if command.mode == TradingMode::Live
            && !self.credentials.has_active_credentials(&command.user_id).await?
        {
            let code = RejectCode::CredentialsRevoked.as_str();
            record_order_rejection(code);
            return self
                .reject_new(intent, code, "No active broker credentials")
                .await;
        }

        if let Some(quote) = &assessment.quote {
            intent.set_expected_cost(self.cost_model.estimate(command.side, command.quantity, quote));
        }

        match self.orders.insert(&intent).await {
            Ok(()) => {}
            Err(RepositoryError::Duplicate { .. }) => {
                return self.existing_report(intent.client_order_id()).await;
            }
            Err(e) => return Err(e.into()),
        }

        let mode = if command.mode.is_paper() { "paper" } else { "live" };
        record_order_placed(mode, command.purpose.as_str());
        info!(
            client_order_id = %intent.client_order_id(),
            user_id = %command.user_id,
            symbol = %command.symbol,
            side = ?command.side,
            quantity = %command.quantity,
            purpose = command.purpose.as_str(),
            mode,
            "Order accepted for execution"
        );

        match command.mode {
            TradingMode::Paper => self.fill_paper(intent, assessment.quote).await,
            TradingMode::Live => self.submit_live(intent, assessment.quote).await,
        }
    }

    /// Current projection of a stored intent.
    pub async fn get(&self, client_order_id: &ClientOrderId) -> Result<Option<OrderIntent>, ExecutionError> {
        Ok(self.orders.find(client_order_id).await?)
    }

    async fn fill_paper(
        &self,
        mut intent: OrderIntent,
        quote: Option<Quote>,
    ) -> Result<ExecutionReport, ExecutionError> {
        let Some(quote) = quote else {
            intent.set_rejection_reason("NO_QUOTE: no reference quote for paper fill");
            self.advance(&mut intent, OrderStatus::Rejected, "NO_QUOTE").await?;
            return Ok(intent.report());
        };

        let price = self.cost_model.fill_price(intent.side(), &quote);
        self.advance(&mut intent, OrderStatus::Acked, "paper_accept").await?;

        let now = self.clock.now();
        intent.record_fill(intent.quantity(), Some(price), now)?;
        intent.set_realized_cost(self.cost_model.realized(
            intent.side(),
            intent.quantity(),
            &quote,
            price,
        ));
        self.advance(&mut intent, OrderStatus::Filled, "paper_fill").await?;

        self.announce(&intent).await;
        Ok(intent.report())
    }

    async fn submit_live(
        &self,
        mut intent: OrderIntent,
        quote: Option<Quote>,
    ) -> Result<ExecutionReport, ExecutionError> {
        let request = PlaceOrderRequest {
            client_order_id: intent.client_order_id().clone(),
            symbol: intent.symbol().clone(),
            side: intent.side(),
            order_type: intent.order_type(),
            quantity: intent.quantity(),
            limit_price: intent.limit_price(),
            stop_price: intent.stop_price(),
        };

        let broker_order_id = match self.broker.place_order(intent.user_id(), request).await {
            Ok(id) => id,
            Err(BrokerError::Rejected { reason }) => {
                record_broker_failure("place_order", "rejected");
                intent.set_rejection_reason(format!("BROKER_REJECTED: {reason}"));
                self.advance(&mut intent, OrderStatus::Rejected, "BROKER_REJECTED")
                    .await?;
                self.announce(&intent).await;
                return Ok(intent.report());
            }
            Err(e) => {
                record_broker_failure("place_order", e.kind());
                warn!(
                    client_order_id = %intent.client_order_id(),
                    error = %e,
                    "Order submission failed, broker state unknown"
                );
                intent.note_broker_status(e.to_string(), self.clock.now());
                self.advance(&mut intent, OrderStatus::Unknown, "BROKER_ERROR").await?;
                if matches!(e, BrokerError::Unreachable { .. }) {
                    self.escalate_unreachable(&e).await;
                }
                return Err(e.into());
            }
        };

        intent.assign_broker_order_id(broker_order_id.clone(), self.clock.now());
        self.advance(&mut intent, OrderStatus::Sent, "submitted").await?;

        let started = self.clock.now();
        let deadline = chrono::Duration::from_std(self.policy.poll_deadline)
            .ok()
            .and_then(|d| started.checked_add_signed(d));
        let mut polls = 0;

        for attempt in 1..=self.policy.max_poll_attempts {
            self.clock.sleep(self.policy.poll_interval).await;
            if deadline.is_some_and(|d| self.clock.now() > d) {
                warn!(client_order_id = %intent.client_order_id(), "Order poll deadline passed");
                break;
            }
            polls = attempt;

            let broker_order = match self
                .broker
                .get_order_status(intent.user_id(), &broker_order_id)
                .await
            {
                Ok(order) => order,
                Err(e) => {
                    record_broker_failure("get_order_status", e.kind());
                    warn!(
                        client_order_id = %intent.client_order_id(),
                        attempt,
                        error = %e,
                        "Order status poll failed"
                    );
                    continue;
                }
            };

            self.apply_broker_state(&mut intent, &broker_order, quote.as_ref())
                .await?;
            if intent.status().is_terminal() {
                break;
            }
        }

        record_order_polls(intent.status().as_str(), polls);
        if intent.status().is_terminal() {
            self.announce(&intent).await;
        } else {
            info!(
                client_order_id = %intent.client_order_id(),
                status = %intent.status(),
                polls,
                "Polling budget spent, returning last observed status"
            );
        }
        Ok(intent.report())
    }

    /// Fold one broker status report into the intent, walking the legal
    /// path to the reported status.
    async fn apply_broker_state(
        &self,
        intent: &mut OrderIntent,
        order: &BrokerOrder,
        quote: Option<&Quote>,
    ) -> Result<(), ExecutionError> {
        let now = self.clock.now();
        intent.note_broker_status(order.raw_status.clone(), now);
        if order.filled_qty > intent.filled_qty() {
            intent.record_fill(order.filled_qty, order.avg_price, now)?;
        }

        let target = order.status;
        if target == intent.status() {
            self.orders.save(intent).await?;
            return Ok(());
        }

        let path = OrderStateMachine::path(intent.status(), target);
        if path.is_empty() {
            warn!(
                client_order_id = %intent.client_order_id(),
                from = %intent.status(),
                to = %target,
                "Ignoring broker status with no legal path"
            );
            self.orders.save(intent).await?;
            return Ok(());
        }

        if target == OrderStatus::Filled {
            if let (Some(quote), Some(price)) = (quote, intent.avg_fill_price()) {
                intent.set_realized_cost(self.cost_model.realized(
                    intent.side(),
                    intent.filled_qty(),
                    quote,
                    price,
                ));
            }
        }
        if target == OrderStatus::Rejected {
            intent.set_rejection_reason(format!("BROKER_REJECTED: {}", order.raw_status));
        }

        self.advance(intent, target, "broker_status").await
    }

    /// Walk the legal path from the current status to `to`, persisting each
    /// step with its audit record.
    async fn advance(
        &self,
        intent: &mut OrderIntent,
        to: OrderStatus,
        reason: &str,
    ) -> Result<(), ExecutionError> {
        let context = TransitionContext::new(reason);
        for step in OrderStateMachine::path(intent.status(), to) {
            let expected = intent.status();
            let record = intent.transition(step, &context, self.clock.now())?;
            self.orders.save_transition(intent, expected, &record).await?;
            debug!(
                client_order_id = %intent.client_order_id(),
                from = %expected,
                to = %step,
                reason,
                "Order transition"
            );
        }
        Ok(())
    }

    async fn reject_new(
        &self,
        mut intent: OrderIntent,
        code: &str,
        message: &str,
    ) -> Result<ExecutionReport, ExecutionError> {
        intent.set_rejection_reason(format!("{code}: {message}"));
        let context = TransitionContext::new(code).with_detail(message);
        let record = intent.transition(OrderStatus::Rejected, &context, self.clock.now())?;

        match self.orders.insert_with_history(&intent, &[record]).await {
            Ok(()) => {}
            Err(RepositoryError::Duplicate { .. }) => {
                return self.existing_report(intent.client_order_id()).await;
            }
            Err(e) => return Err(e.into()),
        }

        self.notifier
            .publish_best_effort(
                Notification::new(
                    NotificationKind::Reject,
                    format!("{} {} rejected: {message}", intent.side(), intent.symbol()),
                    self.clock.now(),
                )
                .for_user(intent.user_id().clone())
                .with_payload(json!({
                    "client_order_id": intent.client_order_id(),
                    "code": code,
                    "message": message,
                })),
            )
            .await;
        Ok(intent.report())
    }

    async fn existing_report(&self, id: &ClientOrderId) -> Result<ExecutionReport, ExecutionError> {
        let existing = self.orders.find(id).await?.ok_or_else(|| RepositoryError::NotFound {
            entity: "order_intent",
            id: id.to_string(),
        })?;
        Ok(existing.report())
    }

    async fn announce(&self, intent: &OrderIntent) {
        let report = intent.report();
        self.notifier
            .publish_best_effort(
                Notification::new(
                    NotificationKind::Order,
                    format!("{} {} {}", intent.client_order_id(), intent.symbol(), intent.status()),
                    self.clock.now(),
                )
                .for_user(intent.user_id().clone())
                .with_payload(report_payload(&report)),
            )
            .await;
    }

    async fn escalate_unreachable(&self, error: &BrokerError) {
        let request = PanicRequest {
            reason: HaltReason::BrokerUnreachable,
            detail: error.to_string(),
            requested_at: self.clock.now(),
        };
        if let Err(e) = self.escalation.request_panic(request).await {
            warn!(error = %e, "Failed to escalate unreachable broker");
        }
    }
}

/// Notification payload for an order report. A report that fails to
/// serialize still carries its key and status.
fn report_payload(report: &ExecutionReport) -> serde_json::Value {
    match serde_json::to_value(report) {
        Ok(value) => value,
        Err(e) => {
            error!(
                client_order_id = %report.client_order_id,
                error = %e,
                "Failed to serialize execution report"
            );
            json!({
                "client_order_id": report.client_order_id.to_string(),
                "status": report.status.as_str(),
                "payload_error": e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn report_payload_carries_the_full_report() {
        let report = ExecutionReport {
            client_order_id: ClientOrderId::new("co-7"),
            broker_order_id: None,
            status: OrderStatus::Filled,
            filled_qty: dec!(10),
            avg_price: Some(dec!(100.25)),
            rejection_reason: None,
        };

        let payload = report_payload(&report);

        assert_eq!(payload["client_order_id"], "co-7");
        assert_eq!(payload["status"], "filled");
        assert!(payload.get("payload_error").is_none());
        assert!(!payload.is_null());
    }
}
