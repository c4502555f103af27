//! Order Intent Aggregate
//!
//! One attempted broker order. Intents are never deleted; every status change
//! goes through [`OrderIntent::transition`], which validates the edge and
//! returns the audit record the repository persists with the new state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::errors::OrderError;
use crate::domain::order_execution::value_objects::{
    ExecutionCost, ExecutionReport, OrderPurpose, OrderSide, OrderStatus, OrderType, TradingMode,
};
use crate::domain::shared::{
    BrokerOrderId, ClientOrderId, Symbol, TradeId, TransitionContext, TransitionRecord, UserId,
    check_transition, round_price,
};

/// Command to create a new order intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderIntent {
    /// Client key.
    pub client_order_id: ClientOrderId,
    /// Owner.
    pub user_id: UserId,
    /// Symbol to trade.
    pub symbol: Symbol,
    /// Order side.
    pub side: OrderSide,
    /// Quantity.
    pub quantity: Decimal,
    /// Order type.
    pub order_type: OrderType,
    /// Limit price (required for limit orders).
    pub limit_price: Option<Decimal>,
    /// Stop price (required for stop orders).
    pub stop_price: Option<Decimal>,
    /// Why the order is placed.
    pub purpose: OrderPurpose,
    /// Paper or live.
    pub mode: TradingMode,
    /// Trade this order opens or closes.
    pub trade_id: Option<TradeId>,
}

impl NewOrderIntent {
    /// Validate the command parameters.
    ///
    /// # Errors
    ///
    /// Returns error if required parameters are missing or invalid.
    pub fn validate(&self) -> Result<(), OrderError> {
        self.symbol
            .validate()
            .map_err(|e| OrderError::invalid("symbol", e.to_string()))?;

        if self.quantity <= Decimal::ZERO {
            return Err(OrderError::invalid("quantity", "Quantity must be positive"));
        }

        if let Some(field) = self.order_type.missing_price(self.limit_price, self.stop_price) {
            return Err(OrderError::invalid(
                field,
                format!("{} orders require {field}", self.order_type),
            ));
        }

        for (field, price) in [("limit_price", self.limit_price), ("stop_price", self.stop_price)] {
            if price.is_some_and(|p| p <= Decimal::ZERO) {
                return Err(OrderError::invalid(field, "Price must be positive"));
            }
        }

        Ok(())
    }
}

/// Order intent aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIntent {
    client_order_id: ClientOrderId,
    broker_order_id: Option<BrokerOrderId>,
    user_id: UserId,
    symbol: Symbol,
    side: OrderSide,
    quantity: Decimal,
    order_type: OrderType,
    limit_price: Option<Decimal>,
    stop_price: Option<Decimal>,
    purpose: OrderPurpose,
    mode: TradingMode,
    trade_id: Option<TradeId>,
    status: OrderStatus,
    filled_qty: Decimal,
    avg_fill_price: Option<Decimal>,
    last_broker_status: Option<String>,
    rejection_reason: Option<String>,
    expected_cost: Option<ExecutionCost>,
    realized_cost: Option<ExecutionCost>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderIntent {
    /// Create an intent in the `created` state.
    #[must_use]
    pub fn new(command: NewOrderIntent, now: DateTime<Utc>) -> Self {
        Self {
            client_order_id: command.client_order_id,
            broker_order_id: None,
            user_id: command.user_id,
            symbol: command.symbol,
            side: command.side,
            quantity: command.quantity,
            order_type: command.order_type,
            limit_price: command.limit_price.map(round_price),
            stop_price: command.stop_price.map(round_price),
            purpose: command.purpose,
            mode: command.mode,
            trade_id: command.trade_id,
            status: OrderStatus::Created,
            filled_qty: Decimal::ZERO,
            avg_fill_price: None,
            last_broker_status: None,
            rejection_reason: None,
            expected_cost: None,
            realized_cost: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Minimal intent tracking a broker order nobody here placed.
    #[must_use]
    pub fn ghost(
        user_id: UserId,
        broker_order_id: BrokerOrderId,
        symbol: Symbol,
        side: OrderSide,
        quantity: Decimal,
        broker_status: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut intent = Self::new(
            NewOrderIntent {
                client_order_id: ClientOrderId::new(format!("ghost-{broker_order_id}")),
                user_id,
                symbol,
                side,
                quantity,
                order_type: OrderType::Market,
                limit_price: None,
                stop_price: None,
                purpose: OrderPurpose::Exit,
                mode: TradingMode::Live,
                trade_id: None,
            },
            now,
        );
        intent.broker_order_id = Some(broker_order_id);
        intent.last_broker_status = Some(broker_status.into());
        intent
    }

    /// Move to `to`, returning the audit record for the repository.
    ///
    /// # Errors
    ///
    /// Returns error on a no-op or illegal edge; the intent is unchanged.
    pub fn transition(
        &mut self,
        to: OrderStatus,
        context: &TransitionContext,
        now: DateTime<Utc>,
    ) -> Result<TransitionRecord, OrderError> {
        let from = self.status;
        check_transition(self.client_order_id.as_str(), from, to)?;

        self.status = to;
        self.updated_at = now;
        if to == OrderStatus::Rejected && self.rejection_reason.is_none() {
            self.rejection_reason = Some(context.reason.clone());
        }

        Ok(TransitionRecord::new(
            self.client_order_id.as_str(),
            from,
            to,
            context,
            now,
        ))
    }

    /// Record the cumulative fill reported by the broker.
    ///
    /// # Errors
    ///
    /// Returns error if the fill exceeds the order quantity or goes backwards.
    pub fn record_fill(
        &mut self,
        filled_qty: Decimal,
        avg_price: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if filled_qty > self.quantity {
            return Err(OrderError::FillExceedsQuantity {
                filled: filled_qty,
                quantity: self.quantity,
            });
        }
        if filled_qty < self.filled_qty {
            return Err(OrderError::FillWentBackwards {
                previous: self.filled_qty,
                reported: filled_qty,
            });
        }

        self.filled_qty = filled_qty;
        if let Some(price) = avg_price {
            self.avg_fill_price = Some(round_price(price));
        }
        self.updated_at = now;
        Ok(())
    }

    /// Attach the broker id once the broker acknowledges the order.
    pub fn assign_broker_order_id(&mut self, broker_order_id: BrokerOrderId, now: DateTime<Utc>) {
        self.broker_order_id = Some(broker_order_id);
        self.updated_at = now;
    }

    /// Remember the raw broker status string.
    pub fn note_broker_status(&mut self, status: impl Into<String>, now: DateTime<Utc>) {
        self.last_broker_status = Some(status.into());
        self.updated_at = now;
    }

    /// Set the rejection reason shown to the caller.
    pub fn set_rejection_reason(&mut self, reason: impl Into<String>) {
        self.rejection_reason = Some(reason.into());
    }

    /// Record the pre-trade cost estimate.
    pub fn set_expected_cost(&mut self, cost: ExecutionCost) {
        self.expected_cost = Some(cost);
    }

    /// Record the cost realized at fill.
    pub fn set_realized_cost(&mut self, cost: ExecutionCost) {
        self.realized_cost = Some(cost);
    }

    /// Caller-facing projection.
    #[must_use]
    pub fn report(&self) -> ExecutionReport {
        ExecutionReport {
            client_order_id: self.client_order_id.clone(),
            broker_order_id: self.broker_order_id.clone(),
            status: self.status,
            filled_qty: self.filled_qty,
            avg_price: self.avg_fill_price,
            rejection_reason: self.rejection_reason.clone(),
        }
    }

    // Getters

    /// Client key.
    #[must_use]
    pub const fn client_order_id(&self) -> &ClientOrderId {
        &self.client_order_id
    }

    /// Broker id, once acknowledged.
    #[must_use]
    pub const fn broker_order_id(&self) -> Option<&BrokerOrderId> {
        self.broker_order_id.as_ref()
    }

    /// Owner.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Symbol.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Side.
    #[must_use]
    pub const fn side(&self) -> OrderSide {
        self.side
    }

    /// Ordered quantity.
    #[must_use]
    pub const fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Order type.
    #[must_use]
    pub const fn order_type(&self) -> OrderType {
        self.order_type
    }

    /// Limit price.
    #[must_use]
    pub const fn limit_price(&self) -> Option<Decimal> {
        self.limit_price
    }

    /// Stop price.
    #[must_use]
    pub const fn stop_price(&self) -> Option<Decimal> {
        self.stop_price
    }

    /// Purpose.
    #[must_use]
    pub const fn purpose(&self) -> OrderPurpose {
        self.purpose
    }

    /// Paper or live.
    #[must_use]
    pub const fn mode(&self) -> TradingMode {
        self.mode
    }

    /// Linked trade.
    #[must_use]
    pub const fn trade_id(&self) -> Option<&TradeId> {
        self.trade_id.as_ref()
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    /// Cumulative filled quantity.
    #[must_use]
    pub const fn filled_qty(&self) -> Decimal {
        self.filled_qty
    }

    /// Average fill price.
    #[must_use]
    pub const fn avg_fill_price(&self) -> Option<Decimal> {
        self.avg_fill_price
    }

    /// Last raw broker status.
    #[must_use]
    pub fn last_broker_status(&self) -> Option<&str> {
        self.last_broker_status.as_deref()
    }

    /// Rejection reason.
    #[must_use]
    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    /// Pre-trade estimate.
    #[must_use]
    pub const fn expected_cost(&self) -> Option<&ExecutionCost> {
        self.expected_cost.as_ref()
    }

    /// Realized cost.
    #[must_use]
    pub const fn realized_cost(&self) -> Option<&ExecutionCost> {
        self.realized_cost.as_ref()
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last update time.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
