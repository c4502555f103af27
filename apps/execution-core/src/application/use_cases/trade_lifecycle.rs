//! Trade Lifecycle Use Case
//!
//! Opens trades from filled entries, keeps a protective stop working for
//! each, follows prices for the trailing stop and settles closed trades.
//!
//! `finalize` is the single place a trade becomes `closed`. It is a
//! compare-and-write from `closing`, so two racing finalizers cannot both
//! win; the loser reads back the winner's P&L and nothing is counted twice.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::circuit_breaker::CircuitBreakerUseCase;
use crate::application::ports::{
    AuditEvent, AuditSink, BrokerError, BrokerPort, Clock, Notification, NotificationKind,
    NotificationPort, PlaceOrderRequest,
};
use crate::application::services::CooldownTracker;
use crate::domain::order_execution::{
    NewOrderIntent, OrderError, OrderIntent, OrderIntentRepository, OrderPurpose,
    OrderStateMachine, OrderStatus, OrderType, TradingMode,
};
use crate::domain::shared::{
    BrokerOrderId, ClientOrderId, RepositoryError, Symbol, TradeId, TransitionContext,
};
use crate::domain::trade_lifecycle::{
    ExitReason, NewTrade, PositionState, StopAck, Trade, TradeError, TradeRepository, TradeSide,
};
use crate::observability::record_broker_failure;

/// Compare-and-write attempts before a trade update gives up.
const MAX_TRADE_WRITE_ATTEMPTS: u32 = 4;

/// Trade lifecycle errors.
#[derive(Debug, Error)]
pub enum TradeLifecycleError {
    /// Trade aggregate refused the change.
    #[error(transparent)]
    Trade(#[from] TradeError),

    /// Stop order intent refused the change.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Storage failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// No such trade.
    #[error("trade not found: {0}")]
    NotFound(TradeId),

    /// Entry order has no complete fill to open a trade from.
    #[error("entry {client_order_id} is {status}, not filled")]
    EntryNotFilled {
        /// Entry client key.
        client_order_id: ClientOrderId,
        /// Entry status.
        status: OrderStatus,
    },

    /// Lost every compare-and-write race.
    #[error("trade {0} kept changing underneath the writer")]
    Contended(TradeId),
}

/// Result of settling a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizeOutcome {
    /// Realized P&L stored on the trade.
    pub realized_pnl: Decimal,
    /// Whether this call closed the trade (false on replay).
    pub newly_closed: bool,
}

/// Use case owning trade state after entry.
pub struct TradeLifecycleUseCase {
    trades: Arc<dyn TradeRepository>,
    orders: Arc<dyn OrderIntentRepository>,
    broker: Arc<dyn BrokerPort>,
    breaker: Arc<CircuitBreakerUseCase>,
    cooldowns: Arc<CooldownTracker>,
    notifier: Arc<dyn NotificationPort>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    trailing_stops: bool,
}

impl TradeLifecycleUseCase {
    /// Create the use case.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        trades: Arc<dyn TradeRepository>,
        orders: Arc<dyn OrderIntentRepository>,
        broker: Arc<dyn BrokerPort>,
        breaker: Arc<CircuitBreakerUseCase>,
        cooldowns: Arc<CooldownTracker>,
        notifier: Arc<dyn NotificationPort>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        trailing_stops: bool,
    ) -> Self {
        Self {
            trades,
            orders,
            broker,
            breaker,
            cooldowns,
            notifier,
            audit,
            clock,
            trailing_stops,
        }
    }

    /// Load a trade.
    pub async fn get(&self, trade_id: &TradeId) -> Result<Trade, TradeLifecycleError> {
        self.trades
            .find(trade_id)
            .await?
            .ok_or_else(|| TradeLifecycleError::NotFound(trade_id.clone()))
    }

    /// Open a trade from a filled entry and put its protective stop in place.
    ///
    /// Replaying the same entry returns the trade it already opened.
    pub async fn open_from_fill(
        &self,
        entry: &OrderIntent,
        stop_price: Decimal,
    ) -> Result<Trade, TradeLifecycleError> {
        let (OrderStatus::Filled, Some(entry_price)) = (entry.status(), entry.avg_fill_price())
        else {
            return Err(TradeLifecycleError::EntryNotFilled {
                client_order_id: entry.client_order_id().clone(),
                status: entry.status(),
            });
        };

        let now = self.clock.now();
        let trade_id = entry
            .trade_id()
            .cloned()
            .unwrap_or_else(|| TradeId::new(format!("trade-{}", entry.client_order_id())));
        let mut trade = Trade::open(
            NewTrade {
                id: trade_id.clone(),
                user_id: entry.user_id().clone(),
                symbol: entry.symbol().clone(),
                side: TradeSide::from_entry(entry.side()),
                quantity: entry.filled_qty(),
                entry_price,
                stop_price,
                entry_order_id: entry.client_order_id().clone(),
                paper: entry.mode().is_paper(),
            },
            now,
        )?;

        match self.trades.insert(&trade).await {
            Ok(()) => {}
            Err(RepositoryError::Duplicate { .. }) => {
                debug!(%trade_id, "Entry already opened a trade");
                return self.get(&trade_id).await;
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            %trade_id,
            user_id = %trade.user_id(),
            symbol = %trade.symbol(),
            side = ?trade.side(),
            quantity = %trade.quantity(),
            entry_price = %trade.entry_price(),
            stop = %trade.current_stop(),
            paper = trade.is_paper(),
            "Trade opened"
        );
        self.protect(&mut trade).await?;

        self.notifier
            .publish_best_effort(
                Notification::new(
                    NotificationKind::Position,
                    format!("Opened {} {} {}", trade.side(), trade.quantity(), trade.symbol()),
                    self.clock.now(),
                )
                .for_user(trade.user_id().clone())
                .with_payload(json!({
                    "trade_id": trade.id(),
                    "state": trade.state(),
                    "stop": trade.current_stop(),
                })),
            )
            .await;
        Ok(trade)
    }

    /// Put the protective stop in place. Paper stops are simulated and
    /// acknowledged at once; live stops go to the broker and stay pending
    /// until the broker confirms them.
    async fn protect(&self, trade: &mut Trade) -> Result<(), TradeLifecycleError> {
        if trade.is_paper() {
            trade.acknowledge_stop(None, self.clock.now())?;
            self.move_trade(trade, PositionState::Open, "stop_acknowledged")
                .await?;
            return Ok(());
        }

        let client_order_id = ClientOrderId::new(format!("stop-{}", trade.id()));
        match self.submit_stop(trade, client_order_id).await? {
            Some(stop_order_id) => {
                trade.attach_stop_order(stop_order_id, self.clock.now())?;
            }
            None => {
                trade.mark_stop_failed(self.clock.now())?;
            }
        }
        self.trades.save(trade).await?;
        Ok(())
    }

    /// Place a stop order for `trade` and track it as an intent. Returns
    /// `None` when the broker refused or could not be reached; the stop
    /// enforcer escalates the trade once its acknowledgement is overdue.
    async fn submit_stop(
        &self,
        trade: &Trade,
        client_order_id: ClientOrderId,
    ) -> Result<Option<BrokerOrderId>, TradeLifecycleError> {
        let now = self.clock.now();
        let mut intent = OrderIntent::new(
            NewOrderIntent {
                client_order_id: client_order_id.clone(),
                user_id: trade.user_id().clone(),
                symbol: trade.symbol().clone(),
                side: trade.exit_side(),
                quantity: trade.quantity(),
                order_type: OrderType::Stop,
                limit_price: None,
                stop_price: Some(trade.current_stop()),
                purpose: OrderPurpose::StopLoss,
                mode: TradingMode::Live,
                trade_id: Some(trade.id().clone()),
            },
            now,
        );
        match self.orders.insert(&intent).await {
            Ok(()) => {}
            Err(RepositoryError::Duplicate { .. }) => {
                let existing = self.orders.find(&client_order_id).await?;
                return Ok(existing.and_then(|i| i.broker_order_id().cloned()));
            }
            Err(e) => return Err(e.into()),
        }

        let request = PlaceOrderRequest::stop(
            client_order_id.clone(),
            trade.symbol().clone(),
            trade.exit_side(),
            trade.quantity(),
            trade.current_stop(),
        );
        match self.broker.place_order(trade.user_id(), request).await {
            Ok(broker_order_id) => {
                intent.assign_broker_order_id(broker_order_id.clone(), self.clock.now());
                self.advance_intent(&mut intent, OrderStatus::Sent, "stop_submitted")
                    .await?;
                info!(
                    trade_id = %trade.id(),
                    %client_order_id,
                    %broker_order_id,
                    stop = %trade.current_stop(),
                    "Protective stop submitted"
                );
                Ok(Some(broker_order_id))
            }
            Err(e) => {
                record_broker_failure("place_order", e.kind());
                error!(
                    trade_id = %trade.id(),
                    %client_order_id,
                    error = %e,
                    "Protective stop submission failed"
                );
                intent.note_broker_status(e.to_string(), self.clock.now());
                let target = if matches!(e, BrokerError::Rejected { .. }) {
                    intent.set_rejection_reason(format!("BROKER_REJECTED: {e}"));
                    OrderStatus::Rejected
                } else {
                    OrderStatus::Unknown
                };
                self.advance_intent(&mut intent, target, "stop_submit_failed")
                    .await?;
                Ok(None)
            }
        }
    }

    /// Ask the broker whether a pending live stop is working yet. Returns
    /// true once the trade is protected (or already settled by its stop).
    pub async fn confirm_stop(&self, trade: &Trade) -> Result<bool, TradeLifecycleError> {
        if trade.is_paper()
            || trade.state() != PositionState::Opening
            || trade.stop_ack() == StopAck::Acknowledged
        {
            return Ok(false);
        }
        let Some(stop_order_id) = trade.stop_order_id() else {
            return Ok(false);
        };

        let order = match self
            .broker
            .get_order_status(trade.user_id(), stop_order_id)
            .await
        {
            Ok(order) => order,
            Err(e) => {
                record_broker_failure("get_order_status", e.kind());
                warn!(trade_id = %trade.id(), error = %e, "Stop status check failed");
                return Ok(false);
            }
        };

        match order.status {
            OrderStatus::Acked | OrderStatus::PartiallyFilled => {
                self.acknowledge_stop(trade.id(), Some(order.broker_order_id))
                    .await?;
                Ok(true)
            }
            OrderStatus::Filled => {
                let price = order.avg_price.unwrap_or_else(|| trade.current_stop());
                self.finalize(trade.id(), price, ExitReason::StopLoss).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Record broker acknowledgement of a trade's stop and move it to `open`.
    pub async fn acknowledge_stop(
        &self,
        trade_id: &TradeId,
        stop_order_id: Option<BrokerOrderId>,
    ) -> Result<Trade, TradeLifecycleError> {
        let mut trade = self.get(trade_id).await?;
        if trade.state() == PositionState::Open && trade.stop_ack() == StopAck::Acknowledged {
            return Ok(trade);
        }

        trade.acknowledge_stop(stop_order_id, self.clock.now())?;
        self.move_trade(&mut trade, PositionState::Open, "stop_acknowledged")
            .await?;
        info!(%trade_id, stop_order_id = ?trade.stop_order_id(), "Protective stop acknowledged");

        if let Some(mut intent) = self.stop_intent(&trade).await? {
            if intent.status() != OrderStatus::Acked {
                if let Err(e) = self
                    .advance_intent(&mut intent, OrderStatus::Acked, "stop_acknowledged")
                    .await
                {
                    warn!(%trade_id, error = %e, "Could not mark stop intent acknowledged");
                }
            }
        }
        Ok(trade)
    }

    /// Feed a price to every open trade on `symbol`: track extremes, ratchet
    /// trailing stops and return paper trades whose stop was crossed. Live
    /// stops are working at the broker and trigger there.
    pub async fn on_price(
        &self,
        symbol: &Symbol,
        price: Decimal,
    ) -> Result<Vec<TradeId>, TradeLifecycleError> {
        let now = self.clock.now();
        let mut stop_hits = Vec::new();

        let open = self.trades.find_by_state(PositionState::Open).await?;
        for mut trade in open.into_iter().filter(|t| t.symbol() == symbol) {
            let observation = trade.observe_price(price, self.trailing_stops, now)?;
            match self.trades.save(&mut trade).await {
                Ok(()) => {}
                Err(e) if e.is_conflict() => {
                    debug!(trade_id = %trade.id(), "Trade changed during price update, skipping");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            if observation.stop_moved {
                debug!(trade_id = %trade.id(), stop = %trade.current_stop(), "Trailing stop moved");
                if !trade.is_paper() {
                    self.replace_stop(&mut trade).await?;
                }
            }
            if observation.stop_hit && trade.is_paper() {
                info!(trade_id = %trade.id(), %price, stop = %trade.current_stop(), "Paper stop crossed");
                stop_hits.push(trade.id().clone());
            }
        }
        Ok(stop_hits)
    }

    /// Cancel the working live stop and submit one at the trailed level.
    async fn replace_stop(&self, trade: &mut Trade) -> Result<(), TradeLifecycleError> {
        self.cancel_stop(trade).await;

        let generation = trade
            .notes()
            .iter()
            .filter(|n| n.kind == "stop_replaced")
            .count()
            + 1;
        let client_order_id = ClientOrderId::new(format!("stop-{}-{generation}", trade.id()));
        let now = self.clock.now();
        if let Some(stop_order_id) = self.submit_stop(trade, client_order_id).await? {
            trade.attach_stop_order(stop_order_id, now)?;
            trade.add_note(
                "stop_replaced",
                format!("stop trailed to {}", trade.current_stop()),
                now,
            );
        } else {
            trade.add_note(
                "stop_replace_failed",
                format!("could not trail stop to {}", trade.current_stop()),
                now,
            );
        }
        self.trades.save(trade).await?;
        Ok(())
    }

    /// Move a trade to `closing` (if it is not already) and pull its live
    /// stop so the stop and the exit cannot both fill.
    pub async fn begin_exit(
        &self,
        trade_id: &TradeId,
        reason: ExitReason,
    ) -> Result<Trade, TradeLifecycleError> {
        for _ in 0..MAX_TRADE_WRITE_ATTEMPTS {
            let mut trade = self.get(trade_id).await?;
            if matches!(trade.state(), PositionState::Closing | PositionState::Closed) {
                return Ok(trade);
            }
            if self.mark_closing(&mut trade, reason).await? {
                return Ok(trade);
            }
        }
        Err(TradeLifecycleError::Contended(trade_id.clone()))
    }

    /// Settle a trade at `exit_price`.
    ///
    /// The first call closes the trade, records the result with the circuit
    /// breaker and starts the symbol cooldown. Later calls return the stored
    /// P&L and change nothing.
    pub async fn finalize(
        &self,
        trade_id: &TradeId,
        exit_price: Decimal,
        reason: ExitReason,
    ) -> Result<FinalizeOutcome, TradeLifecycleError> {
        for _ in 0..MAX_TRADE_WRITE_ATTEMPTS {
            let mut trade = self.get(trade_id).await?;
            // A filled flatten already fixed the exit and counted its result.
            let flattened = trade.exit_price();
            let exit_price = flattened.unwrap_or(exit_price);
            match trade.state() {
                PositionState::Closed => {
                    debug!(%trade_id, "Trade already closed, returning stored result");
                    return Ok(FinalizeOutcome {
                        realized_pnl: trade.realized_pnl().unwrap_or_default(),
                        newly_closed: false,
                    });
                }
                PositionState::Closing => {}
                _ => {
                    if !self.mark_closing(&mut trade, reason).await? {
                        continue;
                    }
                }
            }

            let context = TransitionContext::new(reason.as_str())
                .with_detail(format!("exit at {exit_price}"));
            let record = trade.close(exit_price, reason, &context, self.clock.now())?;
            match self
                .trades
                .save_transition(&mut trade, PositionState::Closing, &record)
                .await
            {
                Ok(()) => {
                    let realized_pnl = trade.realized_pnl().unwrap_or_default();
                    if flattened.is_none() {
                        self.count_result(&trade, realized_pnl).await;
                    }
                    self.on_closed(&trade, realized_pnl).await;
                    return Ok(FinalizeOutcome {
                        realized_pnl,
                        newly_closed: true,
                    });
                }
                Err(e) if e.is_conflict() => {
                    debug!(%trade_id, "Lost finalize race, re-reading");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(TradeLifecycleError::Contended(trade_id.clone()))
    }

    /// Move a trade that just failed protection to `error`.
    pub async fn mark_error(
        &self,
        trade: &mut Trade,
        detail: &str,
    ) -> Result<bool, TradeLifecycleError> {
        let expected = trade.state();
        let context = TransitionContext::new("STOP_LOSS_FAILURE").with_detail(detail);
        let record = trade.transition(PositionState::Error, &context, self.clock.now())?;
        match self.trades.save_transition(trade, expected, &record).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_conflict() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist non-state changes to a trade (notes, stop changes).
    pub async fn save(&self, trade: &mut Trade) -> Result<(), TradeLifecycleError> {
        Ok(self.trades.save(trade).await?)
    }

    /// Record an emergency flatten on a trade in `error`. A fill is the
    /// trade's exit: the trade stays in `error` with its P&L, and the
    /// result counts toward cooldowns and loss limits here, once.
    pub async fn record_flatten(
        &self,
        trade: &mut Trade,
        order_id: &ClientOrderId,
        fill_price: Option<Decimal>,
    ) -> Result<(), TradeLifecycleError> {
        trade.record_flatten(order_id, fill_price, self.clock.now())?;
        self.trades.save(trade).await?;

        if let (Some(_), Some(realized_pnl)) = (fill_price, trade.realized_pnl()) {
            info!(
                trade_id = %trade.id(),
                exit_price = ?trade.exit_price(),
                %realized_pnl,
                "Trade flattened, held in error for review"
            );
            self.count_result(trade, realized_pnl).await;
        }
        Ok(())
    }

    /// Cancel a trade's live stop order, best effort.
    pub async fn cancel_stop(&self, trade: &Trade) {
        if trade.is_paper() {
            return;
        }
        let Some(stop_order_id) = trade.stop_order_id() else {
            return;
        };

        match self.broker.cancel_order(trade.user_id(), stop_order_id).await {
            Ok(()) | Err(BrokerError::NotFound { .. }) => {
                debug!(trade_id = %trade.id(), %stop_order_id, "Protective stop cancelled");
            }
            Err(e) => {
                record_broker_failure("cancel_order", e.kind());
                warn!(trade_id = %trade.id(), %stop_order_id, error = %e, "Stop cancel failed");
                return;
            }
        }

        match self.orders.find_by_broker_id(stop_order_id).await {
            Ok(Some(mut intent)) if intent.status().is_working() => {
                if let Err(e) = self
                    .advance_intent(&mut intent, OrderStatus::Cancelled, "stop_cancelled")
                    .await
                {
                    warn!(trade_id = %trade.id(), error = %e, "Could not mark stop intent cancelled");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(trade_id = %trade.id(), error = %e, "Stop intent lookup failed"),
        }
    }

    /// Transition to `closing` with compare-and-write. Returns false if
    /// another writer moved the trade first.
    async fn mark_closing(
        &self,
        trade: &mut Trade,
        reason: ExitReason,
    ) -> Result<bool, TradeLifecycleError> {
        let expected = trade.state();
        let context = TransitionContext::new(reason.as_str());
        let record = trade.transition(PositionState::Closing, &context, self.clock.now())?;
        match self.trades.save_transition(trade, expected, &record).await {
            Ok(()) => {
                info!(trade_id = %trade.id(), from = %expected, reason = %reason, "Trade closing");
                self.cancel_stop(trade).await;
                Ok(true)
            }
            Err(e) if e.is_conflict() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn move_trade(
        &self,
        trade: &mut Trade,
        to: PositionState,
        reason: &str,
    ) -> Result<(), TradeLifecycleError> {
        let expected = trade.state();
        let record = trade.transition(to, &TransitionContext::new(reason), self.clock.now())?;
        self.trades.save_transition(trade, expected, &record).await?;
        Ok(())
    }

    async fn stop_intent(&self, trade: &Trade) -> Result<Option<OrderIntent>, TradeLifecycleError> {
        if let Some(broker_id) = trade.stop_order_id() {
            if let Some(intent) = self.orders.find_by_broker_id(broker_id).await? {
                return Ok(Some(intent));
            }
        }
        Ok(self
            .orders
            .find(&ClientOrderId::new(format!("stop-{}", trade.id())))
            .await?)
    }

    async fn advance_intent(
        &self,
        intent: &mut OrderIntent,
        to: OrderStatus,
        reason: &str,
    ) -> Result<(), TradeLifecycleError> {
        let context = TransitionContext::new(reason);
        for step in OrderStateMachine::path(intent.status(), to) {
            let expected = intent.status();
            let record = intent.transition(step, &context, self.clock.now())?;
            self.orders.save_transition(intent, expected, &record).await?;
        }
        Ok(())
    }

    /// Start the symbol cooldown and feed the loss supervisor.
    async fn count_result(&self, trade: &Trade, realized_pnl: Decimal) {
        self.cooldowns
            .record_exit(trade.user_id(), trade.symbol(), self.clock.now());
        if let Err(e) = self
            .breaker
            .record_trade_result(trade.user_id(), realized_pnl)
            .await
        {
            error!(trade_id = %trade.id(), error = %e, "Failed to record trade result with circuit breaker");
        }
    }

    async fn on_closed(&self, trade: &Trade, realized_pnl: Decimal) {
        let now = self.clock.now();
        info!(
            trade_id = %trade.id(),
            user_id = %trade.user_id(),
            symbol = %trade.symbol(),
            exit_price = ?trade.exit_price(),
            %realized_pnl,
            reason = ?trade.exit_reason(),
            "Trade closed"
        );

        let payload = json!({
            "trade_id": trade.id(),
            "exit_price": trade.exit_price(),
            "realized_pnl": realized_pnl,
            "reason": trade.exit_reason(),
        });
        self.audit
            .record_best_effort(
                AuditEvent::new(
                    "trade",
                    "closed",
                    format!("Closed {} {} P&L {realized_pnl}", trade.symbol(), trade.id()),
                    now,
                )
                .for_user(trade.user_id().clone())
                .with_metadata(payload.clone()),
            )
            .await;
        self.notifier
            .publish_best_effort(
                Notification::new(
                    NotificationKind::Position,
                    format!("Closed {} P&L {realized_pnl}", trade.symbol()),
                    now,
                )
                .for_user(trade.user_id().clone())
                .with_payload(payload),
            )
            .await;
    }
}
