//! Trade Aggregate Root
//!
//! An open or closed position resulting from an entry fill, with its
//! protective stop and realized P&L.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::OrderSide;
use crate::domain::shared::{
    BrokerOrderId, ClientOrderId, Symbol, TradeId, TransitionContext, TransitionRecord, UserId,
    check_transition, round_price,
};
use crate::domain::trade_lifecycle::errors::TradeError;
use crate::domain::trade_lifecycle::services::{realized_pnl, risk_amount};
use crate::domain::trade_lifecycle::value_objects::{
    ExitReason, PositionState, StopAck, TradeSide,
};

/// Command to open a trade from a filled entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrade {
    /// Trade id.
    pub id: TradeId,
    /// Owner.
    pub user_id: UserId,
    /// Symbol.
    pub symbol: Symbol,
    /// Direction.
    pub side: TradeSide,
    /// Filled quantity.
    pub quantity: Decimal,
    /// Average entry fill.
    pub entry_price: Decimal,
    /// Protective stop level.
    pub stop_price: Decimal,
    /// Entry order that created the trade.
    pub entry_order_id: ClientOrderId,
    /// Paper trade.
    pub paper: bool,
}

/// Audit metadata attached to a trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeNote {
    /// When the note was written.
    pub at: DateTime<Utc>,
    /// Short machine-friendly kind.
    pub kind: String,
    /// Free text.
    pub message: String,
}

/// What a price observation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceObservation {
    /// The trailing stop ratcheted.
    pub stop_moved: bool,
    /// Price is at or through the current stop.
    pub stop_hit: bool,
}

/// Trade aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    id: TradeId,
    user_id: UserId,
    symbol: Symbol,
    side: TradeSide,
    quantity: Decimal,
    entry_price: Decimal,
    initial_stop: Decimal,
    current_stop: Decimal,
    highest_price: Decimal,
    lowest_price: Decimal,
    entry_order_id: ClientOrderId,
    paper: bool,
    state: PositionState,
    stop_order_id: Option<BrokerOrderId>,
    stop_ack: StopAck,
    stop_acked_at: Option<DateTime<Utc>>,
    entry_at: DateTime<Utc>,
    exit_at: Option<DateTime<Utc>>,
    exit_price: Option<Decimal>,
    realized_pnl: Option<Decimal>,
    exit_reason: Option<ExitReason>,
    notes: Vec<TradeNote>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    version: u64,
}

impl Trade {
    /// Open a trade in the `opening` state.
    ///
    /// # Errors
    ///
    /// Returns error if quantity or prices are not positive, or the stop is
    /// on the wrong side of entry.
    pub fn open(command: NewTrade, now: DateTime<Utc>) -> Result<Self, TradeError> {
        if command.quantity <= Decimal::ZERO {
            return Err(invalid("quantity", "Quantity must be positive"));
        }
        if command.entry_price <= Decimal::ZERO || command.stop_price <= Decimal::ZERO {
            return Err(invalid("price", "Entry and stop must be positive"));
        }
        let stop_on_loss_side = match command.side {
            TradeSide::Long => command.stop_price < command.entry_price,
            TradeSide::Short => command.stop_price > command.entry_price,
        };
        if !stop_on_loss_side {
            return Err(invalid("stop_price", "Stop must be on the losing side of entry"));
        }

        let entry = round_price(command.entry_price);
        let stop = round_price(command.stop_price);
        Ok(Self {
            id: command.id,
            user_id: command.user_id,
            symbol: command.symbol,
            side: command.side,
            quantity: command.quantity,
            entry_price: entry,
            initial_stop: stop,
            current_stop: stop,
            highest_price: entry,
            lowest_price: entry,
            entry_order_id: command.entry_order_id,
            paper: command.paper,
            state: PositionState::Opening,
            stop_order_id: None,
            stop_ack: StopAck::Pending,
            stop_acked_at: None,
            entry_at: now,
            exit_at: None,
            exit_price: None,
            realized_pnl: None,
            exit_reason: None,
            notes: Vec::new(),
            updated_at: now,
            version: 0,
        })
    }

    /// Move to `to`, returning the audit record for the repository.
    ///
    /// # Errors
    ///
    /// Returns error on a no-op or illegal edge; the trade is unchanged.
    pub fn transition(
        &mut self,
        to: PositionState,
        context: &TransitionContext,
        now: DateTime<Utc>,
    ) -> Result<TransitionRecord, TradeError> {
        let from = self.state;
        check_transition(self.id.as_str(), from, to)?;

        self.state = to;
        self.updated_at = now;
        Ok(TransitionRecord::new(self.id.as_str(), from, to, context, now))
    }

    /// Record broker acknowledgement of the protective stop.
    ///
    /// # Errors
    ///
    /// Returns error once the trade is closing, closed or in error.
    pub fn acknowledge_stop(
        &mut self,
        stop_order_id: Option<BrokerOrderId>,
        now: DateTime<Utc>,
    ) -> Result<(), TradeError> {
        self.ensure_live()?;
        if stop_order_id.is_some() {
            self.stop_order_id = stop_order_id;
        }
        self.stop_ack = StopAck::Acknowledged;
        self.stop_acked_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Remember the broker id of a submitted (not yet acknowledged) stop
    /// order, or of its replacement after a trailing move.
    ///
    /// # Errors
    ///
    /// Returns error once the trade is closing, closed or in error.
    pub fn attach_stop_order(
        &mut self,
        stop_order_id: BrokerOrderId,
        now: DateTime<Utc>,
    ) -> Result<(), TradeError> {
        self.ensure_live()?;
        self.stop_order_id = Some(stop_order_id);
        self.updated_at = now;
        Ok(())
    }

    /// Record a failed stop placement.
    ///
    /// # Errors
    ///
    /// Returns error once the trade is closing, closed or in error.
    pub fn mark_stop_failed(&mut self, now: DateTime<Utc>) -> Result<(), TradeError> {
        self.ensure_live()?;
        self.stop_ack = StopAck::Failed;
        self.updated_at = now;
        Ok(())
    }

    /// Still exposed at the broker: an open state with no recorded exit
    /// fill. A trade in `error` whose flatten filled holds nothing.
    #[must_use]
    pub fn holds_position(&self) -> bool {
        self.state.is_open() && self.exit_price.is_none()
    }

    /// Opening trade whose stop is still unconfirmed after `timeout`.
    #[must_use]
    pub fn stop_ack_overdue(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.state == PositionState::Opening
            && self.stop_ack != StopAck::Acknowledged
            && now - self.entry_at >= timeout
    }

    /// Track favorable extremes and ratchet the trailing stop.
    ///
    /// The trail distance is the initial risk (entry to initial stop), so the
    /// stop follows the best price seen at that distance and never loosens.
    ///
    /// # Errors
    ///
    /// Returns error unless the trade is `open`.
    pub fn observe_price(
        &mut self,
        price: Decimal,
        trailing: bool,
        now: DateTime<Utc>,
    ) -> Result<PriceObservation, TradeError> {
        if self.state != PositionState::Open {
            return Err(TradeError::WrongState {
                id: self.id.to_string(),
                state: self.state,
                expected: "open",
            });
        }

        self.highest_price = self.highest_price.max(price);
        self.lowest_price = self.lowest_price.min(price);

        let distance = (self.entry_price - self.initial_stop).abs();
        let mut observation = PriceObservation::default();
        if trailing {
            let candidate = match self.side {
                TradeSide::Long => round_price(self.highest_price - distance),
                TradeSide::Short => round_price(self.lowest_price + distance),
            };
            let tighter = match self.side {
                TradeSide::Long => candidate > self.current_stop,
                TradeSide::Short => candidate < self.current_stop,
            };
            if tighter {
                self.current_stop = candidate;
                observation.stop_moved = true;
            }
        }

        observation.stop_hit = match self.side {
            TradeSide::Long => price <= self.current_stop,
            TradeSide::Short => price >= self.current_stop,
        };
        self.updated_at = now;
        Ok(observation)
    }

    /// Close a `closing` trade at `exit_price`, computing realized P&L.
    ///
    /// # Errors
    ///
    /// Returns error unless the trade is `closing`.
    pub fn close(
        &mut self,
        exit_price: Decimal,
        reason: ExitReason,
        context: &TransitionContext,
        now: DateTime<Utc>,
    ) -> Result<TransitionRecord, TradeError> {
        if self.state != PositionState::Closing {
            return Err(TradeError::WrongState {
                id: self.id.to_string(),
                state: self.state,
                expected: "closing",
            });
        }

        let record = self.transition(PositionState::Closed, context, now)?;
        let exit = round_price(exit_price);
        self.exit_price = Some(exit);
        self.exit_at = Some(now);
        self.realized_pnl = Some(self.pnl_at(exit));
        self.exit_reason = Some(reason);
        Ok(record)
    }

    /// Record an emergency flatten while the trade sits in `error`.
    ///
    /// A filled flatten stores the exit fill and P&L but leaves the state
    /// alone; an operator or the exit retry path settles the trade.
    ///
    /// # Errors
    ///
    /// Returns error unless the trade is in `error`.
    pub fn record_flatten(
        &mut self,
        order_id: &ClientOrderId,
        fill_price: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<(), TradeError> {
        if self.state != PositionState::Error {
            return Err(TradeError::WrongState {
                id: self.id.to_string(),
                state: self.state,
                expected: "error",
            });
        }

        let message = match fill_price {
            Some(price) => {
                let exit = round_price(price);
                self.exit_price = Some(exit);
                self.exit_at = Some(now);
                self.realized_pnl = Some(self.pnl_at(exit));
                self.exit_reason = Some(ExitReason::StopProtectionFailure);
                format!("flatten {order_id} filled at {exit}")
            }
            None => format!("flatten {order_id} not confirmed"),
        };
        self.add_note("flatten_attempt", message, now);
        Ok(())
    }

    /// Append audit metadata. Allowed in every state.
    pub fn add_note(&mut self, kind: impl Into<String>, message: impl Into<String>, now: DateTime<Utc>) {
        self.notes.push(TradeNote {
            at: now,
            kind: kind.into(),
            message: message.into(),
        });
        self.updated_at = now;
    }

    /// Realized P&L if closed at `exit_price`.
    #[must_use]
    pub fn pnl_at(&self, exit_price: Decimal) -> Decimal {
        realized_pnl(self.side, self.entry_price, exit_price, self.quantity)
    }

    /// Capital at risk between entry and the current stop.
    #[must_use]
    pub fn open_risk(&self) -> Decimal {
        risk_amount(self.side, self.entry_price, self.current_stop, self.quantity)
    }

    /// Side of the order that closes this trade.
    #[must_use]
    pub const fn exit_side(&self) -> OrderSide {
        self.side.exit_side()
    }

    /// Advance the optimistic version. Repositories call this when a write
    /// lands, so the writer's copy stays current for its next save.
    pub fn advance_version(&mut self) {
        self.version += 1;
    }

    fn ensure_live(&self) -> Result<(), TradeError> {
        match self.state {
            PositionState::Opening | PositionState::Open => Ok(()),
            PositionState::Closing | PositionState::Closed => Err(TradeError::Frozen {
                id: self.id.to_string(),
                state: self.state,
            }),
            PositionState::Error => Err(TradeError::WrongState {
                id: self.id.to_string(),
                state: self.state,
                expected: "opening or open",
            }),
        }
    }

    // Getters

    /// Trade id.
    #[must_use]
    pub const fn id(&self) -> &TradeId {
        &self.id
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

    /// Direction.
    #[must_use]
    pub const fn side(&self) -> TradeSide {
        self.side
    }

    /// Position size.
    #[must_use]
    pub const fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Entry price.
    #[must_use]
    pub const fn entry_price(&self) -> Decimal {
        self.entry_price
    }

    /// Stop at entry.
    #[must_use]
    pub const fn initial_stop(&self) -> Decimal {
        self.initial_stop
    }

    /// Current (possibly trailed) stop.
    #[must_use]
    pub const fn current_stop(&self) -> Decimal {
        self.current_stop
    }

    /// Highest price seen.
    #[must_use]
    pub const fn highest_price(&self) -> Decimal {
        self.highest_price
    }

    /// Lowest price seen.
    #[must_use]
    pub const fn lowest_price(&self) -> Decimal {
        self.lowest_price
    }

    /// Entry order.
    #[must_use]
    pub const fn entry_order_id(&self) -> &ClientOrderId {
        &self.entry_order_id
    }

    /// Paper trade.
    #[must_use]
    pub const fn is_paper(&self) -> bool {
        self.paper
    }

    /// Position state.
    #[must_use]
    pub const fn state(&self) -> PositionState {
        self.state
    }

    /// Broker id of the protective stop.
    #[must_use]
    pub const fn stop_order_id(&self) -> Option<&BrokerOrderId> {
        self.stop_order_id.as_ref()
    }

    /// Stop acknowledgement state.
    #[must_use]
    pub const fn stop_ack(&self) -> StopAck {
        self.stop_ack
    }

    /// When the stop was acknowledged.
    #[must_use]
    pub const fn stop_acked_at(&self) -> Option<DateTime<Utc>> {
        self.stop_acked_at
    }

    /// Entry time.
    #[must_use]
    pub const fn entry_at(&self) -> DateTime<Utc> {
        self.entry_at
    }

    /// Exit time.
    #[must_use]
    pub const fn exit_at(&self) -> Option<DateTime<Utc>> {
        self.exit_at
    }

    /// Exit price.
    #[must_use]
    pub const fn exit_price(&self) -> Option<Decimal> {
        self.exit_price
    }

    /// Realized P&L.
    #[must_use]
    pub const fn realized_pnl(&self) -> Option<Decimal> {
        self.realized_pnl
    }

    /// Exit reason.
    #[must_use]
    pub const fn exit_reason(&self) -> Option<ExitReason> {
        self.exit_reason
    }

    /// Audit notes, oldest first.
    #[must_use]
    pub fn notes(&self) -> &[TradeNote] {
        &self.notes
    }

    /// Last update time.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Optimistic concurrency version: the number of stored writes.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }
}

fn invalid(field: &str, message: &str) -> TradeError {
    TradeError::InvalidParameters {
        field: field.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn long_trade() -> Trade {
        Trade::open(
            NewTrade {
                id: TradeId::new("t-1"),
                user_id: UserId::new("u-1"),
                symbol: Symbol::new("AAPL"),
                side: TradeSide::Long,
                quantity: dec!(10),
                entry_price: dec!(100),
                stop_price: dec!(95),
                entry_order_id: ClientOrderId::new("co-1"),
                paper: true,
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn ctx() -> TransitionContext {
        TransitionContext::new("test")
    }

    #[test]
    fn opens_in_opening_with_pending_stop() {
        let trade = long_trade();
        assert_eq!(trade.state(), PositionState::Opening);
        assert_eq!(trade.stop_ack(), StopAck::Pending);
        assert_eq!(trade.open_risk(), dec!(50));
    }

    #[test]
    fn rejects_stop_on_wrong_side() {
        let result = Trade::open(
            NewTrade {
                id: TradeId::new("t-2"),
                user_id: UserId::new("u-1"),
                symbol: Symbol::new("AAPL"),
                side: TradeSide::Short,
                quantity: dec!(10),
                entry_price: dec!(100),
                stop_price: dec!(95),
                entry_order_id: ClientOrderId::new("co-2"),
                paper: true,
            },
            Utc::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn overdue_only_while_opening_and_unacked() {
        let mut trade = long_trade();
        let later = trade.entry_at() + Duration::seconds(31);
        assert!(trade.stop_ack_overdue(later, Duration::seconds(30)));
        assert!(!trade.stop_ack_overdue(later, Duration::seconds(60)));

        trade.acknowledge_stop(Some(BrokerOrderId::new("stop-1")), later).unwrap();
        assert!(!trade.stop_ack_overdue(later, Duration::seconds(30)));
    }

    #[test]
    fn attached_stop_stays_pending_until_acknowledged() {
        let mut trade = long_trade();
        trade.attach_stop_order(BrokerOrderId::new("b-9"), Utc::now()).unwrap();
        assert_eq!(trade.stop_ack(), StopAck::Pending);
        assert_eq!(trade.stop_order_id().map(BrokerOrderId::as_str), Some("b-9"));

        trade.acknowledge_stop(None, Utc::now()).unwrap();
        assert_eq!(trade.stop_ack(), StopAck::Acknowledged);
        assert_eq!(trade.stop_order_id().map(BrokerOrderId::as_str), Some("b-9"));
    }

    #[test]
    fn trailing_stop_ratchets_up_only() {
        let mut trade = long_trade();
        trade.transition(PositionState::Open, &ctx(), Utc::now()).unwrap();

        let obs = trade.observe_price(dec!(110), true, Utc::now()).unwrap();
        assert!(obs.stop_moved);
        assert_eq!(trade.current_stop(), dec!(105));

        let obs = trade.observe_price(dec!(107), true, Utc::now()).unwrap();
        assert!(!obs.stop_moved);
        assert!(!obs.stop_hit);
        assert_eq!(trade.current_stop(), dec!(105));
        assert_eq!(trade.highest_price(), dec!(110));

        let obs = trade.observe_price(dec!(104.5), true, Utc::now()).unwrap();
        assert!(obs.stop_hit);
    }

    #[test]
    fn close_computes_pnl() {
        let mut trade = long_trade();
        trade.transition(PositionState::Open, &ctx(), Utc::now()).unwrap();
        trade.transition(PositionState::Closing, &ctx(), Utc::now()).unwrap();
        trade.close(dec!(103), ExitReason::Manual, &ctx(), Utc::now()).unwrap();

        assert_eq!(trade.state(), PositionState::Closed);
        assert_eq!(trade.realized_pnl(), Some(dec!(30)));
        assert_eq!(trade.exit_reason(), Some(ExitReason::Manual));
    }

    #[test]
    fn closed_trade_cannot_close_again() {
        let mut trade = long_trade();
        trade.transition(PositionState::Closing, &ctx(), Utc::now()).unwrap();
        trade.close(dec!(103), ExitReason::Manual, &ctx(), Utc::now()).unwrap();

        let err = trade.close(dec!(90), ExitReason::Manual, &ctx(), Utc::now()).unwrap_err();
        assert!(matches!(err, TradeError::WrongState { .. }));
        assert_eq!(trade.realized_pnl(), Some(dec!(30)));
    }

    #[test]
    fn frozen_trade_rejects_stop_changes_but_takes_notes() {
        let mut trade = long_trade();
        trade.transition(PositionState::Closing, &ctx(), Utc::now()).unwrap();
        assert!(matches!(
            trade.acknowledge_stop(None, Utc::now()),
            Err(TradeError::Frozen { .. })
        ));
        trade.add_note("operator", "looked at it", Utc::now());
        assert_eq!(trade.notes().len(), 1);
    }

    #[test]
    fn flatten_recorded_in_error_state() {
        let mut trade = long_trade();
        trade.transition(PositionState::Error, &ctx(), Utc::now()).unwrap();
        trade
            .record_flatten(&ClientOrderId::new("flat-1"), Some(dec!(96)), Utc::now())
            .unwrap();

        assert_eq!(trade.state(), PositionState::Error);
        assert_eq!(trade.realized_pnl(), Some(dec!(-40)));
        assert_eq!(trade.notes()[0].kind, "flatten_attempt");
        assert!(!trade.holds_position());
    }

    #[test]
    fn unfilled_flatten_leaves_the_position_held() {
        let mut trade = long_trade();
        assert!(trade.holds_position());
        trade.transition(PositionState::Error, &ctx(), Utc::now()).unwrap();
        trade
            .record_flatten(&ClientOrderId::new("flat-1"), None, Utc::now())
            .unwrap();

        assert!(trade.holds_position());
        assert_eq!(trade.exit_price(), None);
        assert_eq!(trade.notes()[0].message, "flatten flat-1 not confirmed");
    }
}
