//! Exit Retry Request Aggregate
//!
//! Queued work item for closing one trade. A request is pending until it is
//! resolved by a confirmed exit or dead-lettered after its budget runs out;
//! both outcomes are final.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::exit_retry::errors::ExitRetryRequestError;
use crate::domain::order_execution::OrderSide;
use crate::domain::shared::{ClientOrderId, ExitRetryId, Symbol, TradeId, UserId};
use crate::domain::trade_lifecycle::{ExitReason, Trade};

/// Exit retry request aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitRetryRequest {
    id: ExitRetryId,
    trade_id: TradeId,
    user_id: UserId,
    symbol: Symbol,
    quantity: Decimal,
    side: OrderSide,
    paper: bool,
    reason: ExitReason,
    attempts: u32,
    resolved: bool,
    dead_lettered: bool,
    next_attempt_at: DateTime<Utc>,
    last_error: Option<String>,
    last_client_order_id: Option<ClientOrderId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl ExitRetryRequest {
    /// Queue an exit for `trade`, due immediately.
    #[must_use]
    pub fn for_trade(trade: &Trade, reason: ExitReason, now: DateTime<Utc>) -> Self {
        Self {
            id: ExitRetryId::generate(),
            trade_id: trade.id().clone(),
            user_id: trade.user_id().clone(),
            symbol: trade.symbol().clone(),
            quantity: trade.quantity(),
            side: trade.exit_side(),
            paper: trade.is_paper(),
            reason,
            attempts: 0,
            resolved: false,
            dead_lettered: false,
            next_attempt_at: now,
            last_error: None,
            last_client_order_id: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Treat `client_order_id` as the previous attempt, so the first exit
    /// settles or cancels that order before placing its own.
    #[must_use]
    pub fn after_order(mut self, client_order_id: ClientOrderId) -> Self {
        self.last_client_order_id = Some(client_order_id);
        self
    }

    /// Neither resolved nor dead-lettered.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        !self.resolved && !self.dead_lettered
    }

    /// Pending and its next attempt time has passed.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.next_attempt_at <= now
    }

    /// Start the next attempt and return its client order id
    /// (`exit-{trade}-{attempt}`).
    ///
    /// # Errors
    ///
    /// Returns error if the request is already resolved or dead-lettered.
    pub fn begin_attempt(&mut self, now: DateTime<Utc>) -> Result<ClientOrderId, ExitRetryRequestError> {
        self.ensure_pending()?;
        self.attempts += 1;
        let client_order_id = ClientOrderId::new(format!("exit-{}-{}", self.trade_id, self.attempts));
        self.last_client_order_id = Some(client_order_id.clone());
        self.touch(now);
        Ok(client_order_id)
    }

    /// Mark the exit confirmed. Returns `false` if already settled.
    pub fn resolve(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.resolved = true;
        self.last_error = None;
        self.touch(now);
        true
    }

    /// Record a failed attempt and when to try again.
    ///
    /// # Errors
    ///
    /// Returns error if the request is already resolved or dead-lettered.
    pub fn schedule_retry(
        &mut self,
        at: DateTime<Utc>,
        error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ExitRetryRequestError> {
        self.ensure_pending()?;
        self.next_attempt_at = at;
        self.last_error = Some(error.into());
        self.touch(now);
        Ok(())
    }

    /// Give up on the request. Returns `true` only the first time, so the
    /// caller escalates exactly once.
    pub fn dead_letter(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.dead_lettered = true;
        self.last_error = Some(error.into());
        self.touch(now);
        true
    }

    fn ensure_pending(&self) -> Result<(), ExitRetryRequestError> {
        if self.resolved {
            return Err(ExitRetryRequestError::Settled {
                id: self.id.to_string(),
                outcome: "resolved",
            });
        }
        if self.dead_lettered {
            return Err(ExitRetryRequestError::Settled {
                id: self.id.to_string(),
                outcome: "dead_lettered",
            });
        }
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }

    // Getters

    /// Request id.
    #[must_use]
    pub const fn id(&self) -> &ExitRetryId {
        &self.id
    }

    /// Trade being closed.
    #[must_use]
    pub const fn trade_id(&self) -> &TradeId {
        &self.trade_id
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

    /// Quantity to close.
    #[must_use]
    pub const fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Exit order side.
    #[must_use]
    pub const fn side(&self) -> OrderSide {
        self.side
    }

    /// Paper trade.
    #[must_use]
    pub const fn is_paper(&self) -> bool {
        self.paper
    }

    /// Why the exit was requested.
    #[must_use]
    pub const fn reason(&self) -> ExitReason {
        self.reason
    }

    /// Attempts made so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Exit confirmed.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Budget exhausted or failed fatally.
    #[must_use]
    pub const fn is_dead_lettered(&self) -> bool {
        self.dead_lettered
    }

    /// Next attempt time.
    #[must_use]
    pub const fn next_attempt_at(&self) -> DateTime<Utc> {
        self.next_attempt_at
    }

    /// Error from the last failed attempt.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Client order id of the latest attempt.
    #[must_use]
    pub const fn last_client_order_id(&self) -> Option<&ClientOrderId> {
        self.last_client_order_id.as_ref()
    }

    /// Created timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last modification timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Optimistic concurrency version, bumped on every change.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trade_lifecycle::{NewTrade, TradeSide};
    use rust_decimal_macros::dec;

    fn request() -> ExitRetryRequest {
        let trade = Trade::open(
            NewTrade {
                id: TradeId::new("t-1"),
                user_id: UserId::new("u-1"),
                symbol: Symbol::new("MSFT"),
                side: TradeSide::Short,
                quantity: dec!(5),
                entry_price: dec!(300),
                stop_price: dec!(310),
                entry_order_id: ClientOrderId::new("co-1"),
                paper: false,
            },
            Utc::now(),
        )
        .unwrap();
        ExitRetryRequest::for_trade(&trade, ExitReason::RiskBreach, Utc::now())
    }

    #[test]
    fn derives_exit_from_trade() {
        let req = request();
        assert_eq!(req.side(), OrderSide::Buy);
        assert_eq!(req.quantity(), dec!(5));
        assert!(req.is_due(Utc::now()));
        assert_eq!(req.attempts(), 0);
    }

    #[test]
    fn attempts_increase_and_name_client_orders() {
        let mut req = request();
        let first = req.begin_attempt(Utc::now()).unwrap();
        let second = req.begin_attempt(Utc::now()).unwrap();

        assert_eq!(first.as_str(), "exit-t-1-1");
        assert_eq!(second.as_str(), "exit-t-1-2");
        assert_eq!(req.attempts(), 2);
        assert_eq!(req.last_client_order_id(), Some(&second));
    }

    #[test]
    fn earlier_order_is_seen_as_the_previous_attempt() {
        let mut req = request().after_order(ClientOrderId::new("flatten-t-1"));
        assert_eq!(req.last_client_order_id().map(ClientOrderId::as_str), Some("flatten-t-1"));
        assert_eq!(req.attempts(), 0);
        assert_eq!(req.version(), 0);

        let first = req.begin_attempt(Utc::now()).unwrap();
        assert_eq!(first.as_str(), "exit-t-1-1");
    }

    #[test]
    fn scheduled_retry_is_not_due_early() {
        let mut req = request();
        let now = Utc::now();
        req.begin_attempt(now).unwrap();
        req.schedule_retry(now + chrono::Duration::seconds(4), "timeout", now)
            .unwrap();

        assert!(!req.is_due(now));
        assert!(req.is_due(now + chrono::Duration::seconds(4)));
        assert_eq!(req.last_error(), Some("timeout"));
    }

    #[test]
    fn dead_letter_happens_once() {
        let mut req = request();
        assert!(req.dead_letter("exhausted", Utc::now()));
        assert!(!req.dead_letter("exhausted again", Utc::now()));
        assert_eq!(req.last_error(), Some("exhausted"));

        let err = req.begin_attempt(Utc::now()).unwrap_err();
        assert_eq!(
            err,
            ExitRetryRequestError::Settled {
                id: req.id().to_string(),
                outcome: "dead_lettered"
            }
        );
        assert!(!req.resolve(Utc::now()));
    }

    #[test]
    fn resolved_request_rejects_attempts() {
        let mut req = request();
        assert!(req.resolve(Utc::now()));
        assert!(!req.is_pending());
        assert!(req.begin_attempt(Utc::now()).is_err());
        assert!(!req.dead_letter("late", Utc::now()));
    }

    #[test]
    fn version_bumps_on_change() {
        let mut req = request();
        req.begin_attempt(Utc::now()).unwrap();
        req.resolve(Utc::now());
        assert_eq!(req.version(), 2);
    }
}
