//! Paper broker.
//!
//! In-memory `BrokerPort` that simulates a broker account per user: quotes,
//! working orders and positions. Market orders fill at the touch (ask for
//! buys, bid for sells) as soon as a quote exists; limit orders fill once
//! marketable; stop orders rest until the quote crosses the stop.
//!
//! Tests can script the status sequence of the next placed order, inject
//! one-shot failures per operation, or make the whole broker unreachable.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::application::ports::{
    BrokerError, BrokerOrder, BrokerPort, BrokerPosition, Clock, PlaceOrderRequest,
};
use crate::domain::order_execution::{OrderSide, OrderStatus, OrderType, Quote};
use crate::domain::shared::{BrokerOrderId, Symbol, UserId};
use crate::infrastructure::clock::SystemClock;

/// One scripted status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptStep {
    /// Status to report.
    pub status: OrderStatus,
    /// Cumulative filled quantity; `None` means the full order quantity when
    /// the status is `Filled`, zero otherwise.
    pub filled_qty: Option<Decimal>,
    /// Average fill price.
    pub avg_price: Option<Decimal>,
}

impl ScriptStep {
    /// Report a status with no fill.
    #[must_use]
    pub const fn status(status: OrderStatus) -> Self {
        Self {
            status,
            filled_qty: None,
            avg_price: None,
        }
    }

    /// Report a partial fill.
    #[must_use]
    pub const fn partial(filled_qty: Decimal, avg_price: Decimal) -> Self {
        Self {
            status: OrderStatus::PartiallyFilled,
            filled_qty: Some(filled_qty),
            avg_price: Some(avg_price),
        }
    }

    /// Report a complete fill.
    #[must_use]
    pub const fn filled(avg_price: Decimal) -> Self {
        Self {
            status: OrderStatus::Filled,
            filled_qty: None,
            avg_price: Some(avg_price),
        }
    }
}

#[derive(Debug, Clone)]
struct PaperOrder {
    user_id: UserId,
    request: PlaceOrderRequest,
    broker_order_id: BrokerOrderId,
    status: OrderStatus,
    filled_qty: Decimal,
    avg_price: Option<Decimal>,
    script: VecDeque<ScriptStep>,
}

impl PaperOrder {
    fn report(&self) -> BrokerOrder {
        BrokerOrder {
            broker_order_id: self.broker_order_id.clone(),
            client_order_id: Some(self.request.client_order_id.clone()),
            symbol: self.request.symbol.clone(),
            side: self.request.side,
            quantity: self.request.quantity,
            status: self.status,
            raw_status: raw_status(self.status).to_string(),
            filled_qty: self.filled_qty,
            avg_price: self.avg_price,
        }
    }

    /// Price this order would fill at against `quote`, if it is marketable.
    fn marketable_price(&self, quote: &Quote) -> Option<Decimal> {
        if !quote.is_two_sided() {
            return None;
        }
        let side = self.request.side;
        let touch = side.touch(quote.bid, quote.ask);
        let fills = match self.request.order_type {
            OrderType::Market => true,
            OrderType::Limit => side.within_limit(touch, self.request.limit_price?),
            OrderType::Stop => side.stop_triggered(touch, self.request.stop_price?),
        };
        fills.then_some(touch)
    }
}

/// Broker-style status string, the way a real venue would spell it.
const fn raw_status(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Created | OrderStatus::Sent => "new",
        OrderStatus::Acked => "accepted",
        OrderStatus::PartiallyFilled => "partially_filled",
        OrderStatus::Filled => "filled",
        OrderStatus::Rejected => "rejected",
        OrderStatus::Cancelled => "canceled",
        OrderStatus::Unknown => "unknown",
    }
}

#[derive(Debug, Default)]
struct Book {
    quotes: HashMap<Symbol, (Decimal, Decimal)>,
    orders: HashMap<BrokerOrderId, PaperOrder>,
    positions: HashMap<(UserId, Symbol), BrokerPosition>,
    next_script: Option<VecDeque<ScriptStep>>,
    failures: HashMap<&'static str, VecDeque<BrokerError>>,
}

impl Book {
    fn apply_fill(&mut self, user_id: &UserId, symbol: &Symbol, side: OrderSide, qty: Decimal, price: Decimal) {
        if qty <= Decimal::ZERO {
            return;
        }
        let signed = match side {
            OrderSide::Buy => qty,
            OrderSide::Sell => -qty,
        };
        let key = (user_id.clone(), symbol.clone());
        let position = self.positions.entry(key.clone()).or_insert_with(|| BrokerPosition {
            symbol: symbol.clone(),
            quantity: Decimal::ZERO,
            avg_entry_price: price,
        });

        let before = position.quantity;
        let after = before + signed;
        let adding = before.is_zero() || (before.is_sign_positive() == signed.is_sign_positive());
        if adding && !after.is_zero() {
            position.avg_entry_price =
                (position.avg_entry_price * before.abs() + price * qty) / after.abs();
        } else if !after.is_zero() && after.is_sign_positive() != before.is_sign_positive() {
            position.avg_entry_price = price;
        }
        position.quantity = after;

        if after.is_zero() {
            self.positions.remove(&key);
        }
    }

    /// Fill `order_id` completely at `price`.
    fn fill(&mut self, order_id: &BrokerOrderId, price: Decimal) {
        let Some(order) = self.orders.get_mut(order_id) else {
            return;
        };
        let delta = order.request.quantity - order.filled_qty;
        order.filled_qty = order.request.quantity;
        order.avg_price = Some(price);
        order.status = OrderStatus::Filled;
        let (user_id, symbol, side) = (
            order.user_id.clone(),
            order.request.symbol.clone(),
            order.request.side,
        );
        self.apply_fill(&user_id, &symbol, side, delta, price);
    }

    /// Advance a scripted order by one report.
    fn step_script(&mut self, order_id: &BrokerOrderId) {
        let Some(order) = self.orders.get_mut(order_id) else {
            return;
        };
        let step = if order.script.len() > 1 {
            order.script.pop_front()
        } else {
            order.script.front().cloned()
        };
        let Some(step) = step else {
            return;
        };

        let target_qty = match (step.status, step.filled_qty) {
            (_, Some(qty)) => qty.min(order.request.quantity),
            (OrderStatus::Filled, None) => order.request.quantity,
            _ => order.filled_qty,
        };
        let delta = target_qty - order.filled_qty;
        order.status = step.status;
        order.filled_qty = order.filled_qty.max(target_qty);
        if step.avg_price.is_some() {
            order.avg_price = step.avg_price;
        }
        let price = order.avg_price.unwrap_or(Decimal::ZERO);
        let (user_id, symbol, side) = (
            order.user_id.clone(),
            order.request.symbol.clone(),
            order.request.side,
        );
        self.apply_fill(&user_id, &symbol, side, delta, price);
    }

    /// Fill every resting unscripted order the quote for `symbol` makes
    /// marketable.
    fn sweep(&mut self, symbol: &Symbol, quote: &Quote) {
        let fills: Vec<(BrokerOrderId, Decimal)> = self
            .orders
            .values()
            .filter(|o| {
                &o.request.symbol == symbol && o.status.is_working() && o.script.is_empty()
            })
            .filter_map(|o| o.marketable_price(quote).map(|p| (o.broker_order_id.clone(), p)))
            .collect();
        for (id, price) in fills {
            self.fill(&id, price);
        }
    }
}

/// Simulated broker for paper trading and tests.
pub struct PaperBroker {
    book: Mutex<Book>,
    next_id: AtomicU64,
    unreachable: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PaperBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperBroker")
            .field("orders", &self.book.lock().orders.len())
            .field("unreachable", &self.unreachable.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl PaperBroker {
    /// Create an empty broker stamped with wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty broker stamping quotes from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            book: Mutex::new(Book::default()),
            next_id: AtomicU64::new(1),
            unreachable: AtomicBool::new(false),
            clock,
        }
    }

    /// Set the quote for a symbol and fill any order it makes marketable.
    pub fn set_quote(&self, symbol: &Symbol, bid: Decimal, ask: Decimal) {
        let quote = Quote::new(symbol.clone(), bid, ask, self.clock.now());
        let mut book = self.book.lock();
        book.quotes.insert(symbol.clone(), (bid, ask));
        book.sweep(symbol, &quote);
    }

    /// Remove a symbol's quote.
    pub fn clear_quote(&self, symbol: &Symbol) {
        self.book.lock().quotes.remove(symbol);
    }

    /// Script the status reports of the next placed order. Each status poll
    /// consumes one step; the last step repeats. Scripted orders ignore
    /// quotes.
    pub fn script_next_order(&self, steps: Vec<ScriptStep>) {
        self.book.lock().next_script = Some(steps.into());
    }

    /// Fail the next call of `operation` with `error`. Operations are named
    /// after the port methods (`place_order`, `cancel_order`,
    /// `get_order_status`, `get_quote`, `open_orders`, `open_positions`).
    pub fn fail_next(&self, operation: &'static str, error: BrokerError) {
        self.book
            .lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Make every call fail as unreachable until switched back.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Overwrite a position, e.g. one opened outside this system.
    pub fn set_position(&self, user_id: &UserId, symbol: &Symbol, quantity: Decimal, avg_entry_price: Decimal) {
        let key = (user_id.clone(), symbol.clone());
        let mut book = self.book.lock();
        if quantity.is_zero() {
            book.positions.remove(&key);
        } else {
            book.positions.insert(
                key,
                BrokerPosition {
                    symbol: symbol.clone(),
                    quantity,
                    avg_entry_price,
                },
            );
        }
    }

    /// Orders placed so far, oldest first.
    #[must_use]
    pub fn placed_orders(&self) -> Vec<(UserId, PlaceOrderRequest)> {
        let book = self.book.lock();
        let mut orders: Vec<(u64, UserId, PlaceOrderRequest)> = book
            .orders
            .values()
            .map(|o| {
                let seq = o
                    .broker_order_id
                    .as_str()
                    .trim_start_matches("paper-")
                    .parse()
                    .unwrap_or(u64::MAX);
                (seq, o.user_id.clone(), o.request.clone())
            })
            .collect();
        orders.sort_by_key(|(seq, _, _)| *seq);
        orders.into_iter().map(|(_, user, request)| (user, request)).collect()
    }

    fn check(&self, operation: &'static str) -> Result<(), BrokerError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(BrokerError::Unreachable {
                message: format!("paper broker offline during {operation}"),
            });
        }
        if let Some(error) = self
            .book
            .lock()
            .failures
            .get_mut(operation)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        Ok(())
    }

    fn not_found(id: &BrokerOrderId) -> BrokerError {
        BrokerError::NotFound { id: id.to_string() }
    }
}

#[async_trait]
impl BrokerPort for PaperBroker {
    async fn place_order(
        &self,
        user_id: &UserId,
        request: PlaceOrderRequest,
    ) -> Result<BrokerOrderId, BrokerError> {
        self.check("place_order")?;
        if request.quantity <= Decimal::ZERO {
            return Err(BrokerError::Rejected {
                reason: format!("quantity must be positive, got {}", request.quantity),
            });
        }

        let id = BrokerOrderId::new(format!("paper-{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
        let now = self.clock.now();
        let mut book = self.book.lock();
        let script = book.next_script.take().unwrap_or_default();
        let scripted = !script.is_empty();
        let quote = book
            .quotes
            .get(&request.symbol)
            .map(|(bid, ask)| Quote::new(request.symbol.clone(), *bid, *ask, now));

        let order = PaperOrder {
            user_id: user_id.clone(),
            request,
            broker_order_id: id.clone(),
            status: OrderStatus::Acked,
            filled_qty: Decimal::ZERO,
            avg_price: None,
            script,
        };
        let fill_at = if scripted {
            None
        } else {
            quote.as_ref().and_then(|q| order.marketable_price(q))
        };
        book.orders.insert(id.clone(), order);
        if let Some(price) = fill_at {
            book.fill(&id, price);
        }
        Ok(id)
    }

    async fn cancel_order(
        &self,
        _user_id: &UserId,
        broker_order_id: &BrokerOrderId,
    ) -> Result<(), BrokerError> {
        self.check("cancel_order")?;
        let mut book = self.book.lock();
        let order = book
            .orders
            .get_mut(broker_order_id)
            .ok_or_else(|| Self::not_found(broker_order_id))?;
        if order.status.is_terminal() {
            return Err(BrokerError::Rejected {
                reason: format!("order {broker_order_id} is already {}", order.status),
            });
        }
        order.status = OrderStatus::Cancelled;
        order.script.clear();
        Ok(())
    }

    async fn get_order_status(
        &self,
        _user_id: &UserId,
        broker_order_id: &BrokerOrderId,
    ) -> Result<BrokerOrder, BrokerError> {
        self.check("get_order_status")?;
        let mut book = self.book.lock();
        let scripted = book
            .orders
            .get(broker_order_id)
            .ok_or_else(|| Self::not_found(broker_order_id))?
            .script
            .is_empty();
        if !scripted {
            book.step_script(broker_order_id);
        }
        book.orders
            .get(broker_order_id)
            .map(PaperOrder::report)
            .ok_or_else(|| Self::not_found(broker_order_id))
    }

    async fn get_quote(&self, symbol: &Symbol) -> Result<Quote, BrokerError> {
        self.check("get_quote")?;
        let book = self.book.lock();
        book.quotes
            .get(symbol)
            .map(|(bid, ask)| Quote::new(symbol.clone(), *bid, *ask, self.clock.now()))
            .ok_or_else(|| BrokerError::NotFound {
                id: symbol.to_string(),
            })
    }

    async fn open_orders(&self, user_id: &UserId) -> Result<Vec<BrokerOrder>, BrokerError> {
        self.check("open_orders")?;
        let book = self.book.lock();
        Ok(book
            .orders
            .values()
            .filter(|o| &o.user_id == user_id && o.status.is_working())
            .map(PaperOrder::report)
            .collect())
    }

    async fn open_positions(&self, user_id: &UserId) -> Result<Vec<BrokerPosition>, BrokerError> {
        self.check("open_positions")?;
        let book = self.book.lock();
        Ok(book
            .positions
            .iter()
            .filter(|((owner, _), _)| owner == user_id)
            .map(|(_, position)| position.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::ClientOrderId;
    use rust_decimal_macros::dec;

    fn user() -> UserId {
        UserId::new("u-1")
    }

    fn market(side: OrderSide, qty: Decimal) -> PlaceOrderRequest {
        PlaceOrderRequest::market(ClientOrderId::generate(), Symbol::new("AAPL"), side, qty)
    }

    #[tokio::test]
    async fn market_order_fills_at_touch() {
        let broker = PaperBroker::new();
        broker.set_quote(&Symbol::new("AAPL"), dec!(99.9), dec!(100.1));

        let id = broker.place_order(&user(), market(OrderSide::Buy, dec!(10))).await.unwrap();
        let order = broker.get_order_status(&user(), &id).await.unwrap();

        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.avg_price, Some(dec!(100.1)));
        let positions = broker.open_positions(&user()).await.unwrap();
        assert_eq!(positions[0].quantity, dec!(10));
    }

    #[tokio::test]
    async fn stop_rests_until_crossed() {
        let broker = PaperBroker::new();
        let stop = PlaceOrderRequest::stop(
            ClientOrderId::new("stop-1"),
            Symbol::new("AAPL"),
            OrderSide::Sell,
            dec!(10),
            dec!(95),
        );
        let id = broker.place_order(&user(), stop).await.unwrap();
        assert_eq!(broker.open_orders(&user()).await.unwrap().len(), 1);

        broker.set_quote(&Symbol::new("AAPL"), dec!(94.5), dec!(94.7));
        let order = broker.get_order_status(&user(), &id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert!(broker.open_orders(&user()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn script_replays_then_repeats_last_step() {
        let broker = PaperBroker::new();
        broker.script_next_order(vec![
            ScriptStep::status(OrderStatus::Acked),
            ScriptStep::partial(dec!(4), dec!(100)),
        ]);
        let id = broker.place_order(&user(), market(OrderSide::Buy, dec!(10))).await.unwrap();

        let first = broker.get_order_status(&user(), &id).await.unwrap();
        let second = broker.get_order_status(&user(), &id).await.unwrap();
        let third = broker.get_order_status(&user(), &id).await.unwrap();

        assert_eq!(first.status, OrderStatus::Acked);
        assert_eq!(second.status, OrderStatus::PartiallyFilled);
        assert_eq!(third.filled_qty, dec!(4));
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let broker = PaperBroker::new();
        broker.fail_next(
            "open_orders",
            BrokerError::Transient {
                operation: "open_orders",
                message: "503".to_string(),
            },
        );

        assert!(broker.open_orders(&user()).await.is_err());
        assert!(broker.open_orders(&user()).await.is_ok());
    }

    #[tokio::test]
    async fn cancel_unknown_order_is_not_found() {
        let broker = PaperBroker::new();
        let err = broker
            .cancel_order(&user(), &BrokerOrderId::new("nope"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
