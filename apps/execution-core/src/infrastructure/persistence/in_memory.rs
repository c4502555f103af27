//! In-memory repositories.
//!
//! Each repository keeps its rows behind one `parking_lot` lock, so every
//! compare-and-write runs check and write under the same guard. Suitable for
//! tests, paper trading and single-process deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::exit_retry::{EnqueueOutcome, ExitRetryRepository, ExitRetryRequest};
use crate::domain::idempotency::{
    ClaimOutcome, IdempotencyKey, IdempotencyRecord, IdempotencyRepository, IdempotencyStatus,
};
use crate::domain::order_execution::{OrderIntent, OrderIntentRepository, OrderStatus};
use crate::domain::shared::{
    BrokerOrderId, ClientOrderId, ExitRetryId, RepositoryError, TradeId, TransitionRecord, UserId,
};
use crate::domain::supervision::{
    LossCounterRepository, LossCounters, SystemGuardRepository, SystemGuardState,
};
use crate::domain::trade_lifecycle::{PositionState, Trade, TradeRepository};

#[derive(Debug, Default)]
struct OrderTable {
    intents: HashMap<ClientOrderId, OrderIntent>,
    history: HashMap<ClientOrderId, Vec<TransitionRecord>>,
}

/// In-memory implementation of `OrderIntentRepository`.
#[derive(Debug, Default)]
pub struct InMemoryOrderIntentRepository {
    table: RwLock<OrderTable>,
}

impl InMemoryOrderIntentRepository {
    /// Create a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored intents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().intents.len()
    }

    /// Check if the repository is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.read().intents.is_empty()
    }

    /// Every stored intent.
    #[must_use]
    pub fn all(&self) -> Vec<OrderIntent> {
        self.table.read().intents.values().cloned().collect()
    }
}

fn stale_order(intent: &OrderIntent, expected: OrderStatus, actual: OrderStatus) -> RepositoryError {
    RepositoryError::StaleState {
        entity: "order_intent",
        id: intent.client_order_id().to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

fn order_not_found(id: &ClientOrderId) -> RepositoryError {
    RepositoryError::NotFound {
        entity: "order_intent",
        id: id.to_string(),
    }
}

#[async_trait]
impl OrderIntentRepository for InMemoryOrderIntentRepository {
    async fn insert(&self, intent: &OrderIntent) -> Result<(), RepositoryError> {
        self.insert_with_history(intent, &[]).await
    }

    async fn insert_with_history(
        &self,
        intent: &OrderIntent,
        history: &[TransitionRecord],
    ) -> Result<(), RepositoryError> {
        let mut table = self.table.write();
        let id = intent.client_order_id();
        if table.intents.contains_key(id) {
            return Err(RepositoryError::Duplicate {
                entity: "order_intent",
                id: id.to_string(),
            });
        }
        // Broker ids are unique among live intents.
        if let Some(broker_id) = intent.broker_order_id() {
            let clash = table.intents.values().any(|o| {
                !o.status().is_terminal() && o.broker_order_id() == Some(broker_id)
            });
            if clash {
                return Err(RepositoryError::Duplicate {
                    entity: "order_intent",
                    id: broker_id.to_string(),
                });
            }
        }
        table.intents.insert(id.clone(), intent.clone());
        table.history.insert(id.clone(), history.to_vec());
        Ok(())
    }

    async fn save(&self, intent: &OrderIntent) -> Result<(), RepositoryError> {
        let mut table = self.table.write();
        let id = intent.client_order_id();
        let stored = table.intents.get_mut(id).ok_or_else(|| order_not_found(id))?;
        if stored.status() != intent.status() {
            return Err(stale_order(intent, intent.status(), stored.status()));
        }
        *stored = intent.clone();
        Ok(())
    }

    async fn save_transition(
        &self,
        intent: &OrderIntent,
        expected: OrderStatus,
        record: &TransitionRecord,
    ) -> Result<(), RepositoryError> {
        let mut table = self.table.write();
        let id = intent.client_order_id();
        let stored = table.intents.get_mut(id).ok_or_else(|| order_not_found(id))?;
        if stored.status() != expected {
            return Err(stale_order(intent, expected, stored.status()));
        }
        *stored = intent.clone();
        table.history.entry(id.clone()).or_default().push(record.clone());
        Ok(())
    }

    async fn find(&self, id: &ClientOrderId) -> Result<Option<OrderIntent>, RepositoryError> {
        Ok(self.table.read().intents.get(id).cloned())
    }

    async fn find_by_broker_id(
        &self,
        broker_id: &BrokerOrderId,
    ) -> Result<Option<OrderIntent>, RepositoryError> {
        Ok(self
            .table
            .read()
            .intents
            .values()
            .find(|o| o.broker_order_id() == Some(broker_id))
            .cloned())
    }

    async fn find_open_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<OrderIntent>, RepositoryError> {
        Ok(self
            .table
            .read()
            .intents
            .values()
            .filter(|o| o.user_id() == user_id && o.status().is_open())
            .cloned()
            .collect())
    }

    async fn history(&self, id: &ClientOrderId) -> Result<Vec<TransitionRecord>, RepositoryError> {
        Ok(self.table.read().history.get(id).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Default)]
struct TradeTable {
    trades: HashMap<TradeId, Trade>,
    history: HashMap<TradeId, Vec<TransitionRecord>>,
}

/// In-memory implementation of `TradeRepository`.
#[derive(Debug, Default)]
pub struct InMemoryTradeRepository {
    table: RwLock<TradeTable>,
}

impl InMemoryTradeRepository {
    /// Create a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored trade.
    #[must_use]
    pub fn all(&self) -> Vec<Trade> {
        self.table.read().trades.values().cloned().collect()
    }
}

fn stale_trade(trade: &Trade, expected: PositionState, actual: PositionState) -> RepositoryError {
    RepositoryError::StaleState {
        entity: "trade",
        id: trade.id().to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

fn check_trade_version(stored: &Trade, trade: &Trade) -> Result<(), RepositoryError> {
    if stored.version() == trade.version() {
        return Ok(());
    }
    Err(RepositoryError::StaleState {
        entity: "trade",
        id: trade.id().to_string(),
        expected: format!("version {}", trade.version()),
        actual: format!("version {}", stored.version()),
    })
}

fn trade_not_found(id: &TradeId) -> RepositoryError {
    RepositoryError::NotFound {
        entity: "trade",
        id: id.to_string(),
    }
}

#[async_trait]
impl TradeRepository for InMemoryTradeRepository {
    async fn insert(&self, trade: &Trade) -> Result<(), RepositoryError> {
        let mut table = self.table.write();
        if table.trades.contains_key(trade.id()) {
            return Err(RepositoryError::Duplicate {
                entity: "trade",
                id: trade.id().to_string(),
            });
        }
        table.trades.insert(trade.id().clone(), trade.clone());
        table.history.insert(trade.id().clone(), Vec::new());
        Ok(())
    }

    async fn save(&self, trade: &mut Trade) -> Result<(), RepositoryError> {
        let mut table = self.table.write();
        let stored = table
            .trades
            .get_mut(trade.id())
            .ok_or_else(|| trade_not_found(trade.id()))?;
        if stored.state() != trade.state() {
            return Err(stale_trade(trade, trade.state(), stored.state()));
        }
        check_trade_version(stored, trade)?;
        trade.advance_version();
        *stored = trade.clone();
        Ok(())
    }

    async fn save_transition(
        &self,
        trade: &mut Trade,
        expected: PositionState,
        record: &TransitionRecord,
    ) -> Result<(), RepositoryError> {
        let mut table = self.table.write();
        let stored = table
            .trades
            .get_mut(trade.id())
            .ok_or_else(|| trade_not_found(trade.id()))?;
        if stored.state() != expected {
            return Err(stale_trade(trade, expected, stored.state()));
        }
        check_trade_version(stored, trade)?;
        trade.advance_version();
        *stored = trade.clone();
        table
            .history
            .entry(trade.id().clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn find(&self, id: &TradeId) -> Result<Option<Trade>, RepositoryError> {
        Ok(self.table.read().trades.get(id).cloned())
    }

    async fn find_by_state(&self, state: PositionState) -> Result<Vec<Trade>, RepositoryError> {
        Ok(self
            .table
            .read()
            .trades
            .values()
            .filter(|t| t.state() == state)
            .cloned()
            .collect())
    }

    async fn find_open_for_user(&self, user_id: &UserId) -> Result<Vec<Trade>, RepositoryError> {
        Ok(self
            .table
            .read()
            .trades
            .values()
            .filter(|t| t.user_id() == user_id && t.holds_position())
            .cloned()
            .collect())
    }

    async fn history(&self, id: &TradeId) -> Result<Vec<TransitionRecord>, RepositoryError> {
        Ok(self.table.read().history.get(id).cloned().unwrap_or_default())
    }
}

/// In-memory implementation of `ExitRetryRepository`.
#[derive(Debug, Default)]
pub struct InMemoryExitRetryRepository {
    requests: RwLock<HashMap<ExitRetryId, ExitRetryRequest>>,
}

impl InMemoryExitRetryRepository {
    /// Create a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExitRetryRepository for InMemoryExitRetryRepository {
    async fn insert_if_absent(
        &self,
        request: &ExitRetryRequest,
    ) -> Result<EnqueueOutcome, RepositoryError> {
        let mut requests = self.requests.write();
        if let Some(existing) = requests
            .values()
            .find(|r| r.trade_id() == request.trade_id() && !r.is_resolved())
        {
            return Ok(EnqueueOutcome::Existing(existing.clone()));
        }
        requests.insert(request.id().clone(), request.clone());
        Ok(EnqueueOutcome::Created)
    }

    async fn save(
        &self,
        request: &ExitRetryRequest,
        expected_version: u64,
    ) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write();
        let stored = requests
            .get_mut(request.id())
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "exit_retry_request",
                id: request.id().to_string(),
            })?;
        if stored.version() != expected_version {
            return Err(RepositoryError::StaleState {
                entity: "exit_retry_request",
                id: request.id().to_string(),
                expected: expected_version.to_string(),
                actual: stored.version().to_string(),
            });
        }
        *stored = request.clone();
        Ok(())
    }

    async fn find(&self, id: &ExitRetryId) -> Result<Option<ExitRetryRequest>, RepositoryError> {
        Ok(self.requests.read().get(id).cloned())
    }

    async fn find_unresolved_for_trade(
        &self,
        trade_id: &TradeId,
    ) -> Result<Option<ExitRetryRequest>, RepositoryError> {
        Ok(self
            .requests
            .read()
            .values()
            .find(|r| r.trade_id() == trade_id && !r.is_resolved())
            .cloned())
    }

    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<ExitRetryRequest>, RepositoryError> {
        let mut due: Vec<ExitRetryRequest> = self
            .requests
            .read()
            .values()
            .filter(|r| r.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(ExitRetryRequest::next_attempt_at);
        Ok(due)
    }

    async fn list(&self) -> Result<Vec<ExitRetryRequest>, RepositoryError> {
        let mut all: Vec<ExitRetryRequest> = self.requests.read().values().cloned().collect();
        all.sort_by_key(ExitRetryRequest::created_at);
        Ok(all)
    }
}

/// In-memory implementation of `IdempotencyRepository`.
#[derive(Debug, Default)]
pub struct InMemoryIdempotencyRepository {
    records: RwLock<HashMap<IdempotencyKey, IdempotencyRecord>>,
}

impl InMemoryIdempotencyRepository {
    /// Create a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn finalize(
        &self,
        key: &IdempotencyKey,
        apply: impl FnOnce(&mut IdempotencyRecord),
    ) -> Result<(), RepositoryError> {
        let mut records = self.records.write();
        let record = records.get_mut(key).ok_or_else(|| RepositoryError::NotFound {
            entity: "idempotency_record",
            id: key.to_string(),
        })?;
        if record.status != IdempotencyStatus::InProgress {
            return Err(RepositoryError::StaleState {
                entity: "idempotency_record",
                id: key.to_string(),
                expected: IdempotencyStatus::InProgress.to_string(),
                actual: record.status.to_string(),
            });
        }
        apply(record);
        Ok(())
    }
}

#[async_trait]
impl IdempotencyRepository for InMemoryIdempotencyRepository {
    async fn try_insert(&self, record: &IdempotencyRecord) -> Result<ClaimOutcome, RepositoryError> {
        let mut records = self.records.write();
        if let Some(existing) = records.get(&record.key) {
            return Ok(ClaimOutcome::Existing(existing.clone()));
        }
        records.insert(record.key.clone(), record.clone());
        Ok(ClaimOutcome::Claimed)
    }

    async fn complete(
        &self,
        key: &IdempotencyKey,
        response: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.finalize(key, |record| {
            record.status = IdempotencyStatus::Completed;
            record.response = Some(response);
            record.completed_at = Some(now);
        })
    }

    async fn fail(
        &self,
        key: &IdempotencyKey,
        error: String,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.finalize(key, |record| {
            record.status = IdempotencyStatus::Failed;
            record.error = Some(error);
            record.completed_at = Some(now);
        })
    }

    async fn find(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>, RepositoryError> {
        Ok(self.records.read().get(key).cloned())
    }
}

/// In-memory implementation of `SystemGuardRepository`.
#[derive(Debug, Default)]
pub struct InMemorySystemGuardRepository {
    state: RwLock<SystemGuardState>,
}

impl InMemorySystemGuardRepository {
    /// Create a repository holding the default (all clear) state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SystemGuardRepository for InMemorySystemGuardRepository {
    async fn load(&self) -> Result<SystemGuardState, RepositoryError> {
        Ok(self.state.read().clone())
    }

    async fn store(
        &self,
        state: &SystemGuardState,
        expected_version: u64,
    ) -> Result<(), RepositoryError> {
        let mut stored = self.state.write();
        if stored.version != expected_version {
            return Err(RepositoryError::StaleState {
                entity: "system_guard",
                id: "singleton".to_string(),
                expected: expected_version.to_string(),
                actual: stored.version.to_string(),
            });
        }
        *stored = state.clone();
        Ok(())
    }
}

/// In-memory implementation of `LossCounterRepository`.
#[derive(Debug, Default)]
pub struct InMemoryLossCounterRepository {
    counters: RwLock<HashMap<UserId, LossCounters>>,
}

impl InMemoryLossCounterRepository {
    /// Create a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LossCounterRepository for InMemoryLossCounterRepository {
    async fn get(&self, user_id: &UserId) -> Result<Option<LossCounters>, RepositoryError> {
        Ok(self.counters.read().get(user_id).cloned())
    }

    async fn store(
        &self,
        user_id: &UserId,
        counters: &LossCounters,
        expected_version: u64,
    ) -> Result<(), RepositoryError> {
        let mut all = self.counters.write();
        let actual = all.get(user_id).map_or(0, |c| c.version);
        if actual != expected_version {
            return Err(RepositoryError::StaleState {
                entity: "loss_counters",
                id: user_id.to_string(),
                expected: expected_version.to_string(),
                actual: actual.to_string(),
            });
        }
        all.insert(user_id.clone(), counters.clone());
        Ok(())
    }

    async fn users(&self) -> Result<Vec<UserId>, RepositoryError> {
        let mut users: Vec<UserId> = self.counters.read().keys().cloned().collect();
        users.sort();
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_execution::{
        NewOrderIntent, OrderPurpose, OrderSide, OrderType, TradingMode,
    };
    use crate::domain::shared::{Symbol, TransitionContext};
    use crate::domain::supervision::HaltReason;
    use crate::domain::trade_lifecycle::{NewTrade, TradeSide};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap()
    }

    fn intent(id: &str) -> OrderIntent {
        OrderIntent::new(
            NewOrderIntent {
                client_order_id: ClientOrderId::new(id),
                user_id: UserId::new("u-1"),
                symbol: Symbol::new("AAPL"),
                side: OrderSide::Buy,
                quantity: dec!(10),
                order_type: OrderType::Market,
                limit_price: None,
                stop_price: None,
                purpose: OrderPurpose::Entry,
                mode: TradingMode::Live,
                trade_id: None,
            },
            now(),
        )
    }

    #[tokio::test]
    async fn duplicate_client_key_is_refused() {
        let repo = InMemoryOrderIntentRepository::new();
        repo.insert(&intent("co-1")).await.unwrap();

        let err = repo.insert(&intent("co-1")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Duplicate { .. }));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn second_transition_from_same_state_loses() {
        let repo = InMemoryOrderIntentRepository::new();
        let original = intent("co-1");
        repo.insert(&original).await.unwrap();
        let context = TransitionContext::new("test");

        let mut first = original.clone();
        let record = first.transition(OrderStatus::Sent, &context, now()).unwrap();
        repo.save_transition(&first, OrderStatus::Created, &record)
            .await
            .unwrap();

        let mut second = original;
        let record = second
            .transition(OrderStatus::Rejected, &context, now())
            .unwrap();
        let err = repo
            .save_transition(&second, OrderStatus::Created, &record)
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        let stored = repo.find(&ClientOrderId::new("co-1")).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Sent);
        assert_eq!(repo.history(&ClientOrderId::new("co-1")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn open_intents_exclude_terminal_and_unknown() {
        let repo = InMemoryOrderIntentRepository::new();
        let context = TransitionContext::new("test");
        repo.insert(&intent("open")).await.unwrap();

        let mut gone = intent("gone");
        let record = gone.transition(OrderStatus::Unknown, &context, now()).unwrap();
        repo.insert_with_history(&gone, &[record]).await.unwrap();

        let open = repo.find_open_for_user(&UserId::new("u-1")).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].client_order_id().as_str(), "open");
    }

    fn trade(id: &str) -> Trade {
        Trade::open(
            NewTrade {
                id: TradeId::new(id),
                user_id: UserId::new("u-1"),
                symbol: Symbol::new("AAPL"),
                side: TradeSide::Long,
                quantity: dec!(10),
                entry_price: dec!(100),
                stop_price: dec!(95),
                entry_order_id: ClientOrderId::new("co-1"),
                paper: false,
            },
            now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn stale_trade_writes_lose_even_in_the_same_state() {
        let repo = InMemoryTradeRepository::new();
        let original = trade("t-1");
        repo.insert(&original).await.unwrap();

        let mut first = original.clone();
        first.add_note("stop_replaced", "stop trailed to 97", now());
        repo.save(&mut first).await.unwrap();
        assert_eq!(first.version(), 1);

        let mut second = original.clone();
        second.add_note("stop_confirmed", "broker acked stop", now());
        let err = repo.save(&mut second).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(second.version(), 0);

        let mut third = original;
        let record = third
            .transition(PositionState::Error, &TransitionContext::new("test"), now())
            .unwrap();
        let err = repo
            .save_transition(&mut third, PositionState::Opening, &record)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let stored = repo.find(&TradeId::new("t-1")).await.unwrap().unwrap();
        assert_eq!(stored.state(), PositionState::Opening);
        assert_eq!(stored.notes().len(), 1);
        assert_eq!(stored.notes()[0].kind, "stop_replaced");
        assert!(repo.history(&TradeId::new("t-1")).await.unwrap().is_empty());

        // The writer holding the current version keeps going.
        first.add_note("stop_confirmed", "broker acked stop", now());
        repo.save(&mut first).await.unwrap();
        assert_eq!(first.version(), 2);
    }

    #[tokio::test]
    async fn idempotency_insert_is_first_wins() {
        let repo = InMemoryIdempotencyRepository::new();
        let key = IdempotencyKey::new(UserId::new("u-1"), "k-1");
        let record = IdempotencyRecord::in_progress(key.clone(), "hash".to_string(), now());

        assert_eq!(repo.try_insert(&record).await.unwrap(), ClaimOutcome::Claimed);
        assert!(matches!(
            repo.try_insert(&record).await.unwrap(),
            ClaimOutcome::Existing(_)
        ));

        repo.complete(&key, serde_json::json!({"ok": true}), now())
            .await
            .unwrap();
        let err = repo.fail(&key, "late".to_string(), now()).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn guard_store_checks_version() {
        let repo = InMemorySystemGuardRepository::new();
        let mut state = repo.load().await.unwrap();
        let expected = state.version;
        assert!(state.enter_safe_mode(HaltReason::Manual, "test".to_string(), now()));

        repo.store(&state, expected).await.unwrap();
        let err = repo.store(&state, expected).await.unwrap_err();
        assert!(err.is_conflict());
    }
}
