//! Trade Repository Trait

use async_trait::async_trait;

use super::aggregate::Trade;
use super::value_objects::PositionState;
use crate::domain::shared::{RepositoryError, TradeId, TransitionRecord, UserId};

/// Repository trait for trade persistence.
///
/// Every write is a compare-and-write on the trade's version: it fails with
/// `StaleState` unless the stored version still equals the one the writer
/// read. A write that lands advances the writer's version in place.
#[async_trait]
pub trait TradeRepository: Send + Sync {
    /// Insert a new trade.
    async fn insert(&self, trade: &Trade) -> Result<(), RepositoryError>;

    /// Update non-state fields (stop, extremes, notes).
    async fn save(&self, trade: &mut Trade) -> Result<(), RepositoryError>;

    /// Persist a state change and its audit record atomically, provided the
    /// stored state still equals `expected` and nobody wrote in between.
    async fn save_transition(
        &self,
        trade: &mut Trade,
        expected: PositionState,
        record: &TransitionRecord,
    ) -> Result<(), RepositoryError>;

    /// Find a trade by id.
    async fn find(&self, id: &TradeId) -> Result<Option<Trade>, RepositoryError>;

    /// All trades in `state`.
    async fn find_by_state(&self, state: PositionState) -> Result<Vec<Trade>, RepositoryError>;

    /// Trades still holding a position for a user (see
    /// [`Trade::holds_position`]).
    async fn find_open_for_user(&self, user_id: &UserId) -> Result<Vec<Trade>, RepositoryError>;

    /// Audit trail for one trade, oldest first.
    async fn history(&self, id: &TradeId) -> Result<Vec<TransitionRecord>, RepositoryError>;
}
