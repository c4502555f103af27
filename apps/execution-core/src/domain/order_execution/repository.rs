//! Order Intent Repository Trait
//!
//! Persistence abstraction for order intents and their transition history.
//! Implemented by adapters in the infrastructure layer.

use async_trait::async_trait;

use super::aggregate::OrderIntent;
use super::value_objects::OrderStatus;
use crate::domain::shared::{
    BrokerOrderId, ClientOrderId, RepositoryError, TransitionRecord, UserId,
};

/// Repository trait for order intent persistence.
///
/// Writers that change status must go through [`Self::save_transition`], which
/// compares the stored status against the one the writer read. Two racing
/// writers cannot both apply a transition out of the same state.
#[async_trait]
pub trait OrderIntentRepository: Send + Sync {
    /// Insert a new intent. Fails with `Duplicate` if the client key exists.
    async fn insert(&self, intent: &OrderIntent) -> Result<(), RepositoryError>;

    /// Insert a new intent together with the transitions it already went
    /// through (e.g. created -> rejected) as one atomic write.
    async fn insert_with_history(
        &self,
        intent: &OrderIntent,
        history: &[TransitionRecord],
    ) -> Result<(), RepositoryError>;

    /// Update non-status fields (fills, broker id, costs).
    ///
    /// Fails with `StaleState` if the stored status differs from `intent`'s.
    async fn save(&self, intent: &OrderIntent) -> Result<(), RepositoryError>;

    /// Persist a status change and its audit record atomically, provided
    /// the stored status still equals `expected`.
    async fn save_transition(
        &self,
        intent: &OrderIntent,
        expected: OrderStatus,
        record: &TransitionRecord,
    ) -> Result<(), RepositoryError>;

    /// Find an intent by client key.
    async fn find(&self, id: &ClientOrderId) -> Result<Option<OrderIntent>, RepositoryError>;

    /// Find an intent by broker id.
    async fn find_by_broker_id(
        &self,
        broker_id: &BrokerOrderId,
    ) -> Result<Option<OrderIntent>, RepositoryError>;

    /// Open (non-terminal, non-unknown) intents for a user.
    async fn find_open_for_user(&self, user_id: &UserId)
    -> Result<Vec<OrderIntent>, RepositoryError>;

    /// Audit trail for one intent, oldest first.
    async fn history(&self, id: &ClientOrderId) -> Result<Vec<TransitionRecord>, RepositoryError>;
}
