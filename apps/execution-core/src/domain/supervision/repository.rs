//! Supervision Repository Traits

use async_trait::async_trait;

use super::aggregate::{LossCounters, SystemGuardState};
use crate::domain::shared::{RepositoryError, UserId};

/// Storage for the system guard singleton.
#[async_trait]
pub trait SystemGuardRepository: Send + Sync {
    /// Current state (default state if never written).
    async fn load(&self) -> Result<SystemGuardState, RepositoryError>;

    /// Replace the state if the stored version still equals `expected_version`.
    async fn store(
        &self,
        state: &SystemGuardState,
        expected_version: u64,
    ) -> Result<(), RepositoryError>;
}

/// Storage for per-user circuit breaker counters.
#[async_trait]
pub trait LossCounterRepository: Send + Sync {
    /// Counters for a user, if any were recorded.
    async fn get(&self, user_id: &UserId) -> Result<Option<LossCounters>, RepositoryError>;

    /// Replace a user's counters if the stored version still equals
    /// `expected_version`. A user with no counters yet is at version 0.
    async fn store(
        &self,
        user_id: &UserId,
        counters: &LossCounters,
        expected_version: u64,
    ) -> Result<(), RepositoryError>;

    /// Every user with counters.
    async fn users(&self) -> Result<Vec<UserId>, RepositoryError>;
}
