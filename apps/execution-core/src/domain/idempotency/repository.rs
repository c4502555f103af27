//! Idempotency Repository Trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::record::{IdempotencyKey, IdempotencyRecord};
use crate::domain::shared::RepositoryError;

/// Outcome of the atomic insert that decides which caller runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller owns the key and must run the operation.
    Claimed,
    /// A record already exists for the key.
    Existing(IdempotencyRecord),
}

/// Storage for idempotency records with an atomic insert-if-absent.
#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    /// Insert the in-progress record unless the key exists.
    async fn try_insert(&self, record: &IdempotencyRecord) -> Result<ClaimOutcome, RepositoryError>;

    /// Finalize an in-progress record with a response.
    async fn complete(
        &self,
        key: &IdempotencyKey,
        response: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Finalize an in-progress record with an error.
    async fn fail(
        &self,
        key: &IdempotencyKey,
        error: String,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Find a record.
    async fn find(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>, RepositoryError>;
}
