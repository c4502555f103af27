//! Exit Retry Repository Trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::aggregate::ExitRetryRequest;
use crate::domain::shared::{ExitRetryId, RepositoryError, TradeId};

/// Result of an insert guarded by the one-unresolved-request-per-trade rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The request was stored.
    Created,
    /// An unresolved request for the trade already exists.
    Existing(ExitRetryRequest),
}

/// Storage for exit retry requests.
///
/// A request counts as unresolved until it is resolved; a dead-lettered
/// request still blocks a new one for the same trade so a dead exit is not
/// silently retried.
#[async_trait]
pub trait ExitRetryRepository: Send + Sync {
    /// Insert unless the trade already has an unresolved request.
    async fn insert_if_absent(
        &self,
        request: &ExitRetryRequest,
    ) -> Result<EnqueueOutcome, RepositoryError>;

    /// Replace a request if the stored version still equals `expected_version`.
    async fn save(
        &self,
        request: &ExitRetryRequest,
        expected_version: u64,
    ) -> Result<(), RepositoryError>;

    /// Find by id.
    async fn find(&self, id: &ExitRetryId) -> Result<Option<ExitRetryRequest>, RepositoryError>;

    /// The unresolved request for a trade, if any.
    async fn find_unresolved_for_trade(
        &self,
        trade_id: &TradeId,
    ) -> Result<Option<ExitRetryRequest>, RepositoryError>;

    /// Pending requests whose next attempt time is at or before `now`,
    /// earliest first.
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<ExitRetryRequest>, RepositoryError>;

    /// Every request.
    async fn list(&self) -> Result<Vec<ExitRetryRequest>, RepositoryError>;
}
