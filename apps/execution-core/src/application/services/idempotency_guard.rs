//! Idempotency Guard
//!
//! Runs an externally triggered mutating operation at most once per
//! (user, key, payload). The first caller claims the key with an atomic
//! insert; later callers replay the stored outcome or get a conflict. A
//! claimed call that is dropped midway is recorded as failed.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::application::ports::{AuditEvent, AuditSink, Clock};
use crate::domain::idempotency::{
    ClaimOutcome, IdempotencyKey, IdempotencyRecord, IdempotencyRepository, IdempotencyStatus,
    request_hash,
};
use crate::domain::shared::UserId;

/// Errors from a guarded call. `E` is the operation's own error.
#[derive(Debug, Error)]
pub enum IdempotencyError<E> {
    /// The key was used before with a different payload.
    #[error("Idempotency key {key} was already used with a different request")]
    PayloadMismatch {
        /// (user, key).
        key: String,
    },

    /// Another call with the same key is still running.
    #[error("Request with idempotency key {key} is already in progress")]
    InProgress {
        /// (user, key).
        key: String,
    },

    /// The original call failed; its failure is replayed.
    #[error("Request with idempotency key {key} previously failed: {message}")]
    ReplayedFailure {
        /// (user, key).
        key: String,
        /// Stored error message.
        message: String,
    },

    /// The operation itself failed.
    #[error("{0}")]
    Operation(E),

    /// Record storage or (de)serialization failed.
    #[error("Idempotency storage error: {0}")]
    Storage(String),
}

/// Stored as the failure of a call whose caller went away mid-operation.
const CANCELLED: &str = "request was cancelled before it completed; its outcome is unknown";

/// Marks a claimed key failed when the guarded call is dropped before it
/// settles, so retries with the key are not refused as in progress forever.
struct PendingClaim {
    repo: Arc<dyn IdempotencyRepository>,
    clock: Arc<dyn Clock>,
    key: Option<IdempotencyKey>,
}

impl PendingClaim {
    /// The call settled on its own; nothing to release.
    fn settle(mut self) {
        self.key = None;
    }
}

impl Drop for PendingClaim {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        warn!(%key, "Guarded call dropped before completing, releasing its key as failed");
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(%key, "No runtime to release the cancelled idempotency claim");
            return;
        };
        let repo = Arc::clone(&self.repo);
        let now = self.clock.now();
        runtime.spawn(async move {
            if let Err(e) = repo.fail(&key, CANCELLED.to_string(), now).await {
                error!(%key, error = %e, "Failed to release cancelled idempotency claim");
            }
        });
    }
}

/// Deduplicates guarded calls through an [`IdempotencyRepository`].
pub struct IdempotencyGuard {
    repo: Arc<dyn IdempotencyRepository>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl IdempotencyGuard {
    /// Create the guard.
    pub fn new(
        repo: Arc<dyn IdempotencyRepository>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { repo, audit, clock }
    }

    /// Run `operation` under `key`. Without a key the operation runs directly.
    pub async fn execute<Req, Res, E, F, Fut>(
        &self,
        user_id: &UserId,
        key: Option<&str>,
        request: &Req,
        operation: F,
    ) -> Result<Res, IdempotencyError<E>>
    where
        Req: Serialize + ?Sized,
        Res: Serialize + DeserializeOwned,
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Res, E>>,
    {
        let Some(key) = key.filter(|k| !k.trim().is_empty()) else {
            return operation().await.map_err(IdempotencyError::Operation);
        };

        let key = IdempotencyKey::new(user_id.clone(), key);
        let hash = request_hash(request).map_err(|e| IdempotencyError::Storage(e.to_string()))?;
        let record = IdempotencyRecord::in_progress(key.clone(), hash.clone(), self.clock.now());

        let claim = self
            .repo
            .try_insert(&record)
            .await
            .map_err(|e| IdempotencyError::Storage(e.to_string()))?;

        match claim {
            ClaimOutcome::Claimed => self.run(&key, operation).await,
            ClaimOutcome::Existing(existing) => self.replay(&key, &hash, existing).await,
        }
    }

    async fn run<Res, E, F, Fut>(
        &self,
        key: &IdempotencyKey,
        operation: F,
    ) -> Result<Res, IdempotencyError<E>>
    where
        Res: Serialize,
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Res, E>>,
    {
        debug!(%key, "Idempotency key claimed, running operation");
        let claim = PendingClaim {
            repo: Arc::clone(&self.repo),
            clock: Arc::clone(&self.clock),
            key: Some(key.clone()),
        };
        let outcome = operation().await;
        claim.settle();
        match outcome {
            Ok(response) => {
                let stored = serde_json::to_value(&response)
                    .map_err(|e| IdempotencyError::<E>::Storage(e.to_string()));
                match stored {
                    Ok(value) => {
                        if let Err(e) = self.repo.complete(key, value, self.clock.now()).await {
                            error!(%key, error = %e, "Failed to persist idempotent response");
                        }
                    }
                    Err(e) => {
                        error!(%key, error = %e, "Failed to serialize idempotent response");
                        if let Err(e) = self.repo.fail(key, e.to_string(), self.clock.now()).await {
                            error!(%key, error = %e, "Failed to persist idempotent failure");
                        }
                    }
                }
                Ok(response)
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(store_err) = self.repo.fail(key, message, self.clock.now()).await {
                    error!(%key, error = %store_err, "Failed to persist idempotent failure");
                }
                Err(IdempotencyError::Operation(e))
            }
        }
    }

    async fn replay<Res, E>(
        &self,
        key: &IdempotencyKey,
        hash: &str,
        existing: IdempotencyRecord,
    ) -> Result<Res, IdempotencyError<E>>
    where
        Res: DeserializeOwned,
    {
        if existing.request_hash != hash {
            warn!(%key, "Idempotency key reused with a different payload");
            return Err(IdempotencyError::PayloadMismatch {
                key: key.to_string(),
            });
        }

        match existing.status {
            IdempotencyStatus::InProgress => Err(IdempotencyError::InProgress {
                key: key.to_string(),
            }),
            IdempotencyStatus::Failed => Err(IdempotencyError::ReplayedFailure {
                key: key.to_string(),
                message: existing.error.unwrap_or_default(),
            }),
            IdempotencyStatus::Completed => {
                let value = existing.response.unwrap_or(serde_json::Value::Null);
                let response = serde_json::from_value(value)
                    .map_err(|e| IdempotencyError::Storage(e.to_string()))?;
                debug!(%key, "Replaying stored idempotent response");
                self.audit
                    .record_best_effort(
                        AuditEvent::new(
                            "idempotency",
                            "replay",
                            format!("Replayed response for key {}", key.key),
                            self.clock.now(),
                        )
                        .for_user(key.user_id.clone())
                        .with_metadata(json!({ "key": key.key })),
                    )
                    .await;
                Ok(response)
            }
        }
    }
}
