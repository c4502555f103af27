//! Idempotency Record
//!
//! One guarded call keyed by (user, key). Written in progress when a call
//! wins the insert race, then finalized once and never changed again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::domain::shared::UserId;

/// Lifecycle of a guarded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    /// The owning call is still running.
    InProgress,
    /// The call succeeded; the response is stored.
    Completed,
    /// The call failed; the error is stored.
    Failed,
}

impl fmt::Display for IdempotencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Storage key: caller plus caller-supplied key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdempotencyKey {
    /// Caller.
    pub user_id: UserId,
    /// Caller-supplied key.
    pub key: String,
}

impl IdempotencyKey {
    /// Create a key.
    #[must_use]
    pub fn new(user_id: UserId, key: impl Into<String>) -> Self {
        Self {
            user_id,
            key: key.into(),
        }
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.key)
    }
}

/// Stored state of one guarded call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// (user, key).
    pub key: IdempotencyKey,
    /// Hex SHA-256 of the serialized request.
    pub request_hash: String,
    /// Current status.
    pub status: IdempotencyStatus,
    /// Serialized response once completed.
    pub response: Option<serde_json::Value>,
    /// Error message once failed.
    pub error: Option<String>,
    /// When the call started.
    pub created_at: DateTime<Utc>,
    /// When the call was finalized.
    pub completed_at: Option<DateTime<Utc>>,
}

impl IdempotencyRecord {
    /// New in-progress record.
    #[must_use]
    pub fn in_progress(key: IdempotencyKey, request_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            key,
            request_hash,
            status: IdempotencyStatus::InProgress,
            response: None,
            error: None,
            created_at: now,
            completed_at: None,
        }
    }
}

/// Hex SHA-256 over the JSON encoding of `request`.
///
/// # Errors
///
/// Returns error if the request cannot be serialized.
pub fn request_hash<T: Serialize + ?Sized>(request: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(request)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_is_stable_and_payload_sensitive() {
        let a = request_hash(&json!({"symbol": "AAPL", "qty": 10})).unwrap();
        let b = request_hash(&json!({"symbol": "AAPL", "qty": 10})).unwrap();
        let c = request_hash(&json!({"symbol": "AAPL", "qty": 11})).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn new_record_is_in_progress() {
        let record = IdempotencyRecord::in_progress(
            IdempotencyKey::new(UserId::new("u-1"), "k-1"),
            "abc".to_string(),
            Utc::now(),
        );
        assert_eq!(record.status, IdempotencyStatus::InProgress);
        assert!(record.response.is_none());
        assert_eq!(record.key.to_string(), "u-1/k-1");
    }
}
