//! Audit Port (Driven Port)
//!
//! Append-only event log for state-significant actions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PortError;
use crate::domain::shared::UserId;

/// One audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Acting or affected user, if any.
    pub user_id: Option<UserId>,
    /// Event family (`order`, `trade`, `exit_retry`, `supervisor`, ...).
    pub event_type: String,
    /// What happened (`dead_letter`, `panic`, `replay`, ...).
    pub action: String,
    /// Free text.
    pub description: String,
    /// Structured details.
    pub metadata: serde_json::Value,
    /// When it happened.
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    /// Create an event without metadata.
    pub fn new(
        event_type: impl Into<String>,
        action: impl Into<String>,
        description: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: None,
            event_type: event_type.into(),
            action: action.into(),
            description: description.into(),
            metadata: serde_json::Value::Null,
            at,
        }
    }

    /// Attach the user.
    #[must_use]
    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Port for the audit log.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append an event.
    async fn record(&self, event: AuditEvent) -> Result<(), PortError>;

    /// Append and log instead of returning a failure.
    async fn record_best_effort(&self, event: AuditEvent) {
        let action = event.action.clone();
        if let Err(e) = self.record(event).await {
            tracing::warn!(%action, error = %e, "Audit write failed");
        }
    }
}
