//! Notification Port (Driven Port)
//!
//! Fire-and-forget broadcast of status, order, position and reject events
//! to subscribers. A failed publish never fails the operation that caused it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PortError;
use crate::domain::shared::UserId;

/// Broadcast topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Order state change.
    Order,
    /// Position opened, closed or flattened.
    Position,
    /// Risk or validation rejection.
    Reject,
    /// Safe mode or emergency mode changed.
    Status,
    /// Reconciliation found a mismatch.
    Reconciliation,
    /// Operator attention required.
    Alert,
}

/// One broadcast message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Topic.
    pub kind: NotificationKind,
    /// Affected user, if any.
    pub user_id: Option<UserId>,
    /// Human-readable summary.
    pub message: String,
    /// Structured payload.
    pub payload: serde_json::Value,
    /// When it happened.
    pub at: DateTime<Utc>,
}

impl Notification {
    /// Create a notification without a payload.
    pub fn new(kind: NotificationKind, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            user_id: None,
            message: message.into(),
            payload: serde_json::Value::Null,
            at,
        }
    }

    /// Attach the affected user.
    #[must_use]
    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Attach a structured payload.
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Port for broadcasting notifications.
#[async_trait]
pub trait NotificationPort: Send + Sync {
    /// Publish one notification.
    async fn publish(&self, notification: Notification) -> Result<(), PortError>;

    /// Publish and log instead of returning a failure.
    async fn publish_best_effort(&self, notification: Notification) {
        let kind = notification.kind;
        if let Err(e) = self.publish(notification).await {
            tracing::warn!(?kind, error = %e, "Notification publish failed");
        }
    }
}
