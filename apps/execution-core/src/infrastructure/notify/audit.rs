//! Append-only in-memory audit log, mirrored to `tracing` under the
//! `audit` target.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::info;

use crate::application::ports::{AuditEvent, AuditSink, PortError};

/// In-memory audit log.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().clone()
    }

    /// Events with the given action.
    #[must_use]
    pub fn events_with_action(&self, action: &str) -> Vec<AuditEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }

    /// The newest `limit` events, newest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<AuditEvent> {
        self.events.read().iter().rev().take(limit).cloned().collect()
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn record(&self, event: AuditEvent) -> Result<(), PortError> {
        info!(
            target: "audit",
            event_type = %event.event_type,
            action = %event.action,
            user_id = event.user_id.as_ref().map(|u| u.as_str()),
            metadata = %event.metadata,
            "{}",
            event.description
        );
        self.events.write().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn filters_by_action_and_keeps_order() {
        let log = InMemoryAuditLog::new();
        for action in ["replay", "dead_letter", "replay"] {
            log.record(AuditEvent::new("order", action, "x", Utc::now()))
                .await
                .unwrap();
        }

        assert_eq!(log.len(), 3);
        assert_eq!(log.events_with_action("replay").len(), 2);
        assert_eq!(log.recent(1)[0].action, "replay");
        assert_eq!(log.events()[1].action, "dead_letter");
    }
}
