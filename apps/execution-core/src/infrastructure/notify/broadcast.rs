//! Notification fan-out over a tokio broadcast channel.
//!
//! Publishing with no subscribers is not an error. Slow subscribers lag and
//! lose the oldest messages; the publisher never blocks.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::application::ports::{Notification, NotificationPort, PortError};

/// Broadcast notifier.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    /// Create a notifier buffering up to `capacity` messages per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to every notification published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Current subscriber count.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl NotificationPort for BroadcastNotifier {
    async fn publish(&self, notification: Notification) -> Result<(), PortError> {
        let kind = notification.kind;
        match self.tx.send(notification) {
            Ok(receivers) => debug!(?kind, receivers, "Notification published"),
            Err(_) => debug!(?kind, "Notification dropped, no subscribers"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::NotificationKind;
    use chrono::Utc;

    #[tokio::test]
    async fn subscribers_receive_published_messages() {
        let notifier = BroadcastNotifier::new(4);
        let mut rx = notifier.subscribe();

        notifier
            .publish(Notification::new(NotificationKind::Status, "safe mode on", Utc::now()))
            .await
            .unwrap();

        let got = rx.recv().await.unwrap();
        assert_eq!(got.kind, NotificationKind::Status);
        assert_eq!(got.message, "safe mode on");
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let notifier = BroadcastNotifier::new(4);
        let result = notifier
            .publish(Notification::new(NotificationKind::Alert, "nobody listening", Utc::now()))
            .await;
        assert!(result.is_ok());
    }
}
