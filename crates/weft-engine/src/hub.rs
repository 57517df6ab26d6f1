//! Status change broadcasting.

use tokio::sync::broadcast;
use weft_core::StatusEvent;

/// Fan-out of [`StatusEvent`]s to any number of subscribers.
///
/// Publishing never blocks. A subscriber that falls behind loses the oldest
/// events and sees `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct StatusHub {
    sender: broadcast::Sender<StatusEvent>,
}

impl StatusHub {
    /// Create a hub buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to every status change published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }

    /// Publish a status change.
    pub fn publish(&self, event: StatusEvent) {
        // no subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for StatusHub {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::ActionStatus;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let hub = StatusHub::new(8);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        hub.publish(StatusEvent::new("x", 0, ActionStatus::Running));

        assert_eq!(a.recv().await.unwrap().status, ActionStatus::Running);
        assert_eq!(b.recv().await.unwrap().artifact_id, "x");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = StatusHub::default();
        hub.publish(StatusEvent::new("x", 0, ActionStatus::Pending));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber() {
        let hub = StatusHub::new(2);
        let mut rx = hub.subscribe();
        for ordinal in 0..5 {
            hub.publish(StatusEvent::new("x", ordinal, ActionStatus::Pending));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        assert_eq!(rx.recv().await.unwrap().ordinal, 3);
    }
}
