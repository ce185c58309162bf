//! Domain event publishing.

use crate::error::Result;
use crate::events::GateEvent;
use tokio::sync::broadcast;

/// Fire-and-forget publisher for [`GateEvent`]s.
pub trait EventPublisher: Send + Sync {
    /// Publish an event.
    ///
    /// # Errors
    ///
    /// Returns error if the bus rejects the event. The gate logs and
    /// discards publish errors.
    fn publish(&self, event: GateEvent) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// In-process event bus on a broadcast channel.
///
/// Subscribers that fall behind lose the oldest events. Publishing with no
/// subscribers succeeds and drops the event.
///
/// # Example
///
/// ```
/// use auth_gate::providers::BroadcastEventPublisher;
///
/// let bus = BroadcastEventPublisher::new(64);
/// let mut rx = bus.subscribe();
/// # drop(rx);
/// ```
#[derive(Clone, Debug)]
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<GateEvent>,
}

impl BroadcastEventPublisher {
    /// Create a bus that buffers up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GateEvent> {
        self.sender.subscribe()
    }
}

impl EventPublisher for BroadcastEventPublisher {
    async fn publish(&self, event: GateEvent) -> Result<()> {
        let topic = event.topic();
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::debug!(topic, receivers, "Event published");
                Ok(())
            }
            // Only fails when nobody is listening.
            Err(_) => {
                tracing::debug!(topic, "Event dropped, no subscribers");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::state::UserId;
    use chrono::Utc;

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = BroadcastEventPublisher::new(8);
        let mut rx = bus.subscribe();

        bus.publish(GateEvent::TokenRefreshed {
            user_id: Some(UserId::new("u1")),
            timestamp: Utc::now(),
        })
        .await
        .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.topic(), "token-refreshed-events");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = BroadcastEventPublisher::new(8);
        let result = bus
            .publish(GateEvent::TokenRefreshed {
                user_id: None,
                timestamp: Utc::now(),
            })
            .await;
        assert!(result.is_ok());
    }
}
