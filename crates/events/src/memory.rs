use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};

use crate::{EventEnvelope, EventPublisher, PublishError, Result};

const CHANNEL_CAPACITY: usize = 1024;

/// In-process event bus.
///
/// Keeps every published event for inspection and fans them out to
/// subscribers over a broadcast channel. Used for tests and for running
/// the service without an external broker.
#[derive(Clone)]
pub struct InMemoryEventBus {
    published: Arc<RwLock<Vec<EventEnvelope>>>,
    sender: broadcast::Sender<EventEnvelope>,
    fail_on_publish: Arc<AtomicBool>,
}

impl InMemoryEventBus {
    /// Creates a new empty bus.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            published: Arc::new(RwLock::new(Vec::new())),
            sender,
            fail_on_publish: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribes to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Makes every subsequent publish fail (simulates a broker outage).
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.fail_on_publish.store(fail, Ordering::SeqCst);
    }

    /// Returns all events published so far, in publish order.
    pub async fn published(&self) -> Vec<EventEnvelope> {
        self.published.read().await.clone()
    }

    /// Returns the event types published so far, in publish order.
    pub async fn event_types(&self) -> Vec<String> {
        self.published
            .read()
            .await
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    /// Returns the published events of one type.
    pub async fn events_of_type(&self, event_type: &str) -> Vec<EventEnvelope> {
        self.published
            .read()
            .await
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Returns the number of events published so far.
    pub async fn event_count(&self) -> usize {
        self.published.read().await.len()
    }

    /// Clears the published log.
    pub async fn clear(&self) {
        self.published.write().await.clear();
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: EventEnvelope) -> Result<()> {
        if self.fail_on_publish.load(Ordering::SeqCst) {
            return Err(PublishError::Unavailable("bus is down".to_string()));
        }

        tracing::debug!(
            topic = %event.topic,
            key = %event.key,
            event_type = %event.event_type,
            "event published"
        );
        self.published.write().await.push(event.clone());
        // No subscribers is fine: the log above is the durable record.
        let _ = self.sender.send(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventPublisherExt;
    use crate::topics;

    fn order_created(key: &str) -> EventEnvelope {
        EventEnvelope::new(
            topics::ORDER_EVENTS,
            key,
            topics::ORDER_CREATED,
            serde_json::json!({"order_id": key}),
        )
    }

    #[tokio::test]
    async fn test_publish_records_event() {
        let bus = InMemoryEventBus::new();
        bus.publish(order_created("o-1")).await.unwrap();
        bus.publish(order_created("o-2")).await.unwrap();

        assert_eq!(bus.event_count().await, 2);
        let keys: Vec<_> = bus.published().await.into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["o-1", "o-2"]);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = InMemoryEventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(order_created("o-1")).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, topics::ORDER_CREATED);
        assert_eq!(received.key, "o-1");
    }

    #[tokio::test]
    async fn test_fail_on_publish() {
        let bus = InMemoryEventBus::new();
        bus.set_fail_on_publish(true);

        let result = bus.publish(order_created("o-1")).await;
        assert!(matches!(result, Err(PublishError::Unavailable(_))));
        assert_eq!(bus.event_count().await, 0);
    }

    #[tokio::test]
    async fn test_publish_or_log_swallows_failures() {
        let bus = InMemoryEventBus::new();
        bus.set_fail_on_publish(true);

        bus.publish_or_log(order_created("o-1")).await;
        assert_eq!(bus.event_count().await, 0);

        bus.set_fail_on_publish(false);
        bus.emit(
            topics::ORDER_EVENTS,
            "o-2",
            topics::ORDER_CANCELLED,
            &serde_json::json!({"reason": "customer request"}),
        )
        .await;
        assert_eq!(
            bus.event_types().await,
            vec![topics::ORDER_CANCELLED.to_string()]
        );
    }
}
