use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::{EventEnvelope, Result};

/// Publishes state-transition events to the message bus.
///
/// Delivery is at-least-once: a publisher may deliver an event more than
/// once, and consumers deduplicate on [`EventEnvelope::event_id`].
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes a single event.
    async fn publish(&self, event: EventEnvelope) -> Result<()>;
}

#[async_trait]
impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    async fn publish(&self, event: EventEnvelope) -> Result<()> {
        (**self).publish(event).await
    }
}

/// Fire-and-forget helpers on top of [`EventPublisher`].
///
/// Callers in the saga and the inventory engine never fail an operation
/// because a notification could not be sent; failures are logged instead.
#[async_trait]
pub trait EventPublisherExt: EventPublisher {
    /// Publishes an event, logging instead of returning any failure.
    async fn publish_or_log(&self, event: EventEnvelope) {
        let event_type = event.event_type.clone();
        let key = event.key.clone();
        match self.publish(event).await {
            Ok(()) => {
                metrics::counter!("events_published_total").increment(1);
            }
            Err(e) => {
                metrics::counter!("events_publish_failures").increment(1);
                tracing::warn!(%event_type, %key, error = %e, "failed to publish event");
            }
        }
    }

    /// Serializes `payload` and publishes it, logging any failure.
    async fn emit<P: Serialize + Sync>(&self, topic: &str, key: &str, event_type: &str, payload: &P) {
        match EventEnvelope::from_payload(topic, key, event_type, payload) {
            Ok(envelope) => self.publish_or_log(envelope).await,
            Err(e) => {
                tracing::warn!(%event_type, %key, error = %e, "failed to serialize event payload");
            }
        }
    }
}

impl<T: EventPublisher + ?Sized> EventPublisherExt for T {}
