use async_trait::async_trait;

use crate::{EventEnvelope, EventPublisher, Result};

/// Publisher that writes every event to the log and keeps nothing.
///
/// Stands in for the broker when the server runs without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: EventEnvelope) -> Result<()> {
        tracing::info!(
            event_id = %event.event_id,
            topic = %event.topic,
            key = %event.key,
            event_type = %event.event_type,
            payload = %event.payload,
            "event published"
        );
        Ok(())
    }
}
