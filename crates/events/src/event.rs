use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::EventId;
use serde::{Deserialize, Serialize};

/// A message on the bus.
///
/// `key` is the partitioning key: the order ID for order events and the
/// product ID for inventory events, so events about one entity stay ordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique identifier for this event.
    pub event_id: EventId,

    /// Destination topic (e.g. "order-events").
    pub topic: String,

    /// Partitioning key.
    pub key: String,

    /// The type of the event (e.g. "order.created").
    pub event_type: String,

    /// When the event was created.
    pub timestamp: DateTime<Utc>,

    /// The event payload as JSON.
    pub payload: serde_json::Value,

    /// Additional metadata about the event.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelope {
    /// Creates an envelope with a raw JSON payload.
    pub fn new(
        topic: impl Into<String>,
        key: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            topic: topic.into(),
            key: key.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            payload,
            metadata: HashMap::new(),
        }
    }

    /// Creates an envelope from a serializable payload.
    pub fn from_payload<T: Serialize>(
        topic: impl Into<String>,
        key: impl Into<String>,
        event_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            topic,
            key,
            event_type,
            serde_json::to_value(payload)?,
        ))
    }

    /// Overrides the creation timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_new_creates_unique_ids() {
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn envelope_from_payload() {
        #[derive(Serialize)]
        struct Payload {
            order_number: &'static str,
        }

        let envelope = EventEnvelope::from_payload(
            "order-events",
            "order-1",
            "order.created",
            &Payload {
                order_number: "ORD-1",
            },
        )
        .unwrap()
        .with_metadata("source", serde_json::json!("order-saga"));

        assert_eq!(envelope.topic, "order-events");
        assert_eq!(envelope.key, "order-1");
        assert_eq!(envelope.event_type, "order.created");
        assert_eq!(envelope.payload["order_number"], "ORD-1");
        assert_eq!(
            envelope.metadata.get("source"),
            Some(&serde_json::json!("order-saga"))
        );
    }
}
