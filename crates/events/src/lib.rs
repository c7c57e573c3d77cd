//! Event publishing for order and inventory state transitions.
//!
//! Events are fire-and-forget with at-least-once delivery. The notification
//! service consumes them; nothing in the fulfillment core reads them back.

pub mod error;
pub mod event;
pub mod log;
pub mod memory;
pub mod publisher;
pub mod topics;

pub use common::EventId;
pub use error::{PublishError, Result};
pub use event::EventEnvelope;
pub use log::LogPublisher;
pub use memory::InMemoryEventBus;
pub use publisher::{EventPublisher, EventPublisherExt};
