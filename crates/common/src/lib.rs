//! Shared types for the storefront fulfillment core.

pub mod clock;
pub mod types;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use types::{
    AdjustmentId, EventId, InventoryItemId, OrderId, ProductId, ReservationId, UserId,
};
