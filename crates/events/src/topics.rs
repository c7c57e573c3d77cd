//! Topic names and event type identifiers consumed by the notification service.

/// Topic for order lifecycle events, keyed by order ID.
pub const ORDER_EVENTS: &str = "order-events";

/// Topic for payment outcome events, keyed by order ID.
pub const PAYMENT_EVENTS: &str = "payment-events";

/// Topic for inventory events, keyed by product ID.
pub const INVENTORY_EVENTS: &str = "inventory-events";

pub const ORDER_CREATED: &str = "order.created";
pub const ORDER_CANCELLED: &str = "order.cancelled";
pub const ORDER_PROCESSING: &str = "order.processing";
pub const ORDER_SHIPPED: &str = "order.shipped";
pub const ORDER_DELIVERED: &str = "order.delivered";
pub const ORDER_REFUNDED: &str = "order.refunded";

pub const PAYMENT_SUCCESSFUL: &str = "payment_successful";
pub const PAYMENT_FAILED: &str = "payment_failed";

pub const INVENTORY_CREATED: &str = "inventory.created";
pub const INVENTORY_UPDATED: &str = "inventory.updated";
pub const INVENTORY_RESERVED: &str = "inventory.reserved";
pub const INVENTORY_RESERVATION_RELEASED: &str = "inventory.reservation_released";
pub const INVENTORY_RESERVATION_EXPIRED: &str = "inventory.reservation_expired";
pub const INVENTORY_RESERVATION_FULFILLED: &str = "inventory.reservation_fulfilled";
pub const INVENTORY_ADJUSTED: &str = "inventory.adjusted";
pub const INVENTORY_LOW_STOCK: &str = "inventory.low_stock";
