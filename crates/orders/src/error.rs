use common::OrderId;
use thiserror::Error;

use crate::{Money, OrderStatus};

/// Errors that can occur when persisting or mutating orders.
#[derive(Debug, Error)]
pub enum OrderStoreError {
    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order's money breakdown does not add up.
    #[error("Amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch { expected: Money, actual: Money },

    /// The requested status is not a legal successor of the current one.
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: OrderStatus, to: OrderStatus },

    /// The order moved on since the caller last read it.
    #[error("Order {order_id} status conflict: expected {expected}, found {actual}")]
    StatusConflict {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// Input or stored data is malformed.
    #[error("Invalid order data: {0}")]
    InvalidData(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, OrderStoreError>;
