//! Saga error types.

use std::time::Duration;

use common::{OrderId, ProductId};
use inventory::InventoryError;
use orders::{OrderStatus, OrderStoreError};
use thiserror::Error;

use crate::compensation::CompensationFailure;
use crate::services::PaymentGatewayError;

/// Errors returned by the order saga.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A requested product does not have enough available stock.
    #[error(
        "Insufficient inventory for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientInventory {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    /// A requested product is not stocked.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The order's current status does not allow the operation.
    #[error("Cannot {operation} order {order_id} in status {status}")]
    InvalidOrderState {
        order_id: OrderId,
        status: OrderStatus,
        operation: &'static str,
    },

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The payment gateway declined, failed or timed out.
    #[error("Payment gateway error: {0}")]
    PaymentGateway(#[from] PaymentGatewayError),

    /// Reserving stock failed after the order was persisted.
    ///
    /// Reservations already made were released; any release that failed is
    /// listed in `compensation_failures` and left to the expiry reaper.
    #[error("Inventory reservation failed for order {order_id}: {reason}")]
    ReservationFailed {
        order_id: OrderId,
        reason: String,
        compensation_failures: Vec<CompensationFailure>,
    },

    /// The inventory engine did not answer in time.
    #[error("Inventory service timed out after {0:?}")]
    InventoryTimeout(Duration),

    /// The request is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Inventory engine error.
    #[error("Inventory error: {0}")]
    Inventory(InventoryError),

    /// Order store error.
    #[error("Order store error: {0}")]
    OrderStore(OrderStoreError),
}

impl From<InventoryError> for SagaError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::ProductNotFound(product_id) => SagaError::ProductNotFound(product_id),
            InventoryError::InsufficientStock {
                product_id,
                requested,
                available,
            } => SagaError::InsufficientInventory {
                product_id,
                requested,
                available,
            },
            other => SagaError::Inventory(other),
        }
    }
}

impl From<OrderStoreError> for SagaError {
    fn from(err: OrderStoreError) -> Self {
        match err {
            OrderStoreError::OrderNotFound(order_id) => SagaError::OrderNotFound(order_id),
            OrderStoreError::StatusConflict {
                order_id, actual, ..
            } => SagaError::InvalidOrderState {
                order_id,
                status: actual,
                operation: "update",
            },
            other => SagaError::OrderStore(other),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
