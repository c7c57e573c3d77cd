use common::{InventoryItemId, ProductId, ReservationId};
use thiserror::Error;

use crate::ReservationStatus;

/// Errors that can occur in the inventory engine and its stores.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Not enough available stock to satisfy a reservation.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    /// No inventory item exists for the product.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// No inventory item has this ID.
    #[error("Inventory item not found: {0}")]
    ItemNotFound(InventoryItemId),

    /// No inventory item carries this SKU.
    #[error("No inventory item with SKU {0}")]
    SkuNotFound(String),

    /// The reservation does not exist.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// The reservation already left the pending state.
    #[error("Reservation {reservation_id} is already {status}")]
    ReleaseAlreadyTerminal {
        reservation_id: ReservationId,
        status: ReservationStatus,
    },

    /// Quantities must be positive (or non-negative for stock levels).
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    /// An inventory item already exists for the product.
    #[error("Inventory item already exists for product {0}")]
    DuplicateProduct(ProductId),

    /// A release or fulfilment would drive the reserved counter negative.
    #[error(
        "Reserved quantity underflow for product {product_id}: reserved {reserved}, requested {requested}"
    )]
    ReservedUnderflow {
        product_id: ProductId,
        reserved: i64,
        requested: i64,
    },

    /// Stored data could not be decoded.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
