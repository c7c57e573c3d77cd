//! Inventory reservation engine.
//!
//! Tracks on-hand and reserved stock per product, places time-bounded holds
//! for orders, and expires holds that are never committed. Counter updates
//! are atomic per product, so concurrent reservations can never oversell.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod reaper;
pub mod store;

pub use cache::ItemCache;
pub use config::EngineConfig;
pub use engine::{InventoryEngine, ReapReport};
pub use error::{InventoryError, Result};
pub use memory::InMemoryInventoryStore;
pub use model::{
    AdjustmentRequest, InventoryAdjustment, InventoryItem, ItemUpdate, NewInventoryItem,
    Reservation, ReservationStatus, StockStatus,
};
pub use postgres::PostgresInventoryStore;
pub use reaper::ExpiryReaper;
pub use store::InventoryStore;
