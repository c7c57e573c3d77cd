use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{InventoryItemId, OrderId, ProductId, ReservationId};

use crate::{
    InventoryAdjustment, InventoryItem, ItemUpdate, Reservation, ReservationStatus, Result,
};

/// Persistent storage for inventory items, reservations and adjustments.
///
/// Every mutating method is one atomic unit: the availability check and the
/// counter update happen together, so concurrent callers can never reserve
/// more than is available.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Inserts a new item. Fails with `DuplicateProduct` if the product
    /// already has one.
    async fn insert_item(&self, item: InventoryItem) -> Result<InventoryItem>;

    /// Loads the item for a product.
    async fn get_item(&self, product_id: &ProductId) -> Result<Option<InventoryItem>>;

    /// Loads an item by its own ID.
    async fn get_item_by_id(&self, id: InventoryItemId) -> Result<Option<InventoryItem>>;

    /// Loads an item by SKU. SKUs are not unique; the lowest product id wins.
    async fn get_item_by_sku(&self, sku: &str) -> Result<Option<InventoryItem>>;

    /// Applies reorder settings and location. Fails with `ItemNotFound`.
    async fn update_item(
        &self,
        id: InventoryItemId,
        update: &ItemUpdate,
        now: DateTime<Utc>,
    ) -> Result<InventoryItem>;

    /// Lists items ordered by product id.
    async fn list_items(&self, limit: i64, offset: i64) -> Result<Vec<InventoryItem>>;

    /// Items in `low_stock` or `out_of_stock`, least available first.
    async fn low_stock_items(&self) -> Result<Vec<InventoryItem>>;

    /// Items with nothing available.
    async fn out_of_stock_items(&self) -> Result<Vec<InventoryItem>>;

    /// Raises the item's reserved counter by the reservation's quantity and
    /// records the reservation, provided enough stock is available.
    ///
    /// Returns the updated item alongside the stored reservation.
    async fn reserve(&self, reservation: Reservation) -> Result<(InventoryItem, Reservation)>;

    /// Moves a pending reservation to a terminal status and gives its units
    /// back. `Fulfilled` also removes the units from on-hand stock.
    ///
    /// Fails with `ReleaseAlreadyTerminal` if the reservation already left
    /// `Pending`; the counters are untouched in that case.
    async fn settle_reservation(
        &self,
        reservation_id: ReservationId,
        status: ReservationStatus,
        now: DateTime<Utc>,
    ) -> Result<(InventoryItem, Reservation)>;

    /// Loads a reservation.
    async fn get_reservation(&self, reservation_id: ReservationId) -> Result<Option<Reservation>>;

    /// All reservations held for an order, oldest first.
    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>>;

    /// Pending reservations whose deadline is before `now`, oldest first.
    async fn expired_reservations(&self, now: DateTime<Utc>, limit: i64)
    -> Result<Vec<Reservation>>;

    /// Applies a manual stock change and records it in the audit log.
    async fn adjust(&self, adjustment: InventoryAdjustment) -> Result<InventoryItem>;

    /// Audit records for a product, newest first.
    async fn adjustments_for_product(
        &self,
        product_id: &ProductId,
        limit: i64,
    ) -> Result<Vec<InventoryAdjustment>>;
}
