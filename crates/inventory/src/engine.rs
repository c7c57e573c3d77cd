//! Inventory engine: the only entry point that mutates stock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{InventoryItemId, OrderId, ProductId, ReservationId, SharedClock, UserId};
use events::{EventPublisher, EventPublisherExt, topics};
use serde::Serialize;

use crate::{
    AdjustmentRequest, EngineConfig, InventoryAdjustment, InventoryError, InventoryItem,
    ItemCache, ItemUpdate, NewInventoryItem, Reservation, ReservationStatus, Result, StockStatus,
    store::InventoryStore,
};

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Pending reservations found past their deadline.
    pub scanned: usize,
    /// Reservations moved to `Expired`.
    pub expired: usize,
    /// Reservations that reached a terminal state concurrently.
    pub skipped: usize,
    /// Reservations that could not be expired; they stay pending.
    pub failed: usize,
}

#[derive(Serialize)]
struct ItemPayload<'a> {
    product_id: &'a ProductId,
    sku: &'a str,
    quantity: i64,
    reserved_quantity: i64,
    available_quantity: i64,
    status: StockStatus,
}

impl<'a> From<&'a InventoryItem> for ItemPayload<'a> {
    fn from(item: &'a InventoryItem) -> Self {
        Self {
            product_id: &item.product_id,
            sku: &item.sku,
            quantity: item.quantity,
            reserved_quantity: item.reserved_quantity,
            available_quantity: item.available_quantity,
            status: item.status,
        }
    }
}

#[derive(Serialize)]
struct ReservationPayload<'a> {
    reservation_id: ReservationId,
    product_id: &'a ProductId,
    order_id: OrderId,
    customer_id: UserId,
    quantity: i64,
    status: ReservationStatus,
    expires_at: DateTime<Utc>,
    available_quantity: i64,
}

impl<'a> ReservationPayload<'a> {
    fn new(reservation: &'a Reservation, item: &InventoryItem) -> Self {
        Self {
            reservation_id: reservation.id,
            product_id: &reservation.product_id,
            order_id: reservation.order_id,
            customer_id: reservation.customer_id,
            quantity: reservation.quantity,
            status: reservation.status,
            expires_at: reservation.expires_at,
            available_quantity: item.available_quantity,
        }
    }
}

#[derive(Serialize)]
struct AdjustmentPayload<'a> {
    #[serde(flatten)]
    item: ItemPayload<'a>,
    delta: i64,
    reason: &'a str,
    adjusted_by: &'a str,
}

#[derive(Serialize)]
struct ReorderPayload<'a> {
    #[serde(flatten)]
    item: ItemPayload<'a>,
    reorder_level: i64,
    reorder_quantity: i64,
}

/// Coordinates the store, the read cache and event publication.
///
/// Cheap to share behind an `Arc`: the saga, the HTTP layer and the reaper
/// all hold the same engine.
pub struct InventoryEngine<S: InventoryStore> {
    store: S,
    cache: ItemCache,
    publisher: Arc<dyn EventPublisher>,
    clock: SharedClock,
    config: EngineConfig,
}

impl<S: InventoryStore> InventoryEngine<S> {
    /// Creates a new engine.
    pub fn new(
        store: S,
        publisher: Arc<dyn EventPublisher>,
        clock: SharedClock,
        config: EngineConfig,
    ) -> Self {
        let cache = ItemCache::new(config.cache_ttl, clock.clone());
        Self {
            store,
            cache,
            publisher,
            clock,
            config,
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Onboards a product. The item starts with nothing reserved.
    #[tracing::instrument(skip(self, new), fields(product_id = %new.product_id))]
    pub async fn create_item(&self, new: NewInventoryItem) -> Result<InventoryItem> {
        let item = InventoryItem::from_new(new, self.clock.now())?;
        let item = self.store.insert_item(item).await?;

        tracing::info!(sku = %item.sku, quantity = item.quantity, "inventory item created");
        self.publisher
            .emit(
                topics::INVENTORY_EVENTS,
                item.product_id.as_str(),
                topics::INVENTORY_CREATED,
                &ItemPayload::from(&item),
            )
            .await;
        self.warn_if_low(&item, StockStatus::InStock).await;
        Ok(item)
    }

    /// Looks up a product's stock, serving from the cache when fresh.
    pub async fn get_by_product_id(&self, product_id: &ProductId) -> Result<InventoryItem> {
        if let Some(item) = self.cache.get(product_id).await {
            return Ok(item);
        }

        let generation = self.cache.generation(product_id).await;
        let item = self
            .store
            .get_item(product_id)
            .await?
            .ok_or_else(|| InventoryError::ProductNotFound(product_id.clone()))?;
        self.cache.put(item.clone(), generation).await;
        Ok(item)
    }

    /// Looks up an item by its own ID. Not cached.
    pub async fn get_item(&self, id: InventoryItemId) -> Result<InventoryItem> {
        self.store
            .get_item_by_id(id)
            .await?
            .ok_or(InventoryError::ItemNotFound(id))
    }

    /// Looks up an item by SKU. Not cached.
    pub async fn get_by_sku(&self, sku: &str) -> Result<InventoryItem> {
        self.store
            .get_item_by_sku(sku)
            .await?
            .ok_or_else(|| InventoryError::SkuNotFound(sku.to_string()))
    }

    /// Changes an item's reorder settings or location.
    ///
    /// Raising the reorder level can move the item into `low_stock`, which
    /// publishes the usual low-stock notification.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_item(&self, id: InventoryItemId, update: ItemUpdate) -> Result<InventoryItem> {
        update.validate()?;
        let current = self.get_item(id).await?;
        if update.is_empty() {
            return Ok(current);
        }
        let previous = current.status;

        let item = self.store.update_item(id, &update, self.clock.now()).await?;
        self.cache.invalidate(&item.product_id).await;

        tracing::info!(
            product_id = %item.product_id,
            reorder_level = item.reorder_level,
            reorder_quantity = item.reorder_quantity,
            location = %item.location,
            "inventory item updated"
        );
        self.publisher
            .emit(
                topics::INVENTORY_EVENTS,
                item.product_id.as_str(),
                topics::INVENTORY_UPDATED,
                &ReorderPayload {
                    item: ItemPayload::from(&item),
                    reorder_level: item.reorder_level,
                    reorder_quantity: item.reorder_quantity,
                },
            )
            .await;
        self.warn_if_low(&item, previous).await;
        Ok(item)
    }

    /// Places a hold on `quantity` units for an order.
    ///
    /// Either the whole quantity is held or nothing changes. The hold lapses
    /// after the configured TTL unless it is committed or released first.
    #[tracing::instrument(skip(self), fields(product_id = %product_id, order_id = %order_id))]
    pub async fn reserve(
        &self,
        product_id: &ProductId,
        quantity: u32,
        order_id: OrderId,
        customer_id: UserId,
    ) -> Result<Reservation> {
        if quantity == 0 {
            return Err(InventoryError::InvalidQuantity(0));
        }

        let now = self.clock.now();
        let reservation = Reservation::pending(
            product_id.clone(),
            i64::from(quantity),
            order_id,
            customer_id,
            now,
            now + self.config.reservation_ttl,
        );

        let (item, reservation) = match self.store.reserve(reservation).await {
            Ok(reserved) => reserved,
            Err(e) => {
                if matches!(e, InventoryError::InsufficientStock { .. }) {
                    metrics::counter!("inventory_reservations_rejected").increment(1);
                    tracing::info!(error = %e, "reservation rejected");
                }
                return Err(e);
            }
        };
        self.cache.invalidate(product_id).await;

        metrics::counter!("inventory_reservations_total").increment(1);
        tracing::info!(
            reservation_id = %reservation.id,
            quantity = reservation.quantity,
            available = item.available_quantity,
            "stock reserved"
        );

        self.publisher
            .emit(
                topics::INVENTORY_EVENTS,
                product_id.as_str(),
                topics::INVENTORY_RESERVED,
                &ReservationPayload::new(&reservation, &item),
            )
            .await;

        let previous = StockStatus::derive(
            item.available_quantity + reservation.quantity,
            item.reorder_level,
        );
        self.warn_if_low(&item, previous).await;

        Ok(reservation)
    }

    /// Cancels a pending hold and returns its units to available stock.
    ///
    /// Releasing a reservation that already left `Pending` fails with
    /// `ReleaseAlreadyTerminal` and changes nothing.
    #[tracing::instrument(skip(self))]
    pub async fn release_reservation(&self, reservation_id: ReservationId) -> Result<Reservation> {
        self.settle(reservation_id, ReservationStatus::Cancelled)
            .await
    }

    /// Converts a pending hold into a permanent deduction of on-hand stock.
    #[tracing::instrument(skip(self))]
    pub async fn commit_reservation(&self, reservation_id: ReservationId) -> Result<Reservation> {
        self.settle(reservation_id, ReservationStatus::Fulfilled)
            .await
    }

    /// Applies a manual stock change and records it in the audit log.
    ///
    /// Decrements are clamped so on-hand stock never drops below zero or
    /// below what is currently reserved.
    #[tracing::instrument(skip(self, request), fields(product_id = %request.product_id, delta = request.delta))]
    pub async fn adjust(&self, request: AdjustmentRequest) -> Result<InventoryItem> {
        if request.reason.trim().is_empty() {
            return Err(InventoryError::InvalidData(
                "adjustment reason must not be empty".to_string(),
            ));
        }

        let previous = self
            .store
            .get_item(&request.product_id)
            .await?
            .ok_or_else(|| InventoryError::ProductNotFound(request.product_id.clone()))?
            .status;

        let record = request.into_record(self.clock.now());
        let product_id = record.product_id.clone();
        let delta = record.quantity;
        let reason = record.reason.clone();
        let adjusted_by = record.adjusted_by.clone();

        let item = self.store.adjust(record).await?;
        self.cache.invalidate(&product_id).await;

        tracing::info!(
            quantity = item.quantity,
            available = item.available_quantity,
            %reason,
            "inventory adjusted"
        );
        self.publisher
            .emit(
                topics::INVENTORY_EVENTS,
                product_id.as_str(),
                topics::INVENTORY_ADJUSTED,
                &AdjustmentPayload {
                    item: ItemPayload::from(&item),
                    delta,
                    reason: &reason,
                    adjusted_by: &adjusted_by,
                },
            )
            .await;

        self.warn_if_low(&item, previous).await;
        Ok(item)
    }

    /// Items at or below their reorder level, least available first.
    pub async fn get_low_stock_items(&self) -> Result<Vec<InventoryItem>> {
        self.store.low_stock_items().await
    }

    /// Items with nothing available.
    pub async fn get_out_of_stock_items(&self) -> Result<Vec<InventoryItem>> {
        self.store.out_of_stock_items().await
    }

    /// Lists items by product id.
    pub async fn list_items(&self, limit: i64, offset: i64) -> Result<Vec<InventoryItem>> {
        self.store.list_items(limit, offset).await
    }

    /// Loads a reservation.
    pub async fn get_reservation(&self, reservation_id: ReservationId) -> Result<Reservation> {
        self.store
            .get_reservation(reservation_id)
            .await?
            .ok_or(InventoryError::ReservationNotFound(reservation_id))
    }

    /// All reservations placed for an order.
    pub async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        self.store.reservations_for_order(order_id).await
    }

    /// Audit trail of manual changes for a product, newest first.
    pub async fn adjustments_for_product(
        &self,
        product_id: &ProductId,
        limit: i64,
    ) -> Result<Vec<InventoryAdjustment>> {
        self.store.adjustments_for_product(product_id, limit).await
    }

    /// Expires every pending reservation whose deadline has passed.
    ///
    /// A reservation released concurrently is skipped; a failure on one
    /// reservation never stops the sweep.
    #[tracing::instrument(skip(self))]
    pub async fn expire_reservations(&self) -> Result<ReapReport> {
        let now = self.clock.now();
        let batch_size = self.config.reaper_batch_size.max(1);
        let mut report = ReapReport::default();

        loop {
            let batch = self.store.expired_reservations(now, batch_size).await?;
            let fetched = batch.len();
            let mut progressed = 0;

            for reservation in batch {
                report.scanned += 1;
                match self.settle(reservation.id, ReservationStatus::Expired).await {
                    Ok(_) => {
                        report.expired += 1;
                        progressed += 1;
                    }
                    Err(InventoryError::ReleaseAlreadyTerminal { .. }) => {
                        report.skipped += 1;
                        progressed += 1;
                    }
                    Err(e) => {
                        report.failed += 1;
                        tracing::error!(
                            reservation_id = %reservation.id,
                            error = %e,
                            "failed to expire reservation"
                        );
                    }
                }
            }

            // Failed reservations would be fetched again; leave them for the next sweep.
            if (fetched as i64) < batch_size || progressed < fetched {
                break;
            }
        }

        if report.expired > 0 {
            metrics::counter!("inventory_reservations_expired").increment(report.expired as u64);
            tracing::info!(
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                "expired stale reservations"
            );
        }
        Ok(report)
    }

    async fn settle(
        &self,
        reservation_id: ReservationId,
        status: ReservationStatus,
    ) -> Result<Reservation> {
        let (item, reservation) = self
            .store
            .settle_reservation(reservation_id, status, self.clock.now())
            .await?;
        self.cache.invalidate(&item.product_id).await;

        let event_type = match status {
            ReservationStatus::Fulfilled => topics::INVENTORY_RESERVATION_FULFILLED,
            ReservationStatus::Expired => topics::INVENTORY_RESERVATION_EXPIRED,
            _ => topics::INVENTORY_RESERVATION_RELEASED,
        };
        tracing::info!(
            %reservation_id,
            product_id = %item.product_id,
            quantity = reservation.quantity,
            status = %reservation.status,
            "reservation settled"
        );
        self.publisher
            .emit(
                topics::INVENTORY_EVENTS,
                item.product_id.as_str(),
                event_type,
                &ReservationPayload::new(&reservation, &item),
            )
            .await;

        Ok(reservation)
    }

    /// Publishes a low-stock notification when an item has just crossed
    /// into `low_stock` or `out_of_stock`.
    async fn warn_if_low(&self, item: &InventoryItem, previous: StockStatus) {
        if item.status == StockStatus::InStock || item.status == previous {
            return;
        }

        tracing::warn!(
            product_id = %item.product_id,
            available = item.available_quantity,
            reorder_level = item.reorder_level,
            status = %item.status,
            "stock below reorder level"
        );
        self.publisher
            .emit(
                topics::INVENTORY_EVENTS,
                item.product_id.as_str(),
                topics::INVENTORY_LOW_STOCK,
                &ReorderPayload {
                    item: ItemPayload::from(item),
                    reorder_level: item.reorder_level,
                    reorder_quantity: item.reorder_quantity,
                },
            )
            .await;
    }
}
