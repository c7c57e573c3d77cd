use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{InventoryItemId, OrderId, ProductId, ReservationId};
use tokio::sync::RwLock;

use crate::{
    InventoryAdjustment, InventoryError, InventoryItem, ItemUpdate, Reservation, ReservationStatus,
    Result, StockStatus, store::InventoryStore,
};

#[derive(Default)]
struct State {
    items: HashMap<ProductId, InventoryItem>,
    reservations: HashMap<ReservationId, Reservation>,
    adjustments: Vec<InventoryAdjustment>,
}

/// In-memory inventory store for tests and database-less runs.
///
/// A single write lock covers items, reservations and adjustments, so every
/// mutating call is atomic in the same way a database transaction is.
#[derive(Clone, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryInventoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of reservations stored, in any status.
    pub async fn reservation_count(&self) -> usize {
        self.state.read().await.reservations.len()
    }

    /// Clears all data.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.items.clear();
        state.reservations.clear();
        state.adjustments.clear();
    }
}

fn sort_by_available(items: &mut [InventoryItem]) {
    items.sort_by(|a, b| {
        a.available_quantity
            .cmp(&b.available_quantity)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn insert_item(&self, item: InventoryItem) -> Result<InventoryItem> {
        let mut state = self.state.write().await;
        if state.items.contains_key(&item.product_id) {
            return Err(InventoryError::DuplicateProduct(item.product_id));
        }
        state.items.insert(item.product_id.clone(), item.clone());
        Ok(item)
    }

    async fn get_item(&self, product_id: &ProductId) -> Result<Option<InventoryItem>> {
        Ok(self.state.read().await.items.get(product_id).cloned())
    }

    async fn get_item_by_id(&self, id: InventoryItemId) -> Result<Option<InventoryItem>> {
        let state = self.state.read().await;
        Ok(state.items.values().find(|i| i.id == id).cloned())
    }

    async fn get_item_by_sku(&self, sku: &str) -> Result<Option<InventoryItem>> {
        let state = self.state.read().await;
        Ok(state
            .items
            .values()
            .filter(|i| i.sku == sku)
            .min_by(|a, b| a.product_id.cmp(&b.product_id))
            .cloned())
    }

    async fn update_item(
        &self,
        id: InventoryItemId,
        update: &ItemUpdate,
        now: DateTime<Utc>,
    ) -> Result<InventoryItem> {
        let mut state = self.state.write().await;
        let item = state
            .items
            .values_mut()
            .find(|i| i.id == id)
            .ok_or(InventoryError::ItemNotFound(id))?;
        item.apply_update(update, now);
        Ok(item.clone())
    }

    async fn list_items(&self, limit: i64, offset: i64) -> Result<Vec<InventoryItem>> {
        let state = self.state.read().await;
        let mut items: Vec<_> = state.items.values().cloned().collect();
        items.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        Ok(items
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn low_stock_items(&self) -> Result<Vec<InventoryItem>> {
        let state = self.state.read().await;
        let mut items: Vec<_> = state
            .items
            .values()
            .filter(|i| i.status != StockStatus::InStock)
            .cloned()
            .collect();
        sort_by_available(&mut items);
        Ok(items)
    }

    async fn out_of_stock_items(&self) -> Result<Vec<InventoryItem>> {
        let state = self.state.read().await;
        let mut items: Vec<_> = state
            .items
            .values()
            .filter(|i| i.status == StockStatus::OutOfStock)
            .cloned()
            .collect();
        sort_by_available(&mut items);
        Ok(items)
    }

    async fn reserve(&self, reservation: Reservation) -> Result<(InventoryItem, Reservation)> {
        let mut state = self.state.write().await;
        let item = state
            .items
            .get_mut(&reservation.product_id)
            .ok_or_else(|| InventoryError::ProductNotFound(reservation.product_id.clone()))?;

        item.reserve(reservation.quantity, reservation.created_at)?;
        let item = item.clone();
        state.reservations.insert(reservation.id, reservation.clone());
        Ok((item, reservation))
    }

    async fn settle_reservation(
        &self,
        reservation_id: ReservationId,
        status: ReservationStatus,
        now: DateTime<Utc>,
    ) -> Result<(InventoryItem, Reservation)> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let reservation = state
            .reservations
            .get_mut(&reservation_id)
            .ok_or(InventoryError::ReservationNotFound(reservation_id))?;
        if reservation.status.is_terminal() {
            return Err(InventoryError::ReleaseAlreadyTerminal {
                reservation_id,
                status: reservation.status,
            });
        }

        let item = state
            .items
            .get_mut(&reservation.product_id)
            .ok_or_else(|| InventoryError::ProductNotFound(reservation.product_id.clone()))?;

        // Counters first: if they refuse, the reservation stays pending.
        match status {
            ReservationStatus::Fulfilled => item.fulfill(reservation.quantity, now)?,
            ReservationStatus::Cancelled | ReservationStatus::Expired => {
                item.release(reservation.quantity, now)?
            }
            ReservationStatus::Pending => {
                return Err(InventoryError::InvalidData(
                    "cannot settle a reservation back to pending".to_string(),
                ));
            }
        }

        reservation.status = status;
        reservation.updated_at = now;
        Ok((item.clone(), reservation.clone()))
    }

    async fn get_reservation(&self, reservation_id: ReservationId) -> Result<Option<Reservation>> {
        Ok(self
            .state
            .read()
            .await
            .reservations
            .get(&reservation_id)
            .cloned())
    }

    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        let state = self.state.read().await;
        let mut reservations: Vec<_> = state
            .reservations
            .values()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect();
        reservations.sort_by_key(|r| r.created_at);
        Ok(reservations)
    }

    async fn expired_reservations(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Reservation>> {
        let state = self.state.read().await;
        let mut expired: Vec<_> = state
            .reservations
            .values()
            .filter(|r| r.is_expired_at(now))
            .cloned()
            .collect();
        expired.sort_by_key(|r| r.expires_at);
        expired.truncate(limit.max(0) as usize);
        Ok(expired)
    }

    async fn adjust(&self, adjustment: InventoryAdjustment) -> Result<InventoryItem> {
        let mut state = self.state.write().await;
        let item = state
            .items
            .get_mut(&adjustment.product_id)
            .ok_or_else(|| InventoryError::ProductNotFound(adjustment.product_id.clone()))?;

        item.apply_adjustment(adjustment.quantity, adjustment.created_at);
        let item = item.clone();
        state.adjustments.push(adjustment);
        Ok(item)
    }

    async fn adjustments_for_product(
        &self,
        product_id: &ProductId,
        limit: i64,
    ) -> Result<Vec<InventoryAdjustment>> {
        let state = self.state.read().await;
        Ok(state
            .adjustments
            .iter()
            .rev()
            .filter(|a| &a.product_id == product_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
