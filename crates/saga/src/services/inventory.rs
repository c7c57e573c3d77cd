//! The inventory operations the saga depends on.

use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, ProductId, ReservationId, UserId};
use inventory::{
    AdjustmentRequest, InventoryEngine, InventoryItem, InventoryStore, Reservation, Result,
};

/// Inventory operations used by the order saga.
///
/// [`InventoryEngine`] implements this directly; tests wrap it to inject
/// failures and latency.
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Looks up current stock for a product.
    async fn get_by_product_id(&self, product_id: &ProductId) -> Result<InventoryItem>;

    /// Places a hold on stock for an order.
    async fn reserve(
        &self,
        product_id: &ProductId,
        quantity: u32,
        order_id: OrderId,
        customer_id: UserId,
    ) -> Result<Reservation>;

    /// Releases a pending hold.
    async fn release(&self, reservation_id: ReservationId) -> Result<Reservation>;

    /// Turns a pending hold into a stock deduction.
    async fn commit(&self, reservation_id: ReservationId) -> Result<Reservation>;

    /// Applies a manual stock change.
    async fn adjust(&self, request: AdjustmentRequest) -> Result<InventoryItem>;

    /// Lists every reservation made for an order.
    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>>;
}

#[async_trait]
impl<S: InventoryStore> InventoryService for InventoryEngine<S> {
    async fn get_by_product_id(&self, product_id: &ProductId) -> Result<InventoryItem> {
        InventoryEngine::get_by_product_id(self, product_id).await
    }

    async fn reserve(
        &self,
        product_id: &ProductId,
        quantity: u32,
        order_id: OrderId,
        customer_id: UserId,
    ) -> Result<Reservation> {
        InventoryEngine::reserve(self, product_id, quantity, order_id, customer_id).await
    }

    async fn release(&self, reservation_id: ReservationId) -> Result<Reservation> {
        self.release_reservation(reservation_id).await
    }

    async fn commit(&self, reservation_id: ReservationId) -> Result<Reservation> {
        self.commit_reservation(reservation_id).await
    }

    async fn adjust(&self, request: AdjustmentRequest) -> Result<InventoryItem> {
        InventoryEngine::adjust(self, request).await
    }

    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        InventoryEngine::reservations_for_order(self, order_id).await
    }
}

#[async_trait]
impl<T: InventoryService + ?Sized> InventoryService for Arc<T> {
    async fn get_by_product_id(&self, product_id: &ProductId) -> Result<InventoryItem> {
        (**self).get_by_product_id(product_id).await
    }

    async fn reserve(
        &self,
        product_id: &ProductId,
        quantity: u32,
        order_id: OrderId,
        customer_id: UserId,
    ) -> Result<Reservation> {
        (**self)
            .reserve(product_id, quantity, order_id, customer_id)
            .await
    }

    async fn release(&self, reservation_id: ReservationId) -> Result<Reservation> {
        (**self).release(reservation_id).await
    }

    async fn commit(&self, reservation_id: ReservationId) -> Result<Reservation> {
        (**self).commit(reservation_id).await
    }

    async fn adjust(&self, request: AdjustmentRequest) -> Result<InventoryItem> {
        (**self).adjust(request).await
    }

    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        (**self).reservations_for_order(order_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::SystemClock;
    use events::InMemoryEventBus;
    use inventory::{EngineConfig, InMemoryInventoryStore, NewInventoryItem, ReservationStatus};

    async fn engine() -> Arc<InventoryEngine<InMemoryInventoryStore>> {
        let engine = InventoryEngine::new(
            InMemoryInventoryStore::new(),
            Arc::new(InMemoryEventBus::new()),
            Arc::new(SystemClock),
            EngineConfig::default(),
        );
        engine
            .create_item(NewInventoryItem {
                product_id: ProductId::new("SKU-001"),
                sku: "SKU-001".to_string(),
                quantity: 10,
                reorder_level: 2,
                reorder_quantity: 20,
                location: String::new(),
            })
            .await
            .unwrap();
        Arc::new(engine)
    }

    #[tokio::test]
    async fn test_engine_through_trait_object() {
        let service: Arc<dyn InventoryService> = engine().await;
        let product = ProductId::new("SKU-001");
        let order_id = OrderId::new();

        let held = service
            .reserve(&product, 4, order_id, UserId::new())
            .await
            .unwrap();
        assert_eq!(
            service
                .get_by_product_id(&product)
                .await
                .unwrap()
                .available_quantity,
            6
        );

        let released = service.release(held.id).await.unwrap();
        assert_eq!(released.status, ReservationStatus::Cancelled);

        let all = service.reservations_for_order(order_id).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(
            service
                .get_by_product_id(&product)
                .await
                .unwrap()
                .available_quantity,
            10
        );
    }

    #[tokio::test]
    async fn test_commit_and_restock() {
        let service = engine().await;
        let product = ProductId::new("SKU-001");

        let held = InventoryService::reserve(&service, &product, 3, OrderId::new(), UserId::new())
            .await
            .unwrap();
        service.commit(held.id).await.unwrap();
        let item = InventoryService::get_by_product_id(&service, &product)
            .await
            .unwrap();
        assert_eq!(item.quantity, 7);
        assert_eq!(item.reserved_quantity, 0);

        let item = InventoryService::adjust(
            &service,
            AdjustmentRequest::new(product.clone(), 3, "order_cancelled", "saga"),
        )
        .await
        .unwrap();
        assert_eq!(item.quantity, 10);
    }
}
