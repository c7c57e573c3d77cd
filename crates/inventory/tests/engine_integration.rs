//! Inventory engine tests against the in-memory store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{Clock, InventoryItemId, ManualClock, OrderId, ProductId, ReservationId, UserId};
use events::{InMemoryEventBus, topics};
use futures_util::future::join_all;
use inventory::{
    AdjustmentRequest, EngineConfig, ExpiryReaper, InMemoryInventoryStore, InventoryAdjustment,
    InventoryEngine, InventoryError, InventoryItem, InventoryStore, ItemUpdate, NewInventoryItem,
    Reservation, ReservationStatus, StockStatus,
};
use tokio::sync::{oneshot, watch};

struct Harness {
    engine: Arc<InventoryEngine<InMemoryInventoryStore>>,
    bus: InMemoryEventBus,
    clock: ManualClock,
}

fn harness() -> Harness {
    let bus = InMemoryEventBus::new();
    let clock = ManualClock::new(Utc::now());
    let engine = InventoryEngine::new(
        InMemoryInventoryStore::new(),
        Arc::new(bus.clone()),
        Arc::new(clock.clone()),
        EngineConfig::default(),
    );
    Harness {
        engine: Arc::new(engine),
        bus,
        clock,
    }
}

fn new_item(product: &str, sku: &str, quantity: i64, reorder_level: i64) -> NewInventoryItem {
    NewInventoryItem {
        product_id: ProductId::new(product),
        sku: sku.to_string(),
        quantity,
        reorder_level,
        reorder_quantity: 25,
        location: "WH-EAST".to_string(),
    }
}

#[tokio::test]
async fn laptop_reservation_moves_item_to_low_stock() {
    let h = harness();
    let product = ProductId::new("prod-laptop");
    h.engine
        .create_item(new_item("prod-laptop", "LAPTOP-001", 50, 10))
        .await
        .unwrap();

    let reservation = h
        .engine
        .reserve(&product, 45, OrderId::new(), UserId::new())
        .await
        .unwrap();
    assert_eq!(reservation.status, ReservationStatus::Pending);
    assert_eq!(reservation.quantity, 45);
    assert_eq!(reservation.expires_at, h.clock.now() + Duration::minutes(15));

    let item = h.engine.get_by_product_id(&product).await.unwrap();
    assert_eq!(item.quantity, 50);
    assert_eq!(item.reserved_quantity, 45);
    assert_eq!(item.available_quantity, 5);
    assert_eq!(item.status, StockStatus::LowStock);

    let types = h.bus.event_types().await;
    assert_eq!(
        types,
        vec![
            topics::INVENTORY_CREATED,
            topics::INVENTORY_RESERVED,
            topics::INVENTORY_LOW_STOCK
        ]
    );

    let low = h.engine.get_low_stock_items().await.unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].sku, "LAPTOP-001");
}

#[tokio::test]
async fn concurrent_reservations_never_oversell() {
    let h = harness();
    let product = ProductId::new("prod-widget");
    h.engine
        .create_item(new_item("prod-widget", "WIDGET-1", 5, 1))
        .await
        .unwrap();

    let attempts = (0..10).map(|_| {
        let engine = h.engine.clone();
        let product = product.clone();
        tokio::spawn(async move {
            engine
                .reserve(&product, 1, OrderId::new(), UserId::new())
                .await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(InventoryError::InsufficientStock { .. })))
        .count();
    assert_eq!(succeeded, 5);
    assert_eq!(rejected, 5);

    let item = h.engine.get_by_product_id(&product).await.unwrap();
    assert_eq!(item.reserved_quantity, 5);
    assert_eq!(item.available_quantity, 0);
    assert_eq!(item.status, StockStatus::OutOfStock);
}

#[tokio::test]
async fn insufficient_stock_changes_nothing() {
    let h = harness();
    let product = ProductId::new("p1");
    h.engine
        .create_item(new_item("p1", "SKU-1", 3, 0))
        .await
        .unwrap();

    let err = h
        .engine
        .reserve(&product, 4, OrderId::new(), UserId::new())
        .await
        .unwrap_err();
    match err {
        InventoryError::InsufficientStock {
            requested,
            available,
            ..
        } => {
            assert_eq!(requested, 4);
            assert_eq!(available, 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let item = h.engine.get_by_product_id(&product).await.unwrap();
    assert_eq!(item.reserved_quantity, 0);
    assert_eq!(h.engine.store().reservation_count().await, 0);
}

#[tokio::test]
async fn reserve_validates_quantity_and_product() {
    let h = harness();
    h.engine
        .create_item(new_item("p1", "SKU-1", 3, 0))
        .await
        .unwrap();

    let zero = h
        .engine
        .reserve(&ProductId::new("p1"), 0, OrderId::new(), UserId::new())
        .await;
    assert!(matches!(zero, Err(InventoryError::InvalidQuantity(0))));

    let missing = h
        .engine
        .reserve(&ProductId::new("nope"), 1, OrderId::new(), UserId::new())
        .await;
    assert!(matches!(missing, Err(InventoryError::ProductNotFound(_))));
}

#[tokio::test]
async fn duplicate_product_is_rejected() {
    let h = harness();
    h.engine
        .create_item(new_item("p1", "SKU-1", 3, 0))
        .await
        .unwrap();
    let again = h.engine.create_item(new_item("p1", "SKU-2", 9, 0)).await;
    assert!(matches!(again, Err(InventoryError::DuplicateProduct(_))));
}

#[tokio::test]
async fn releasing_twice_restores_stock_once() {
    let h = harness();
    let product = ProductId::new("p1");
    h.engine
        .create_item(new_item("p1", "SKU-1", 10, 2))
        .await
        .unwrap();
    let reservation = h
        .engine
        .reserve(&product, 4, OrderId::new(), UserId::new())
        .await
        .unwrap();

    let released = h.engine.release_reservation(reservation.id).await.unwrap();
    assert_eq!(released.status, ReservationStatus::Cancelled);

    let again = h.engine.release_reservation(reservation.id).await;
    assert!(matches!(
        again,
        Err(InventoryError::ReleaseAlreadyTerminal {
            status: ReservationStatus::Cancelled,
            ..
        })
    ));

    let item = h.engine.get_by_product_id(&product).await.unwrap();
    assert_eq!(item.reserved_quantity, 0);
    assert_eq!(item.available_quantity, 10);
    assert_eq!(
        h.bus
            .events_of_type(topics::INVENTORY_RESERVATION_RELEASED)
            .await
            .len(),
        1
    );
}

#[tokio::test]
async fn commit_deducts_on_hand_stock() {
    let h = harness();
    let product = ProductId::new("p1");
    let order_id = OrderId::new();
    h.engine
        .create_item(new_item("p1", "SKU-1", 10, 2))
        .await
        .unwrap();
    let reservation = h
        .engine
        .reserve(&product, 3, order_id, UserId::new())
        .await
        .unwrap();

    let committed = h.engine.commit_reservation(reservation.id).await.unwrap();
    assert_eq!(committed.status, ReservationStatus::Fulfilled);

    let item = h.engine.get_by_product_id(&product).await.unwrap();
    assert_eq!(item.quantity, 7);
    assert_eq!(item.reserved_quantity, 0);
    assert_eq!(item.available_quantity, 7);

    // A fulfilled hold can no longer be released.
    let release = h.engine.release_reservation(reservation.id).await;
    assert!(matches!(
        release,
        Err(InventoryError::ReleaseAlreadyTerminal {
            status: ReservationStatus::Fulfilled,
            ..
        })
    ));

    let for_order = h.engine.reservations_for_order(order_id).await.unwrap();
    assert_eq!(for_order.len(), 1);
    assert_eq!(for_order[0].status, ReservationStatus::Fulfilled);
}

#[tokio::test]
async fn expired_reservations_are_reaped() {
    let h = harness();
    let product = ProductId::new("p1");
    h.engine
        .create_item(new_item("p1", "SKU-1", 10, 2))
        .await
        .unwrap();

    let stale = h
        .engine
        .reserve(&product, 4, OrderId::new(), UserId::new())
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(10));
    let fresh = h
        .engine
        .reserve(&product, 2, OrderId::new(), UserId::new())
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(6));
    let report = h.engine.expire_reservations().await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(report.failed, 0);

    let stale = h.engine.get_reservation(stale.id).await.unwrap();
    assert_eq!(stale.status, ReservationStatus::Expired);
    let fresh = h.engine.get_reservation(fresh.id).await.unwrap();
    assert_eq!(fresh.status, ReservationStatus::Pending);

    let item = h.engine.get_by_product_id(&product).await.unwrap();
    assert_eq!(item.reserved_quantity, 2);
    assert_eq!(item.available_quantity, 8);

    // Nothing left to do on a second sweep.
    let report = h.engine.expire_reservations().await.unwrap();
    assert_eq!(report.scanned, 0);
}

#[tokio::test]
async fn released_reservation_is_not_expired_later() {
    let h = harness();
    let product = ProductId::new("p1");
    h.engine
        .create_item(new_item("p1", "SKU-1", 5, 0))
        .await
        .unwrap();
    let reservation = h
        .engine
        .reserve(&product, 5, OrderId::new(), UserId::new())
        .await
        .unwrap();
    h.engine.release_reservation(reservation.id).await.unwrap();

    h.clock.advance(Duration::minutes(30));
    let report = h.engine.expire_reservations().await.unwrap();
    assert_eq!(report.scanned, 0);

    let item = h.engine.get_by_product_id(&product).await.unwrap();
    assert_eq!(item.reserved_quantity, 0);
    assert_eq!(item.quantity, 5);
}

#[tokio::test]
async fn reaper_task_runs_and_stops_on_shutdown() {
    let h = harness();
    let product = ProductId::new("p1");
    h.engine
        .create_item(new_item("p1", "SKU-1", 5, 0))
        .await
        .unwrap();
    let reservation = h
        .engine
        .reserve(&product, 3, OrderId::new(), UserId::new())
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(20));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = ExpiryReaper::new(h.engine.clone())
        .with_interval(std::time::Duration::from_millis(10))
        .spawn(shutdown_rx);

    let mut expired = false;
    for _ in 0..100 {
        let current = h.engine.get_reservation(reservation.id).await.unwrap();
        if current.status == ReservationStatus::Expired {
            expired = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(expired, "reaper did not expire the reservation");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(1), handle)
        .await
        .expect("reaper did not stop")
        .unwrap();
}

#[tokio::test]
async fn reaper_with_zero_interval_keeps_running() {
    let h = harness();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = ExpiryReaper::new(h.engine.clone())
        .with_interval(std::time::Duration::ZERO)
        .spawn(shutdown_rx);

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(!handle.is_finished(), "reaper task died");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(1), handle)
        .await
        .expect("reaper did not stop")
        .unwrap();
}

#[tokio::test]
async fn adjustments_clamp_and_are_audited() {
    let h = harness();
    let product = ProductId::new("p1");
    h.engine
        .create_item(new_item("p1", "SKU-1", 10, 3))
        .await
        .unwrap();
    h.engine
        .reserve(&product, 4, OrderId::new(), UserId::new())
        .await
        .unwrap();

    let item = h
        .engine
        .adjust(AdjustmentRequest::new("p1", -20, "damaged", "ops@example.com").with_notes("flood"))
        .await
        .unwrap();
    assert_eq!(item.quantity, 4);
    assert_eq!(item.available_quantity, 0);
    assert_eq!(item.status, StockStatus::OutOfStock);

    let item = h
        .engine
        .adjust(AdjustmentRequest::new("p1", 16, "restock", "ops@example.com"))
        .await
        .unwrap();
    assert_eq!(item.quantity, 20);
    assert_eq!(item.available_quantity, 16);
    assert_eq!(item.status, StockStatus::InStock);

    let log = h.engine.adjustments_for_product(&product, 10).await.unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].quantity, 16);
    assert_eq!(log[1].quantity, -20);
    assert_eq!(log[1].notes.as_deref(), Some("flood"));

    assert_eq!(
        h.bus.events_of_type(topics::INVENTORY_ADJUSTED).await.len(),
        2
    );
}

#[tokio::test]
async fn adjust_unknown_product_fails() {
    let h = harness();
    let result = h
        .engine
        .adjust(AdjustmentRequest::new("missing", 5, "restock", "ops"))
        .await;
    assert!(matches!(result, Err(InventoryError::ProductNotFound(_))));
}

#[tokio::test]
async fn reads_after_writes_see_fresh_counters() {
    let h = harness();
    let product = ProductId::new("p1");
    h.engine
        .create_item(new_item("p1", "SKU-1", 10, 0))
        .await
        .unwrap();

    // Warm the cache, then mutate through every write path.
    assert_eq!(
        h.engine.get_by_product_id(&product).await.unwrap().available_quantity,
        10
    );

    let reservation = h
        .engine
        .reserve(&product, 2, OrderId::new(), UserId::new())
        .await
        .unwrap();
    assert_eq!(
        h.engine.get_by_product_id(&product).await.unwrap().available_quantity,
        8
    );

    h.engine
        .adjust(AdjustmentRequest::new("p1", 5, "restock", "ops"))
        .await
        .unwrap();
    assert_eq!(
        h.engine.get_by_product_id(&product).await.unwrap().available_quantity,
        13
    );

    h.engine.release_reservation(reservation.id).await.unwrap();
    assert_eq!(
        h.engine.get_by_product_id(&product).await.unwrap().available_quantity,
        15
    );
}

#[tokio::test]
async fn publish_failures_do_not_fail_operations() {
    let h = harness();
    h.bus.set_fail_on_publish(true);

    let item = h
        .engine
        .create_item(new_item("p1", "SKU-1", 10, 0))
        .await
        .unwrap();
    assert_eq!(item.quantity, 10);

    let reservation = h
        .engine
        .reserve(&ProductId::new("p1"), 1, OrderId::new(), UserId::new())
        .await;
    assert!(reservation.is_ok());
    assert_eq!(h.bus.event_count().await, 0);
}

#[tokio::test]
async fn item_update_rederives_status_and_notifies() {
    let h = harness();
    let created = h
        .engine
        .create_item(new_item("prod-mouse", "MOUSE-001", 20, 5))
        .await
        .unwrap();

    let by_sku = h.engine.get_by_sku("MOUSE-001").await.unwrap();
    assert_eq!(by_sku.id, created.id);
    assert_eq!(h.engine.get_item(created.id).await.unwrap().product_id.as_str(), "prod-mouse");

    // Warm the cache so the update has to invalidate it.
    h.engine
        .get_by_product_id(&ProductId::new("prod-mouse"))
        .await
        .unwrap();

    let updated = h
        .engine
        .update_item(
            created.id,
            ItemUpdate {
                reorder_level: Some(25),
                reorder_quantity: Some(40),
                location: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.status, StockStatus::LowStock);
    assert_eq!(updated.location, "WH-EAST");

    let fresh = h
        .engine
        .get_by_product_id(&ProductId::new("prod-mouse"))
        .await
        .unwrap();
    assert_eq!(fresh.reorder_level, 25);
    assert_eq!(fresh.status, StockStatus::LowStock);

    assert_eq!(h.bus.events_of_type(topics::INVENTORY_UPDATED).await.len(), 1);
    assert_eq!(h.bus.events_of_type(topics::INVENTORY_LOW_STOCK).await.len(), 1);

    assert!(matches!(
        h.engine
            .update_item(
                created.id,
                ItemUpdate {
                    reorder_level: Some(-1),
                    ..Default::default()
                },
            )
            .await,
        Err(InventoryError::InvalidQuantity(-1))
    ));
    assert!(matches!(
        h.engine.get_by_sku("NOPE").await,
        Err(InventoryError::SkuNotFound(_))
    ));
    assert!(matches!(
        h.engine.get_item(InventoryItemId::new()).await,
        Err(InventoryError::ItemNotFound(_))
    ));
}

/// Store whose next `get_item` parks after reading until the test lets it go.
#[derive(Default)]
struct GatedStore {
    inner: InMemoryInventoryStore,
    gate: Mutex<Option<(oneshot::Sender<()>, oneshot::Receiver<()>)>>,
}

#[async_trait]
impl InventoryStore for GatedStore {
    async fn insert_item(&self, item: InventoryItem) -> inventory::Result<InventoryItem> {
        self.inner.insert_item(item).await
    }

    async fn get_item(&self, product_id: &ProductId) -> inventory::Result<Option<InventoryItem>> {
        let item = self.inner.get_item(product_id).await?;
        let gate = self.gate.lock().unwrap().take();
        if let Some((loaded, resume)) = gate {
            let _ = loaded.send(());
            let _ = resume.await;
        }
        Ok(item)
    }

    async fn get_item_by_id(
        &self,
        id: InventoryItemId,
    ) -> inventory::Result<Option<InventoryItem>> {
        self.inner.get_item_by_id(id).await
    }

    async fn get_item_by_sku(&self, sku: &str) -> inventory::Result<Option<InventoryItem>> {
        self.inner.get_item_by_sku(sku).await
    }

    async fn update_item(
        &self,
        id: InventoryItemId,
        update: &ItemUpdate,
        now: DateTime<Utc>,
    ) -> inventory::Result<InventoryItem> {
        self.inner.update_item(id, update, now).await
    }

    async fn list_items(&self, limit: i64, offset: i64) -> inventory::Result<Vec<InventoryItem>> {
        self.inner.list_items(limit, offset).await
    }

    async fn low_stock_items(&self) -> inventory::Result<Vec<InventoryItem>> {
        self.inner.low_stock_items().await
    }

    async fn out_of_stock_items(&self) -> inventory::Result<Vec<InventoryItem>> {
        self.inner.out_of_stock_items().await
    }

    async fn reserve(
        &self,
        reservation: Reservation,
    ) -> inventory::Result<(InventoryItem, Reservation)> {
        self.inner.reserve(reservation).await
    }

    async fn settle_reservation(
        &self,
        reservation_id: ReservationId,
        status: ReservationStatus,
        now: DateTime<Utc>,
    ) -> inventory::Result<(InventoryItem, Reservation)> {
        self.inner
            .settle_reservation(reservation_id, status, now)
            .await
    }

    async fn get_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> inventory::Result<Option<Reservation>> {
        self.inner.get_reservation(reservation_id).await
    }

    async fn reservations_for_order(
        &self,
        order_id: OrderId,
    ) -> inventory::Result<Vec<Reservation>> {
        self.inner.reservations_for_order(order_id).await
    }

    async fn expired_reservations(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> inventory::Result<Vec<Reservation>> {
        self.inner.expired_reservations(now, limit).await
    }

    async fn adjust(&self, adjustment: InventoryAdjustment) -> inventory::Result<InventoryItem> {
        self.inner.adjust(adjustment).await
    }

    async fn adjustments_for_product(
        &self,
        product_id: &ProductId,
        limit: i64,
    ) -> inventory::Result<Vec<InventoryAdjustment>> {
        self.inner.adjustments_for_product(product_id, limit).await
    }
}

#[tokio::test]
async fn read_overtaken_by_reserve_is_not_cached() {
    let clock = ManualClock::new(Utc::now());
    let engine = Arc::new(InventoryEngine::new(
        GatedStore::default(),
        Arc::new(InMemoryEventBus::new()),
        Arc::new(clock),
        EngineConfig::default(),
    ));
    let product = ProductId::new("prod-hub");
    engine
        .create_item(new_item("prod-hub", "HUB-001", 5, 1))
        .await
        .unwrap();

    let (loaded_tx, loaded_rx) = oneshot::channel();
    let (resume_tx, resume_rx) = oneshot::channel();
    *engine.store().gate.lock().unwrap() = Some((loaded_tx, resume_rx));

    let reader = tokio::spawn({
        let engine = engine.clone();
        let product = product.clone();
        async move { engine.get_by_product_id(&product).await }
    });

    // The reader holds the pre-reserve row while the reserve commits.
    loaded_rx.await.unwrap();
    engine
        .reserve(&product, 5, OrderId::new(), UserId::new())
        .await
        .unwrap();
    resume_tx.send(()).unwrap();

    let raced = reader.await.unwrap().unwrap();
    assert_eq!(raced.available_quantity, 5);

    let item = engine.get_by_product_id(&product).await.unwrap();
    assert_eq!(item.available_quantity, 0);
    assert_eq!(item.status, StockStatus::OutOfStock);
}
