use std::sync::Arc;

use chrono::Utc;
use common::{ManualClock, OrderId, ProductId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use events::InMemoryEventBus;
use inventory::{EngineConfig, InMemoryInventoryStore, InventoryEngine, NewInventoryItem};

fn seeded_engine(
    rt: &tokio::runtime::Runtime,
    quantity: i64,
) -> InventoryEngine<InMemoryInventoryStore> {
    let engine = InventoryEngine::new(
        InMemoryInventoryStore::new(),
        Arc::new(InMemoryEventBus::new()),
        Arc::new(ManualClock::new(Utc::now())),
        EngineConfig::default(),
    );
    rt.block_on(async {
        engine
            .create_item(NewInventoryItem {
                product_id: ProductId::new("bench"),
                sku: "BENCH-1".to_string(),
                quantity,
                reorder_level: 0,
                reorder_quantity: 0,
                location: String::new(),
            })
            .await
            .unwrap();
    });
    engine
}

fn bench_reserve(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = seeded_engine(&rt, i64::MAX / 2);
    let product = ProductId::new("bench");

    c.bench_function("inventory/reserve_single_unit", |b| {
        b.iter(|| {
            rt.block_on(async {
                engine
                    .reserve(&product, 1, OrderId::new(), UserId::new())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_reserve_and_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = seeded_engine(&rt, 1_000);
    let product = ProductId::new("bench");

    c.bench_function("inventory/reserve_then_release", |b| {
        b.iter(|| {
            rt.block_on(async {
                let reservation = engine
                    .reserve(&product, 1, OrderId::new(), UserId::new())
                    .await
                    .unwrap();
                engine.release_reservation(reservation.id).await.unwrap();
            });
        });
    });
}

fn bench_cached_lookup(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = seeded_engine(&rt, 10);
    let product = ProductId::new("bench");

    c.bench_function("inventory/get_by_product_id_cached", |b| {
        b.iter(|| {
            rt.block_on(async {
                engine.get_by_product_id(&product).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_reserve,
    bench_reserve_and_release,
    bench_cached_lookup
);
criterion_main!(benches);
