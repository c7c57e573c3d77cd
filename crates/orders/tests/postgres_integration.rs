//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and need Docker. Run with:
//!
//! ```bash
//! cargo test -p orders --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{OrderId, ProductId, UserId};
use orders::{
    Address, Currency, Money, NewOrder, Order, OrderHistory, OrderItem, OrderStatus, OrderStore,
    OrderStoreError, PaymentMethod, PaymentStatus, PostgresOrderStore, StatusChange, Totals,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresOrderStore::new(pool.clone())
                .run_migrations()
                .await
                .unwrap();
            pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresOrderStore {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_history, order_items, orders")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOrderStore::new(pool)
}

fn address() -> Address {
    Address {
        name: "Grace Hopper".to_string(),
        line1: "1 Compiler Ct".to_string(),
        line2: Some("Apt 2".to_string()),
        city: "Arlington".to_string(),
        state: "VA".to_string(),
        postal_code: "22201".to_string(),
        country: "US".to_string(),
    }
}

fn sample_order(user_id: UserId) -> (Order, Vec<OrderItem>) {
    let order = Order::new(
        NewOrder {
            user_id,
            payment_method: PaymentMethod::Paypal,
            currency: Currency::Eur,
            totals: Totals::compute(
                Money::from_cents(3_000),
                Money::from_cents(240),
                Money::from_cents(500),
                Money::from_cents(100),
            )
            .unwrap(),
            shipping_address: address(),
            billing_address: address(),
        },
        Utc::now(),
    )
    .unwrap();
    let items = vec![
        OrderItem::new(
            order.id,
            ProductId::new("p1"),
            "SKU-1",
            "Widget",
            Money::from_cents(1_000),
            2,
        )
        .unwrap(),
        OrderItem::new(
            order.id,
            ProductId::new("p2"),
            "SKU-2",
            "Gadget",
            Money::from_cents(1_000),
            1,
        )
        .unwrap(),
    ];
    (order, items)
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn insert_and_load_order() {
    let store = get_test_store().await;
    let (order, items) = sample_order(UserId::new());
    store.insert_order(&order, &items).await.unwrap();

    let loaded = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.order_number, order.order_number);
    assert_eq!(loaded.total_amount, Money::from_cents(3_640));
    assert_eq!(loaded.currency, Currency::Eur);
    assert_eq!(loaded.shipping_address, address());

    let loaded_items = store.get_items(order.id).await.unwrap();
    assert_eq!(loaded_items.len(), 2);
    assert_eq!(loaded_items[0].sku, "SKU-1");
    assert_eq!(loaded_items[0].subtotal, Money::from_cents(2_000));

    let history = store.get_history(order.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_status, None);
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn insert_rejects_inconsistent_totals() {
    let store = get_test_store().await;
    let (mut order, items) = sample_order(UserId::new());
    order.subtotal = Money::from_cents(9_999);
    let result = store.insert_order(&order, &items).await;
    assert!(matches!(result, Err(OrderStoreError::AmountMismatch { .. })));
    assert!(store.get_order(order.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn transition_compare_and_set() {
    let store = get_test_store().await;
    let (order, items) = sample_order(UserId::new());
    store.insert_order(&order, &items).await.unwrap();

    store
        .transition(
            order.id,
            OrderStatus::Pending,
            StatusChange::new(OrderStatus::PaymentPending, "saga", Utc::now()),
        )
        .await
        .unwrap();
    let confirmed = store
        .transition(
            order.id,
            OrderStatus::PaymentPending,
            StatusChange::new(OrderStatus::Confirmed, "saga", Utc::now())
                .with_payment_status(PaymentStatus::Captured)
                .with_transaction_id("txn_42"),
        )
        .await
        .unwrap();
    assert_eq!(confirmed.transaction_id.as_deref(), Some("txn_42"));
    assert!(confirmed.paid_at.is_some());

    let stale = store
        .transition(
            order.id,
            OrderStatus::Pending,
            StatusChange::new(OrderStatus::Cancelled, "customer", Utc::now()),
        )
        .await;
    assert!(matches!(
        stale,
        Err(OrderStoreError::StatusConflict {
            actual: OrderStatus::Confirmed,
            ..
        })
    ));

    let history = store.get_history(order.id).await.unwrap();
    let statuses: Vec<_> = history.iter().map(|h| h.to_status).collect();
    assert_eq!(
        statuses,
        vec![
            OrderStatus::Pending,
            OrderStatus::PaymentPending,
            OrderStatus::Confirmed
        ]
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn payment_status_and_notes() {
    let store = get_test_store().await;
    let (order, items) = sample_order(UserId::new());
    store.insert_order(&order, &items).await.unwrap();

    let updated = store
        .set_payment_status(order.id, PaymentStatus::Failed, "declined", "saga", Utc::now())
        .await
        .unwrap();
    assert_eq!(updated.payment_status, PaymentStatus::Failed);

    store
        .append_history(OrderHistory::note(
            order.id,
            OrderStatus::Pending,
            "support called",
            "agent",
            Utc::now(),
        ))
        .await
        .unwrap();
    assert_eq!(store.get_history(order.id).await.unwrap().len(), 3);

    let missing = store
        .append_history(OrderHistory::note(
            OrderId::new(),
            OrderStatus::Pending,
            "ghost",
            "agent",
            Utc::now(),
        ))
        .await;
    assert!(matches!(missing, Err(OrderStoreError::OrderNotFound(_))));
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn list_orders_for_user() {
    let store = get_test_store().await;
    let user = UserId::new();
    for _ in 0..3 {
        let (order, items) = sample_order(user);
        store.insert_order(&order, &items).await.unwrap();
    }
    let (other, items) = sample_order(UserId::new());
    store.insert_order(&other, &items).await.unwrap();

    assert_eq!(store.list_by_user(user, 10, 0).await.unwrap().len(), 3);
    assert_eq!(store.list_by_user(user, 2, 0).await.unwrap().len(), 2);
    assert_eq!(store.list_by_user(user, 10, 2).await.unwrap().len(), 1);
}
