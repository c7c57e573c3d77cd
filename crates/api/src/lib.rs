//! HTTP API server for the storefront fulfillment core.
//!
//! Exposes checkout, the order lifecycle and inventory operations as REST
//! endpoints, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use common::{SharedClock, SystemClock};
use events::{EventPublisher, InMemoryEventBus};
use inventory::{InMemoryInventoryStore, InventoryEngine, InventoryStore};
use metrics_exporter_prometheus::PrometheusHandle;
use orders::{InMemoryOrderStore, OrderStore};
use saga::{CartStore, InMemoryCartStore, InMemoryPaymentGateway, OrderSaga, PaymentGateway};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Shared application state accessible from all handlers.
///
/// The saga and the inventory routes share one engine, so stock seen over
/// HTTP is the stock the saga reserves against.
pub struct AppState<O: OrderStore, S: InventoryStore> {
    pub saga: OrderSaga<O, Arc<InventoryEngine<S>>>,
    pub inventory: Arc<InventoryEngine<S>>,
}

/// External collaborators of the saga.
pub struct Backends {
    pub payments: Arc<dyn PaymentGateway>,
    pub carts: Arc<dyn CartStore>,
    pub publisher: Arc<dyn EventPublisher>,
    pub clock: SharedClock,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<O: OrderStore + 'static, S: InventoryStore + 'static>(
    state: Arc<AppState<O, S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{inventory, orders};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(orders::create::<O, S>))
        .route("/orders/{id}", get(orders::get::<O, S>))
        .route("/orders/{id}/payment", post(orders::pay::<O, S>))
        .route("/orders/{id}/cancel", post(orders::cancel::<O, S>))
        .route("/orders/{id}/process", post(orders::process::<O, S>))
        .route("/orders/{id}/ship", post(orders::ship::<O, S>))
        .route("/orders/{id}/deliver", post(orders::deliver::<O, S>))
        .route("/orders/{id}/refund", post(orders::refund::<O, S>))
        .route("/users/{id}/orders", get(orders::list_for_user::<O, S>))
        .route(
            "/inventory",
            post(inventory::create::<O, S>).get(inventory::list::<O, S>),
        )
        .route("/inventory/low-stock", get(inventory::low_stock::<O, S>))
        .route(
            "/inventory/out-of-stock",
            get(inventory::out_of_stock::<O, S>),
        )
        .route(
            "/inventory/items/{id}",
            get(inventory::get_item::<O, S>).patch(inventory::update_item::<O, S>),
        )
        .route("/inventory/sku/{sku}", get(inventory::get_by_sku::<O, S>))
        .route(
            "/inventory/products/{product_id}",
            get(inventory::get_by_product::<O, S>),
        )
        .route(
            "/inventory/products/{product_id}/reservations",
            post(inventory::reserve::<O, S>),
        )
        .route(
            "/inventory/products/{product_id}/adjustments",
            post(inventory::adjust::<O, S>).get(inventory::adjustments::<O, S>),
        )
        .route(
            "/inventory/reservations/{id}",
            delete(inventory::release::<O, S>).get(inventory::get_reservation::<O, S>),
        )
        .route(
            "/inventory/reservations/{id}/commit",
            post(inventory::commit::<O, S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the inventory engine and the saga over the given stores.
pub fn build_state<O: OrderStore, S: InventoryStore>(
    order_store: O,
    inventory_store: S,
    backends: Backends,
    config: &Config,
) -> Arc<AppState<O, S>> {
    let inventory = Arc::new(InventoryEngine::new(
        inventory_store,
        backends.publisher.clone(),
        backends.clock.clone(),
        config.engine_config(),
    ));
    let saga = OrderSaga::new(
        order_store,
        inventory.clone(),
        backends.payments,
        backends.carts,
        backends.publisher,
    )
    .with_clock(backends.clock)
    .with_config(config.saga_config());

    Arc::new(AppState { saga, inventory })
}

/// In-memory state for local runs and tests.
///
/// Returns the payment gateway and event bus alongside the state so callers
/// can script gateway failures and inspect published events.
pub fn create_default_state() -> (
    Arc<AppState<InMemoryOrderStore, InMemoryInventoryStore>>,
    InMemoryPaymentGateway,
    InMemoryEventBus,
) {
    let payments = InMemoryPaymentGateway::new();
    let bus = InMemoryEventBus::new();
    let backends = Backends {
        payments: Arc::new(payments.clone()),
        carts: Arc::new(InMemoryCartStore::new()),
        publisher: Arc::new(bus.clone()),
        clock: Arc::new(SystemClock),
    };
    let state = build_state(
        InMemoryOrderStore::new(),
        InMemoryInventoryStore::new(),
        backends,
        &Config::default(),
    );
    (state, payments, bus)
}
