//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::{AppState, Backends};
use common::SystemClock;
use events::LogPublisher;
use inventory::{ExpiryReaper, InMemoryInventoryStore, InventoryStore, PostgresInventoryStore};
use metrics_exporter_prometheus::PrometheusHandle;
use orders::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
use saga::{InMemoryCartStore, InMemoryPaymentGateway};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn backends() -> Backends {
    // No payment provider or cart service is wired in yet; the in-process
    // doubles keep the server runnable end to end.
    Backends {
        payments: Arc::new(InMemoryPaymentGateway::new()),
        carts: Arc::new(InMemoryCartStore::new()),
        publisher: Arc::new(LogPublisher),
        clock: Arc::new(SystemClock),
    }
}

/// Runs the server and the reservation reaper until a shutdown signal.
async fn serve<O: OrderStore + 'static, S: InventoryStore + 'static>(
    state: Arc<AppState<O, S>>,
    metrics_handle: PrometheusHandle,
    config: &Config,
) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = ExpiryReaper::new(state.inventory.clone()).spawn(shutdown_rx);

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    if let Err(e) = reaper.await {
        tracing::error!(error = %e, "reservation reaper panicked");
    }
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick stores, build state and serve
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");

            let inventory_store = PostgresInventoryStore::new(pool.clone());
            inventory_store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            let order_store = PostgresOrderStore::new(pool);
            tracing::info!("using PostgreSQL stores");

            let state = api::build_state(order_store, inventory_store, backends(), &config);
            serve(state, metrics_handle, &config).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores");
            let state = api::build_state(
                InMemoryOrderStore::new(),
                InMemoryInventoryStore::new(),
                backends(),
                &config,
            );
            serve(state, metrics_handle, &config).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
