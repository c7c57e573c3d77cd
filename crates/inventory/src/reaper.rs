use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::{InventoryEngine, store::InventoryStore};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Background task that returns stock held by lapsed reservations.
///
/// Runs one sweep per interval until the shutdown channel flips to `true`
/// (or its sender is dropped).
pub struct ExpiryReaper<S: InventoryStore> {
    engine: Arc<InventoryEngine<S>>,
    interval: Duration,
}

impl<S: InventoryStore + 'static> ExpiryReaper<S> {
    /// Creates a reaper using the engine's configured interval.
    pub fn new(engine: Arc<InventoryEngine<S>>) -> Self {
        let interval = engine.config().reaper_interval.max(MIN_INTERVAL);
        Self { engine, interval }
    }

    /// Overrides the sweep interval. A zero interval is raised to one
    /// millisecond.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_INTERVAL);
        self
    }

    /// Spawns the reaper onto the current runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Runs sweeps until shutdown is signalled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.interval.as_secs(), "reservation reaper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.engine.expire_reservations().await {
                        tracing::error!(error = %e, "reservation sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("reservation reaper stopped");
    }
}
