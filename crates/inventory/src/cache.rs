use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::{ProductId, SharedClock};
use tokio::sync::RwLock;

use crate::InventoryItem;

struct Entry {
    item: InventoryItem,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct Slots {
    entries: HashMap<ProductId, Entry>,
    /// Bumped by every invalidation.
    generations: HashMap<ProductId, u64>,
}

/// Read-through cache of inventory items keyed by product.
///
/// Entries live for a fixed TTL measured on the injected clock. Writers
/// invalidate the product's entry before returning, so a read that follows
/// a completed write never sees the old counters.
///
/// A reader takes the product's [`generation`](Self::generation) before it
/// loads from the store and hands it back to [`put`](Self::put). If a write
/// invalidated the product in between, the loaded row is already stale and
/// is not cached.
#[derive(Clone)]
pub struct ItemCache {
    slots: Arc<RwLock<Slots>>,
    ttl: Duration,
    clock: SharedClock,
}

impl ItemCache {
    /// Creates an empty cache.
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            slots: Arc::new(RwLock::new(Slots::default())),
            ttl,
            clock,
        }
    }

    /// Returns the cached item if present and still fresh.
    pub async fn get(&self, product_id: &ProductId) -> Option<InventoryItem> {
        let now = self.clock.now();
        let slots = self.slots.read().await;
        slots
            .entries
            .get(product_id)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.item.clone())
    }

    /// Current invalidation count for a product.
    pub async fn generation(&self, product_id: &ProductId) -> u64 {
        self.slots
            .read()
            .await
            .generations
            .get(product_id)
            .copied()
            .unwrap_or(0)
    }

    /// Stores an item loaded while the product was at `generation`.
    ///
    /// Returns false, caching nothing, if the product was invalidated since.
    pub async fn put(&self, item: InventoryItem, generation: u64) -> bool {
        let expires_at = self.clock.now() + self.ttl;
        let mut slots = self.slots.write().await;
        let current = slots
            .generations
            .get(&item.product_id)
            .copied()
            .unwrap_or(0);
        if current != generation {
            return false;
        }
        slots
            .entries
            .insert(item.product_id.clone(), Entry { item, expires_at });
        true
    }

    /// Drops a product's entry and fences off loads already in flight.
    pub async fn invalidate(&self, product_id: &ProductId) {
        let mut slots = self.slots.write().await;
        slots.entries.remove(product_id);
        *slots.generations.entry(product_id.clone()).or_insert(0) += 1;
    }

    /// Number of entries, fresh or stale.
    pub async fn len(&self) -> usize {
        self.slots.read().await.entries.len()
    }

    /// Returns true if nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.entries.is_empty()
    }
}
