use std::time::Duration;

/// Tunables for the inventory engine and the expiry reaper.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lifetime of a pending reservation.
    pub reservation_ttl: chrono::Duration,
    /// How long a cached item may be served before it is re-read.
    pub cache_ttl: chrono::Duration,
    /// Delay between reaper sweeps.
    pub reaper_interval: Duration,
    /// Upper bound on reservations expired per store query.
    pub reaper_batch_size: i64,
}

impl EngineConfig {
    /// Sets the reservation lifetime.
    pub fn with_reservation_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.reservation_ttl = ttl;
        self
    }

    /// Sets the cache lifetime.
    pub fn with_cache_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the reaper interval.
    pub fn with_reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reservation_ttl: chrono::Duration::minutes(15),
            cache_ttl: chrono::Duration::minutes(5),
            reaper_interval: Duration::from_secs(60),
            reaper_batch_size: 500,
        }
    }
}
