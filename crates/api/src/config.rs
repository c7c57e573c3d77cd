//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use inventory::EngineConfig;
use orders::{Currency, Money, Pricing};
use saga::SagaConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on in-memory stores
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `RESERVATION_TTL_MINUTES`: hold lifetime (default: `15`)
/// - `REAPER_INTERVAL_SECS`: expiry sweep period (default: `60`)
/// - `INVENTORY_CACHE_TTL_SECS`: stock cache lifetime (default: `300`)
/// - `INVENTORY_TIMEOUT_MS`: saga inventory call timeout (default: `5000`)
/// - `PAYMENT_TIMEOUT_MS`: saga payment call timeout (default: `15000`)
/// - `TAX_RATE_BPS`: tax rate in basis points (default: `0`)
/// - `SHIPPING_FLAT_CENTS`: flat shipping charge (default: `0`)
/// - `FREE_SHIPPING_THRESHOLD_CENTS`: subtotal that ships free (default: unset)
/// - `CURRENCY`: order currency (default: `USD`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub reservation_ttl_minutes: i64,
    pub reaper_interval_secs: u64,
    pub cache_ttl_secs: i64,
    pub inventory_timeout_ms: u64,
    pub payment_timeout_ms: u64,
    pub tax_rate_bps: u32,
    pub shipping_flat_cents: i64,
    pub free_shipping_threshold_cents: Option<i64>,
    pub currency: Currency,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: env_or("LOG_FORMAT", defaults.log_format),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            database_max_connections: env_or(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            reservation_ttl_minutes: env_or(
                "RESERVATION_TTL_MINUTES",
                defaults.reservation_ttl_minutes,
            )
            .max(1),
            reaper_interval_secs: env_or("REAPER_INTERVAL_SECS", defaults.reaper_interval_secs)
                .max(1),
            cache_ttl_secs: env_or("INVENTORY_CACHE_TTL_SECS", defaults.cache_ttl_secs).max(0),
            inventory_timeout_ms: env_or("INVENTORY_TIMEOUT_MS", defaults.inventory_timeout_ms),
            payment_timeout_ms: env_or("PAYMENT_TIMEOUT_MS", defaults.payment_timeout_ms),
            tax_rate_bps: env_or("TAX_RATE_BPS", defaults.tax_rate_bps),
            shipping_flat_cents: env_or("SHIPPING_FLAT_CENTS", defaults.shipping_flat_cents),
            free_shipping_threshold_cents: std::env::var("FREE_SHIPPING_THRESHOLD_CENTS")
                .ok()
                .and_then(|v| v.parse().ok()),
            currency: env_or("CURRENCY", defaults.currency),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Inventory engine settings. Holds last at least a minute and the
    /// reaper sweeps at most once a second.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_reservation_ttl(chrono::Duration::minutes(self.reservation_ttl_minutes.max(1)))
            .with_cache_ttl(chrono::Duration::seconds(self.cache_ttl_secs.max(0)))
            .with_reaper_interval(Duration::from_secs(self.reaper_interval_secs.max(1)))
    }

    /// Saga timeouts and pricing.
    pub fn saga_config(&self) -> SagaConfig {
        SagaConfig::default()
            .with_inventory_timeout(Duration::from_millis(self.inventory_timeout_ms))
            .with_payment_timeout(Duration::from_millis(self.payment_timeout_ms))
            .with_pricing(Pricing {
                tax_rate_bps: self.tax_rate_bps,
                shipping_flat: Money::from_cents(self.shipping_flat_cents),
                free_shipping_threshold: self.free_shipping_threshold_cents.map(Money::from_cents),
                currency: self.currency,
            })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            reservation_ttl_minutes: 15,
            reaper_interval_secs: 60,
            cache_ttl_secs: 300,
            inventory_timeout_ms: 5_000,
            payment_timeout_ms: 15_000,
            tax_rate_bps: 0,
            shipping_flat_cents: 0,
            free_shipping_threshold_cents: None,
            currency: Currency::Usd,
        }
    }
}
