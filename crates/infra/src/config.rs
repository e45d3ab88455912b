//! Configuration loading and representation.
//!
//! Everything is read from `SHOPFLOOR_*` environment variables. A value that
//! fails to parse is logged and replaced by its default; a bad knob never
//! stops the process.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use shopfloor_inventory::StockLevels;

pub const ENV_CONFLICT_RETRIES: &str = "SHOPFLOOR_CONFLICT_RETRIES";
pub const ENV_RETRY_BACKOFF_MS: &str = "SHOPFLOOR_RETRY_BACKOFF_MS";
pub const ENV_DEFAULT_MIN_STOCK: &str = "SHOPFLOOR_DEFAULT_MIN_STOCK";
pub const ENV_DEFAULT_MAX_STOCK: &str = "SHOPFLOOR_DEFAULT_MAX_STOCK";
pub const ENV_AUTO_CREDIT: &str = "SHOPFLOOR_AUTO_CREDIT_ON_COMPLETION";
pub const ENV_DATABASE_URL: &str = "SHOPFLOOR_DATABASE_URL";
pub const ENV_DB_MAX_CONNECTIONS: &str = "SHOPFLOOR_DB_MAX_CONNECTIONS";
pub const ENV_REDIS_URL: &str = "SHOPFLOOR_REDIS_URL";

/// Lifecycle engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How many times an operation is re-run from a fresh read after losing
    /// a version check.
    pub conflict_retries: u32,
    /// Pause between conflict retries, multiplied by the attempt number.
    pub retry_backoff_ms: u64,
    /// Levels given to inventory records created on first movement.
    pub default_min_stock: i64,
    pub default_max_stock: i64,
    /// Credit inventory in the commit that completes the last item, instead
    /// of waiting for an explicit production confirmation.
    pub auto_credit_on_completion: bool,
    pub redis_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            conflict_retries: 3,
            retry_backoff_ms: 5,
            default_min_stock: 0,
            default_max_stock: 1000,
            auto_credit_on_completion: false,
            redis_url: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment, file, test map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let mut config = Self {
            conflict_retries: parse_or(&lookup, ENV_CONFLICT_RETRIES, defaults.conflict_retries),
            retry_backoff_ms: parse_or(&lookup, ENV_RETRY_BACKOFF_MS, defaults.retry_backoff_ms),
            default_min_stock: parse_or(&lookup, ENV_DEFAULT_MIN_STOCK, defaults.default_min_stock),
            default_max_stock: parse_or(&lookup, ENV_DEFAULT_MAX_STOCK, defaults.default_max_stock),
            auto_credit_on_completion: parse_bool_or(
                &lookup,
                ENV_AUTO_CREDIT,
                defaults.auto_credit_on_completion,
            ),
            redis_url: lookup(ENV_REDIS_URL).filter(|v| !v.trim().is_empty()),
        };

        if StockLevels::new(config.default_min_stock, config.default_max_stock).is_err() {
            warn!(
                min = config.default_min_stock,
                max = config.default_max_stock,
                "invalid default stock levels, using defaults"
            );
            config.default_min_stock = defaults.default_min_stock;
            config.default_max_stock = defaults.default_max_stock;
        }

        config
    }

    pub fn default_levels(&self) -> StockLevels {
        StockLevels::new(self.default_min_stock, self.default_max_stock).unwrap_or_default()
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Postgres store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl StoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
        }
    }

    /// `None` when no database is configured (in-memory deployment).
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let url = lookup(ENV_DATABASE_URL).filter(|v| !v.trim().is_empty())?;
        let mut config = Self::new(url);
        config.max_connections = parse_or(&lookup, ENV_DB_MAX_CONNECTIONS, config.max_connections);
        if config.max_connections == 0 {
            warn!("{ENV_DB_MAX_CONNECTIONS} must be positive, using 10");
            config.max_connections = 10;
        }
        Some(config)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + core::fmt::Debug,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, ?default, "invalid config value, using default");
                default
            }
        },
    }
}

fn parse_bool_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                warn!(key, value = %raw, default, "invalid boolean config value, using default");
                default
            }
        },
    }
}
