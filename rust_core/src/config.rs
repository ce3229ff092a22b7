//! Configuration for the picks service
//!
//! Every setting has a default and can be overridden from the environment.

use crate::circuit_breaker::BreakerConfig;
use crate::leaderboard::ScoringMode;
use crate::lifecycle::EngineConfig;
use crate::models::MAIN_CARD_MAX_ORDER;
use crate::store::{RetryPolicy, StoreConfig};
use std::env;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PicksConfig {
    /// Postgres backend of record; in-memory backend when unset
    pub database_url: Option<String>,
    pub redis_url: String,
    pub catalog_api_url: String,

    // Timers
    /// Lock-window re-check interval (default: 60s)
    pub lock_poll_interval_secs: u64,
    /// Pending-sync retry interval (default: 30s)
    pub pending_sync_interval_secs: u64,

    // Pick store retries
    pub store_max_attempts: u32,
    pub store_base_backoff_ms: u64,
    pub store_max_backoff_ms: u64,

    /// Fights with order <= this are on the main card (default: 5)
    pub main_card_max_order: u32,
    pub scoring_mode: ScoringMode,
}

impl Default for PicksConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: "redis://localhost:6379".to_string(),
            catalog_api_url: "http://localhost:8000/api".to_string(),
            lock_poll_interval_secs: 60,
            pending_sync_interval_secs: 30,
            store_max_attempts: 3,
            store_base_backoff_ms: 100,
            store_max_backoff_ms: 2000,
            main_card_max_order: MAIN_CARD_MAX_ORDER,
            scoring_mode: ScoringMode::WinnerOnly,
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl PicksConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let scoring_mode = match env::var("SCORING_MODE") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                warn!("{}, falling back to {}", e, defaults.scoring_mode);
                defaults.scoring_mode
            }),
            Err(_) => defaults.scoring_mode,
        };

        Self {
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            catalog_api_url: env::var("CATALOG_API_URL").unwrap_or(defaults.catalog_api_url),
            lock_poll_interval_secs: parse_or(
                "LOCK_POLL_INTERVAL_SECS",
                defaults.lock_poll_interval_secs,
            ),
            pending_sync_interval_secs: parse_or(
                "PENDING_SYNC_INTERVAL_SECS",
                defaults.pending_sync_interval_secs,
            ),
            store_max_attempts: parse_or("STORE_MAX_ATTEMPTS", defaults.store_max_attempts),
            store_base_backoff_ms: parse_or(
                "STORE_BASE_BACKOFF_MS",
                defaults.store_base_backoff_ms,
            ),
            store_max_backoff_ms: parse_or("STORE_MAX_BACKOFF_MS", defaults.store_max_backoff_ms),
            main_card_max_order: parse_or("MAIN_CARD_MAX_ORDER", defaults.main_card_max_order),
            scoring_mode,
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            retry: RetryPolicy {
                max_attempts: self.store_max_attempts.max(1),
                base_backoff_ms: self.store_base_backoff_ms,
                max_backoff_ms: self.store_max_backoff_ms.max(self.store_base_backoff_ms),
            },
            breaker: BreakerConfig::default(),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            main_card_max_order: self.main_card_max_order,
            lock_poll_interval: Duration::from_secs(self.lock_poll_interval_secs.max(1)),
        }
    }

    pub fn pending_sync_interval(&self) -> Duration {
        Duration::from_secs(self.pending_sync_interval_secs.max(1))
    }

    /// Log current configuration. Connection strings are not logged.
    pub fn log_config(&self) {
        info!("PicksConfig loaded:");
        info!(
            "  backend: {}",
            if self.database_url.is_some() { "postgres" } else { "in-memory" }
        );
        info!("  catalog_api_url: {}", self.catalog_api_url);
        info!("  lock_poll_interval: {}s", self.lock_poll_interval_secs);
        info!("  pending_sync_interval: {}s", self.pending_sync_interval_secs);
        info!(
            "  store retry: {} attempts, backoff {}-{}ms",
            self.store_max_attempts, self.store_base_backoff_ms, self.store_max_backoff_ms
        );
        info!("  main_card_max_order: {}", self.main_card_max_order);
        info!("  scoring_mode: {}", self.scoring_mode);
    }
}
