//! Backend-of-record health monitoring.
//!
//! Pings the pick backend on an interval and logs transitions. The pick
//! store's own breaker decides routing; this is the operator's view.

use crate::store::PickBackend;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone, Debug)]
pub struct BackendHealthConfig {
    pub check_interval: Duration,
    /// Consecutive failures before escalating to a critical log
    pub alert_threshold: u32,
    pub enabled: bool,
}

impl Default for BackendHealthConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            alert_threshold: 3,
            enabled: true,
        }
    }
}

impl BackendHealthConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            check_interval: Duration::from_secs(
                std::env::var("DB_HEALTH_CHECK_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.check_interval.as_secs()),
            ),
            alert_threshold: std::env::var("DB_HEALTH_ALERT_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.alert_threshold),
            enabled: std::env::var("DB_HEALTH_CHECK_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.enabled),
        }
    }
}

pub struct BackendHealthMonitor {
    backend: Arc<dyn PickBackend>,
    config: BackendHealthConfig,
    consecutive_failures: u32,
}

impl BackendHealthMonitor {
    pub fn new(backend: Arc<dyn PickBackend>, config: BackendHealthConfig) -> Self {
        Self {
            backend,
            config,
            consecutive_failures: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// One health check. Returns true when the backend answered.
    pub async fn check(&mut self) -> bool {
        match self.backend.ping().await {
            Ok(()) => {
                if self.consecutive_failures > 0 {
                    info!(
                        "Pick backend recovered after {} failed checks",
                        self.consecutive_failures
                    );
                    self.consecutive_failures = 0;
                }
                true
            }
            Err(e) => {
                self.consecutive_failures += 1;
                error!(
                    "Pick backend health check failed (attempt {}/{}): {}",
                    self.consecutive_failures, self.config.alert_threshold, e
                );
                if self.consecutive_failures == self.config.alert_threshold {
                    error!(
                        "CRITICAL: pick backend unreachable for {} consecutive checks, writes are queuing locally",
                        self.consecutive_failures
                    );
                }
                false
            }
        }
    }

    /// Run forever.
    pub async fn start_monitoring(mut self) {
        if !self.config.enabled {
            info!("Pick backend health monitoring is disabled");
            return;
        }

        info!(
            "Starting pick backend health monitoring (interval: {:?}, alert threshold: {})",
            self.config.check_interval, self.config.alert_threshold
        );

        loop {
            self.check().await;
            tokio::time::sleep(self.config.check_interval).await;
        }
    }

    pub fn start_background(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.start_monitoring())
    }
}
