//! Circuit breaker for remote collaborators (pick backend, catalog API).
//!
//! After `failure_threshold` consecutive failures the breaker opens and
//! callers go straight to their fallback path. Once `recovery_timeout` has
//! elapsed one trial call is let through (half-open); `success_threshold`
//! successes close it again, any failure re-opens it.

use parking_lot::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: RwLock<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: &str, config: BreakerConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            inner: RwLock::new(BreakerInner {
                state: BreakerState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
            }),
        }
    }

    pub fn with_defaults(name: &str) -> Self {
        Self::new(name, BreakerConfig::default())
    }

    /// Whether a call should be attempted. May move Open -> HalfOpen.
    pub fn is_available(&self) -> bool {
        let mut inner = self.inner.write();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let recovered = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.config.recovery_timeout)
                    .unwrap_or(true);
                if recovered {
                    inner.state = BreakerState::HalfOpen;
                    inner.successes = 0;
                    tracing::debug!("Circuit breaker '{}' half-open, probing", self.name);
                }
                recovered
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.write();
        inner.failures = 0;
        match inner.state {
            BreakerState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.config.success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.opened_at = None;
                    tracing::info!(
                        "Circuit breaker '{}' closed after {} successful calls",
                        self.name,
                        inner.successes
                    );
                }
            }
            _ => inner.state = BreakerState::Closed,
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.write();
        inner.failures += 1;
        match inner.state {
            BreakerState::Closed if inner.failures >= self.config.failure_threshold => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                tracing::warn!(
                    "Circuit breaker '{}' OPENED after {} consecutive failures",
                    self.name,
                    inner.failures
                );
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                tracing::warn!("Circuit breaker '{}' re-OPENED during half-open trial", self.name);
            }
            _ => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.read().state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.state = BreakerState::Closed;
        inner.failures = 0;
        inner.successes = 0;
        inner.opened_at = None;
    }
}
