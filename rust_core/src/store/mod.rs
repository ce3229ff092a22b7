//! Pick store: backend of record with a local fallback cache.
//!
//! Every backend call goes through the circuit breaker and the retry policy.
//! When the backend is unreachable the store does not fail the caller:
//! - reads are served from the fallback cache (or `StoreUnavailable` when
//!   the cache has nothing for that key),
//! - writes are applied to the cached snapshot and queued as pending sync.
//!
//! `sync_pending` replays queued snapshots once the backend is back.

pub mod backend;
pub mod cache;
pub mod memory;
pub mod postgres;
pub mod retry;

pub use backend::{BackendError, PickBackend};
pub use cache::{merge_snapshots, CachedSnapshot, FallbackCache};
pub use memory::MemoryPickBackend;
pub use postgres::PgPickBackend;
pub use retry::{execute_with_retry, RetryPolicy};

use crate::circuit_breaker::{BreakerConfig, CircuitBreaker};
use crate::error::{PickError, PickResult};
use crate::models::{Contest, Pick, UserEventPicks};
use crate::window::Clock;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Acknowledged by the backend of record
    Synced,
    /// Held in the fallback cache, waiting for the backend
    Pending,
}

/// Outcome of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stored {
    pub record: UserEventPicks,
    pub sync: SyncState,
}

impl Stored {
    pub fn is_pending(&self) -> bool {
        self.sync == SyncState::Pending
    }
}

#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    pub retry: RetryPolicy,
    pub breaker: BreakerConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
}

/// Check a single pick against its fight.
pub fn validate_pick(contest: &Contest, pick: Pick) -> PickResult<Pick> {
    let pick = pick.normalized();
    let fighter_id = match pick.fighter_id.as_deref() {
        Some(id) => id,
        None if pick.method.is_some() => {
            return Err(PickError::invalid_selection(
                &contest.id,
                "a method requires a fighter to be selected",
            ))
        }
        None => return Err(PickError::invalid_selection(&contest.id, "no fighter selected")),
    };
    if !contest.has_contestant(fighter_id) {
        return Err(PickError::invalid_selection(
            &contest.id,
            format!("fighter {} is not in this fight", fighter_id),
        ));
    }
    Ok(pick)
}

pub struct PickStore {
    backend: Arc<dyn PickBackend>,
    cache: FallbackCache,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl PickStore {
    pub fn new(backend: Arc<dyn PickBackend>, clock: Arc<dyn Clock>) -> Self {
        Self::with_config(backend, clock, StoreConfig::default())
    }

    pub fn with_config(
        backend: Arc<dyn PickBackend>,
        clock: Arc<dyn Clock>,
        config: StoreConfig,
    ) -> Self {
        Self {
            backend,
            cache: FallbackCache::new(),
            breaker: CircuitBreaker::new("pick_backend", config.breaker),
            retry: config.retry,
            clock,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.cache.pending_count()
    }

    pub fn cache(&self) -> &FallbackCache {
        &self.cache
    }

    /// Run a backend operation through the breaker and retry policy.
    async fn call_backend<F, Fut, T>(&self, op: &str, f: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        if !self.breaker.is_available() {
            debug!("Pick backend circuit open, skipping {}", op);
            return Err(BackendError::Unreachable(format!(
                "circuit '{}' open",
                self.breaker.name()
            )));
        }

        let result = execute_with_retry(f, self.retry).await;
        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(e) if e.is_retriable() => {
                warn!("Pick backend {} failed: {}", op, e);
                self.breaker.record_failure();
            }
            // The backend answered, so it is reachable.
            Err(_) => self.breaker.record_success(),
        }
        result
    }

    /// Create or update one fight's pick.
    pub async fn upsert(
        &self,
        user_id: &str,
        event_id: &str,
        contest: &Contest,
        pick: Pick,
    ) -> PickResult<Stored> {
        if contest.event_id != event_id {
            return Err(PickError::UnknownContest {
                event_id: event_id.to_string(),
                contest_id: contest.id.clone(),
            });
        }
        let pick = validate_pick(contest, pick)?;
        let now = self.clock.now();

        let result = self
            .call_backend("upsert", || {
                self.backend.upsert_pick(user_id, event_id, &contest.id, &pick, now)
            })
            .await;

        match result {
            Ok(record) => Ok(self.settle(record)),
            Err(e) if e.is_retriable() => {
                let mut local = self
                    .cache
                    .get(user_id, event_id)
                    .map(|s| s.record)
                    .unwrap_or_else(|| UserEventPicks::empty(user_id, event_id, now));
                local.set_pick(&contest.id, pick, now);
                self.cache.store_pending(local.clone());
                warn!(
                    "Pick for user={}, event={}, fight={} queued locally: {}",
                    user_id, event_id, contest.id, e
                );
                Ok(Stored {
                    record: local,
                    sync: SyncState::Pending,
                })
            }
            Err(e) => Err(PickError::StoreUnavailable(e.to_string())),
        }
    }

    /// A record the backend just confirmed. Unsynced local edits are merged
    /// on top and stay queued.
    fn settle(&self, confirmed: UserEventPicks) -> Stored {
        match self.cache.get(&confirmed.user_id, &confirmed.event_id) {
            Some(local) if local.pending_sync => {
                let merged = merge_snapshots(&confirmed, &local.record);
                self.cache.store_pending(merged.clone());
                Stored {
                    record: merged,
                    sync: SyncState::Pending,
                }
            }
            _ => {
                self.cache.store_synced(confirmed.clone());
                Stored {
                    record: confirmed,
                    sync: SyncState::Synced,
                }
            }
        }
    }

    /// Current picks for (user, event); `None` when the user has none.
    pub async fn read(&self, user_id: &str, event_id: &str) -> PickResult<Option<UserEventPicks>> {
        let result = self
            .call_backend("fetch", || self.backend.fetch(user_id, event_id))
            .await;

        match result {
            Ok(Some(remote)) => match self.cache.get(user_id, event_id) {
                Some(local) if local.pending_sync => Ok(Some(merge_snapshots(&remote, &local.record))),
                _ => {
                    self.cache.store_synced(remote.clone());
                    Ok(Some(remote))
                }
            },
            Ok(None) => match self.cache.get(user_id, event_id) {
                Some(local) if local.pending_sync => Ok(Some(local.record)),
                Some(_) => {
                    // Removed at the backend since we cached it.
                    self.cache.remove(user_id, event_id);
                    Ok(None)
                }
                None => Ok(None),
            },
            Err(e) if e.is_retriable() => match self.cache.get(user_id, event_id) {
                Some(local) => {
                    warn!(
                        "Serving cached picks for user={}, event={}: {}",
                        user_id, event_id, e
                    );
                    Ok(Some(local.record))
                }
                None => Err(PickError::StoreUnavailable(e.to_string())),
            },
            Err(e) => Err(PickError::StoreUnavailable(e.to_string())),
        }
    }

    /// Record the entire pick map in one write and mark it submitted.
    ///
    /// Either every pick is recorded or none is. Resubmitting the same map
    /// rewrites the same record with a fresh timestamp.
    pub async fn submit(
        &self,
        user_id: &str,
        event_id: &str,
        contests: &[Contest],
        picks: BTreeMap<String, Pick>,
    ) -> PickResult<Stored> {
        let mut validated = BTreeMap::new();
        for (contest_id, pick) in picks {
            let contest = contests
                .iter()
                .find(|c| c.id == contest_id && c.event_id == event_id)
                .ok_or_else(|| PickError::UnknownContest {
                    event_id: event_id.to_string(),
                    contest_id: contest_id.clone(),
                })?;
            validated.insert(contest_id, validate_pick(contest, pick)?);
        }

        let now = self.clock.now();
        let record = UserEventPicks {
            user_id: user_id.to_string(),
            event_id: event_id.to_string(),
            entry_times: validated.keys().map(|id| (id.clone(), now)).collect(),
            picks: validated,
            updated_at: now,
            submitted: true,
        };

        let result = self
            .call_backend("replace", || self.backend.replace(&record))
            .await;

        match result {
            Ok(confirmed) => {
                info!(
                    "Picks submitted: user={}, event={}, fights={}",
                    user_id,
                    event_id,
                    confirmed.picks.len()
                );
                self.cache.store_synced(confirmed.clone());
                Ok(Stored {
                    record: confirmed,
                    sync: SyncState::Synced,
                })
            }
            Err(e) if e.is_retriable() => {
                warn!(
                    "Submission for user={}, event={} queued locally: {}",
                    user_id, event_id, e
                );
                self.cache.store_pending(record.clone());
                Ok(Stored {
                    record,
                    sync: SyncState::Pending,
                })
            }
            Err(e) => Err(PickError::StoreUnavailable(e.to_string())),
        }
    }

    pub async fn has_submitted(&self, user_id: &str, event_id: &str) -> PickResult<bool> {
        Ok(self
            .read(user_id, event_id)
            .await?
            .map(|r| r.submitted)
            .unwrap_or(false))
    }

    /// Delete a user's picks for an event. Never queued: requires the backend.
    pub async fn remove(&self, user_id: &str, event_id: &str) -> PickResult<bool> {
        let existed = self
            .call_backend("remove", || self.backend.remove(user_id, event_id))
            .await
            .map_err(|e| PickError::StoreUnavailable(e.to_string()))?;
        let cached = self.cache.remove(user_id, event_id).is_some();
        info!("Removed picks for user={}, event={}", user_id, event_id);
        Ok(existed || cached)
    }

    /// Every record stored for an event, straight from the backend of record.
    pub async fn list_for_event(&self, event_id: &str) -> PickResult<Vec<UserEventPicks>> {
        self.call_backend("list", || self.backend.list_for_event(event_id))
            .await
            .map_err(|e| PickError::StoreUnavailable(e.to_string()))
    }

    /// Push queued snapshots to the backend, merging with its copy first.
    pub async fn sync_pending(&self) -> SyncReport {
        let pending = self.cache.pending();
        let mut report = SyncReport {
            attempted: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            return report;
        }

        for local in pending {
            let remote = match self
                .call_backend("fetch", || self.backend.fetch(&local.user_id, &local.event_id))
                .await
            {
                Ok(remote) => remote,
                Err(e) => {
                    debug!("Sync of {}/{} deferred: {}", local.user_id, local.event_id, e);
                    report.failed += 1;
                    continue;
                }
            };

            let merged = match &remote {
                Some(remote) => merge_snapshots(remote, &local),
                None => local.clone(),
            };

            match self
                .call_backend("replace", || self.backend.replace(&merged))
                .await
            {
                Ok(confirmed) => {
                    self.cache.mark_synced(&local, confirmed);
                    report.synced += 1;
                }
                Err(e) => {
                    debug!("Sync of {}/{} failed: {}", local.user_id, local.event_id, e);
                    report.failed += 1;
                }
            }
        }

        if report.synced > 0 {
            info!(
                "Pending pick sync: {}/{} snapshots synced",
                report.synced, report.attempted
            );
        }
        report
    }
}

/// Start a background task that periodically retries queued writes.
pub fn start_sync_task(store: Arc<PickStore>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if store.pending_count() > 0 {
                store.sync_pending().await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Contestant;
    use crate::window::ManualClock;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn contest(id: &str) -> Contest {
        Contest {
            id: id.to_string(),
            event_id: "ufc-300".to_string(),
            weight_class: "Lightweight".to_string(),
            fighter1: Contestant::new(&format!("{}-red", id), "Red"),
            fighter2: Contestant::new(&format!("{}-blue", id), "Blue"),
            order: 1,
            is_main_event: false,
        }
    }

    fn setup() -> (Arc<MemoryPickBackend>, Arc<ManualClock>, PickStore) {
        let backend = Arc::new(MemoryPickBackend::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 4, 13, 18, 0, 0).unwrap(),
        ));
        let config = StoreConfig {
            retry: RetryPolicy {
                max_attempts: 2,
                base_backoff_ms: 1,
                max_backoff_ms: 2,
            },
            breaker: BreakerConfig {
                failure_threshold: 100,
                ..Default::default()
            },
        };
        let store = PickStore::with_config(backend.clone(), clock.clone(), config);
        (backend, clock, store)
    }

    #[test]
    fn test_validate_pick_rejects_outsider() {
        let err = validate_pick(&contest("f1"), Pick::complete("someone-else", "KO")).unwrap_err();
        assert!(matches!(err, PickError::InvalidSelection { .. }));
    }

    #[test]
    fn test_validate_pick_rejects_method_only() {
        let pick = Pick {
            fighter_id: None,
            method: Some("KO".to_string()),
        };
        assert!(validate_pick(&contest("f1"), pick).is_err());
    }

    #[tokio::test]
    async fn test_invalid_selection_never_reaches_backend() {
        let (backend, _, store) = setup();
        let err = store
            .upsert("u1", "ufc-300", &contest("f1"), Pick::fighter("nobody"))
            .await
            .unwrap_err();
        assert!(matches!(err, PickError::InvalidSelection { .. }));
        assert_eq!(backend.write_count(), 0);
    }

    #[tokio::test]
    async fn test_upsert_while_unreachable_is_queued_and_readable() {
        let (backend, _, store) = setup();
        backend.set_available(false);

        let stored = store
            .upsert("u1", "ufc-300", &contest("f1"), Pick::fighter("f1-red"))
            .await
            .unwrap();
        assert!(stored.is_pending());
        assert_eq!(store.pending_count(), 1);

        let read = store.read("u1", "ufc-300").await.unwrap().unwrap();
        assert_eq!(read.picks["f1"], Pick::fighter("f1-red"));
    }

    #[tokio::test]
    async fn test_read_unreachable_without_cache_is_unavailable() {
        let (backend, _, store) = setup();
        backend.set_available(false);
        let err = store.read("u1", "ufc-300").await.unwrap_err();
        assert!(matches!(err, PickError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_sync_pending_pushes_queued_snapshot() {
        let (backend, clock, store) = setup();
        store
            .upsert("u1", "ufc-300", &contest("f1"), Pick::complete("f1-red", "KO"))
            .await
            .unwrap();

        backend.set_available(false);
        clock.advance(ChronoDuration::minutes(5));
        store
            .upsert("u1", "ufc-300", &contest("f2"), Pick::fighter("f2-blue"))
            .await
            .unwrap();

        backend.set_available(true);
        let report = store.sync_pending().await;
        assert_eq!(report.synced, 1);
        assert_eq!(store.pending_count(), 0);

        let remote = backend.fetch("u1", "ufc-300").await.unwrap().unwrap();
        assert_eq!(remote.picks.len(), 2);
        assert_eq!(remote.picks["f2"], Pick::fighter("f2-blue"));
    }

    #[tokio::test]
    async fn test_queued_edit_survives_later_online_write() {
        let (backend, clock, store) = setup();
        store
            .upsert("u1", "ufc-300", &contest("f1"), Pick::fighter("f1-blue"))
            .await
            .unwrap();

        backend.set_available(false);
        clock.advance(ChronoDuration::minutes(1));
        let queued = store
            .upsert("u1", "ufc-300", &contest("f1"), Pick::fighter("f1-red"))
            .await
            .unwrap();
        assert!(queued.is_pending());

        // Back online: a write to another fight makes the backend record
        // newer overall, but its f1 is still the old value.
        backend.set_available(true);
        clock.advance(ChronoDuration::minutes(1));
        let stored = store
            .upsert("u1", "ufc-300", &contest("f2"), Pick::fighter("f2-red"))
            .await
            .unwrap();
        assert!(stored.is_pending());
        assert_eq!(stored.record.picks["f1"], Pick::fighter("f1-red"));

        let read = store.read("u1", "ufc-300").await.unwrap().unwrap();
        assert_eq!(read.picks["f1"], Pick::fighter("f1-red"));
        assert_eq!(read.picks["f2"], Pick::fighter("f2-red"));

        let report = store.sync_pending().await;
        assert_eq!(report.synced, 1);
        assert_eq!(store.pending_count(), 0);

        let remote = backend.fetch("u1", "ufc-300").await.unwrap().unwrap();
        assert_eq!(remote.picks["f1"], Pick::fighter("f1-red"));
        assert_eq!(remote.picks["f2"], Pick::fighter("f2-red"));
    }

    #[tokio::test]
    async fn test_has_submitted_after_submit() {
        let (_, _, store) = setup();
        let contests = vec![contest("f1")];
        assert!(!store.has_submitted("u1", "ufc-300").await.unwrap());

        store
            .upsert("u1", "ufc-300", &contests[0], Pick::complete("f1-red", "KO"))
            .await
            .unwrap();
        assert!(!store.has_submitted("u1", "ufc-300").await.unwrap());

        let mut picks = BTreeMap::new();
        picks.insert("f1".to_string(), Pick::complete("f1-red", "KO"));
        store.submit("u1", "ufc-300", &contests, picks).await.unwrap();
        assert!(store.has_submitted("u1", "ufc-300").await.unwrap());
    }

    #[tokio::test]
    async fn test_background_sync_drains_queue() {
        let (backend, _, store) = setup();
        backend.set_available(false);
        store
            .upsert("u1", "ufc-300", &contest("f1"), Pick::fighter("f1-red"))
            .await
            .unwrap();
        backend.set_available(true);

        let store = Arc::new(store);
        let task = start_sync_task(store.clone(), Duration::from_millis(10));
        for _ in 0..100 {
            if store.pending_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        task.abort();

        assert_eq!(store.pending_count(), 0);
        assert!(backend.fetch("u1", "ufc-300").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_requires_backend() {
        let (backend, _, store) = setup();
        store
            .upsert("u1", "ufc-300", &contest("f1"), Pick::fighter("f1-red"))
            .await
            .unwrap();

        backend.set_available(false);
        assert!(store.remove("u1", "ufc-300").await.is_err());

        backend.set_available(true);
        assert!(store.remove("u1", "ufc-300").await.unwrap());
        assert!(store.read("u1", "ufc-300").await.unwrap().is_none());
    }
}
