//! Local fallback cache for the pick store.
//!
//! Holds the last-known snapshot per (user, event) plus a pending-sync flag
//! for writes the backend has not acknowledged yet. Keyed identically to the
//! backend record.

use crate::models::{storage_key, UserEventPicks};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSnapshot {
    pub record: UserEventPicks,
    /// Written locally, not yet acknowledged by the backend
    pub pending_sync: bool,
}

#[derive(Debug, Default)]
pub struct FallbackCache {
    entries: RwLock<HashMap<String, CachedSnapshot>>,
}

impl FallbackCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &str, event_id: &str) -> Option<CachedSnapshot> {
        self.entries.read().get(&storage_key(user_id, event_id)).cloned()
    }

    /// Record a snapshot the backend has confirmed.
    pub fn store_synced(&self, record: UserEventPicks) {
        let key = storage_key(&record.user_id, &record.event_id);
        self.entries.write().insert(
            key,
            CachedSnapshot {
                record,
                pending_sync: false,
            },
        );
    }

    /// Record a snapshot that still has to reach the backend.
    pub fn store_pending(&self, record: UserEventPicks) {
        let key = storage_key(&record.user_id, &record.event_id);
        debug!("Queued {} for backend sync", key);
        self.entries.write().insert(
            key,
            CachedSnapshot {
                record,
                pending_sync: true,
            },
        );
    }

    /// Clear the pending flag, unless the entry changed since `synced` was
    /// taken (a newer local write stays queued).
    pub fn mark_synced(&self, synced: &UserEventPicks, confirmed: UserEventPicks) {
        let key = storage_key(&synced.user_id, &synced.event_id);
        let mut entries = self.entries.write();
        match entries.get(&key) {
            Some(current) if current.pending_sync && current.record.updated_at > synced.updated_at => {
                debug!("{} changed during sync, keeping it queued", key);
            }
            _ => {
                entries.insert(
                    key,
                    CachedSnapshot {
                        record: confirmed,
                        pending_sync: false,
                    },
                );
            }
        }
    }

    pub fn remove(&self, user_id: &str, event_id: &str) -> Option<CachedSnapshot> {
        self.entries.write().remove(&storage_key(user_id, event_id))
    }

    pub fn pending(&self) -> Vec<UserEventPicks> {
        self.entries
            .read()
            .values()
            .filter(|s| s.pending_sync)
            .map(|s| s.record.clone())
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.entries.read().values().filter(|s| s.pending_sync).count()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Reconcile a backend snapshot with a locally cached one.
///
/// Per fight entry, the side that wrote it last (`entry_time`) wins; entries
/// present in only one snapshot are kept. Ties go to the backend.
pub fn merge_snapshots(backend: &UserEventPicks, local: &UserEventPicks) -> UserEventPicks {
    let mut merged = UserEventPicks {
        user_id: backend.user_id.clone(),
        event_id: backend.event_id.clone(),
        picks: BTreeMap::new(),
        entry_times: BTreeMap::new(),
        updated_at: backend.updated_at.max(local.updated_at),
        submitted: backend.submitted || local.submitted,
    };

    let contest_ids: BTreeSet<&String> = backend.picks.keys().chain(local.picks.keys()).collect();
    for contest_id in contest_ids {
        let from_backend = backend.picks.get(contest_id).map(|p| (p, backend.entry_time(contest_id)));
        let from_local = local.picks.get(contest_id).map(|p| (p, local.entry_time(contest_id)));

        let winner = match (from_backend, from_local) {
            (Some(b), Some(l)) if l.1 > b.1 => l,
            (Some(b), _) => b,
            (None, Some(l)) => l,
            (None, None) => continue,
        };
        merged.picks.insert(contest_id.clone(), winner.0.clone());
        merged.entry_times.insert(contest_id.clone(), winner.1);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Pick;
    use chrono::{Duration, TimeZone, Utc};

    fn record(at_minute: u32, picks: &[(&str, Pick)]) -> UserEventPicks {
        let mut r = UserEventPicks::empty(
            "u1",
            "ufc-300",
            Utc.with_ymd_and_hms(2024, 4, 13, 20, at_minute, 0).unwrap(),
        );
        for (id, pick) in picks {
            r.picks.insert(id.to_string(), pick.clone());
        }
        r
    }

    #[test]
    fn test_merge_later_snapshot_wins_per_entry() {
        let backend = record(
            10,
            &[("f1", Pick::complete("a", "KO")), ("f2", Pick::complete("c", "SUB"))],
        );
        let local = record(
            20,
            &[("f1", Pick::complete("b", "PTS")), ("f3", Pick::fighter("e"))],
        );

        let merged = merge_snapshots(&backend, &local);
        assert_eq!(merged.picks["f1"], Pick::complete("b", "PTS"));
        assert_eq!(merged.picks["f2"], Pick::complete("c", "SUB"));
        assert_eq!(merged.picks["f3"], Pick::fighter("e"));
        assert_eq!(merged.updated_at, local.updated_at);
    }

    #[test]
    fn test_merge_backend_newer() {
        let backend = record(30, &[("f1", Pick::complete("a", "KO"))]);
        let local = record(20, &[("f1", Pick::complete("b", "PTS"))]);

        let merged = merge_snapshots(&backend, &local);
        assert_eq!(merged.picks["f1"], Pick::complete("a", "KO"));
        assert_eq!(merged.updated_at, backend.updated_at);
    }

    #[test]
    fn test_merge_decides_each_fight_by_its_own_write_time() {
        let t = |minute| Utc.with_ymd_and_hms(2024, 4, 13, 20, minute, 0).unwrap();

        // f1 edited locally at :20; the backend copy is newer overall only
        // because f2 was written there at :30.
        let mut backend = record(0, &[]);
        backend.set_pick("f1", Pick::fighter("f1-blue"), t(0));
        backend.set_pick("f2", Pick::fighter("f2-red"), t(30));
        let mut local = record(0, &[]);
        local.set_pick("f1", Pick::fighter("f1-red"), t(20));

        let merged = merge_snapshots(&backend, &local);
        assert_eq!(merged.picks["f1"], Pick::fighter("f1-red"));
        assert_eq!(merged.picks["f2"], Pick::fighter("f2-red"));
        assert_eq!(merged.entry_time("f1"), t(20));
        assert_eq!(merged.updated_at, t(30));
    }

    #[test]
    fn test_pending_lifecycle() {
        let cache = FallbackCache::new();
        let r = record(10, &[("f1", Pick::fighter("a"))]);
        cache.store_pending(r.clone());
        assert_eq!(cache.pending_count(), 1);

        cache.mark_synced(&r, r.clone());
        assert_eq!(cache.pending_count(), 0);
        assert_eq!(cache.get("u1", "ufc-300").unwrap().record, r);
    }

    #[test]
    fn test_newer_local_write_stays_pending() {
        let cache = FallbackCache::new();
        let first = record(10, &[("f1", Pick::fighter("a"))]);
        let mut second = first.clone();
        second.updated_at = first.updated_at + Duration::minutes(1);
        second.picks.insert("f1".to_string(), Pick::fighter("b"));

        cache.store_pending(first.clone());
        cache.store_pending(second.clone());
        cache.mark_synced(&first, first.clone());

        let entry = cache.get("u1", "ufc-300").unwrap();
        assert!(entry.pending_sync);
        assert_eq!(entry.record, second);
    }
}
