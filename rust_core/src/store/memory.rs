//! In-process pick backend.
//!
//! Used when no database is configured and in tests, where the availability
//! switch simulates an unreachable backend.

use super::backend::{BackendError, PickBackend};
use crate::models::{storage_key, Pick, UserEventPicks};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug)]
pub struct MemoryPickBackend {
    records: RwLock<HashMap<String, UserEventPicks>>,
    available: AtomicBool,
    writes: AtomicU64,
}

impl Default for MemoryPickBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPickBackend {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            writes: AtomicU64::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn record_count(&self) -> usize {
        self.records.read().len()
    }

    /// Successful writes since creation.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Unreachable("connection refused".to_string()))
        }
    }
}

#[async_trait]
impl PickBackend for MemoryPickBackend {
    async fn fetch(
        &self,
        user_id: &str,
        event_id: &str,
    ) -> Result<Option<UserEventPicks>, BackendError> {
        self.check()?;
        Ok(self.records.read().get(&storage_key(user_id, event_id)).cloned())
    }

    async fn upsert_pick(
        &self,
        user_id: &str,
        event_id: &str,
        contest_id: &str,
        pick: &Pick,
        at: DateTime<Utc>,
    ) -> Result<UserEventPicks, BackendError> {
        self.check()?;
        let mut records = self.records.write();
        let record = records
            .entry(storage_key(user_id, event_id))
            .or_insert_with(|| UserEventPicks::empty(user_id, event_id, at));
        record.set_pick(contest_id, pick.clone(), at);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(record.clone())
    }

    async fn replace(&self, record: &UserEventPicks) -> Result<UserEventPicks, BackendError> {
        self.check()?;
        self.records
            .write()
            .insert(storage_key(&record.user_id, &record.event_id), record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(record.clone())
    }

    async fn list_for_event(&self, event_id: &str) -> Result<Vec<UserEventPicks>, BackendError> {
        self.check()?;
        let mut records: Vec<UserEventPicks> = self
            .records
            .read()
            .values()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(records)
    }

    async fn remove(&self, user_id: &str, event_id: &str) -> Result<bool, BackendError> {
        self.check()?;
        Ok(self.records.write().remove(&storage_key(user_id, event_id)).is_some())
    }

    async fn ping(&self) -> Result<(), BackendError> {
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_creates_then_updates_one_record() {
        let backend = MemoryPickBackend::new();
        let now = Utc::now();
        backend
            .upsert_pick("u1", "ufc-300", "f1", &Pick::fighter("a"), now)
            .await
            .unwrap();
        let record = backend
            .upsert_pick("u1", "ufc-300", "f2", &Pick::complete("c", "KO"), now)
            .await
            .unwrap();

        assert_eq!(record.picks.len(), 2);
        assert_eq!(backend.record_count(), 1);
        assert_eq!(backend.write_count(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_backend_errors() {
        let backend = MemoryPickBackend::new();
        backend.set_available(false);
        let err = backend.fetch("u1", "ufc-300").await.unwrap_err();
        assert!(err.is_retriable());
        assert!(backend.ping().await.is_err());
    }
}
