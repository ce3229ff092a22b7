//! Backend-of-record seam for the pick store.

use crate::models::{Pick, UserEventPicks};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Connection-level failure; likely transient
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("backend timeout: {0}")]
    Timeout(String),
    /// The backend answered but refused the request
    #[error("backend rejected request: {0}")]
    Rejected(String),
    #[error("malformed backend payload: {0}")]
    Malformed(String),
}

impl BackendError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, BackendError::Unreachable(_) | BackendError::Timeout(_))
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut => BackendError::Timeout(e.to_string()),
            sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
                BackendError::Unreachable(e.to_string())
            }
            sqlx::Error::Tls(_) | sqlx::Error::Protocol(_) => {
                BackendError::Unreachable(e.to_string())
            }
            sqlx::Error::Decode(_) | sqlx::Error::ColumnDecode { .. } => {
                BackendError::Malformed(e.to_string())
            }
            sqlx::Error::Database(ref db) => {
                // serialization_failure / deadlock_detected / too_many_connections
                match db.code().as_deref() {
                    Some("40001") | Some("40P01") | Some("53300") => {
                        BackendError::Unreachable(e.to_string())
                    }
                    _ => BackendError::Rejected(e.to_string()),
                }
            }
            other => BackendError::Rejected(other.to_string()),
        }
    }
}

/// Durable storage for `UserEventPicks`, one record per (user, event).
#[async_trait]
pub trait PickBackend: Send + Sync {
    async fn fetch(&self, user_id: &str, event_id: &str)
        -> Result<Option<UserEventPicks>, BackendError>;

    /// Create or update one fight's pick inside the (user, event) record.
    async fn upsert_pick(
        &self,
        user_id: &str,
        event_id: &str,
        contest_id: &str,
        pick: &Pick,
        at: DateTime<Utc>,
    ) -> Result<UserEventPicks, BackendError>;

    /// Replace the whole record atomically: all picks are written or none.
    async fn replace(&self, record: &UserEventPicks) -> Result<UserEventPicks, BackendError>;

    async fn list_for_event(&self, event_id: &str) -> Result<Vec<UserEventPicks>, BackendError>;

    /// Returns whether a record existed.
    async fn remove(&self, user_id: &str, event_id: &str) -> Result<bool, BackendError>;

    async fn ping(&self) -> Result<(), BackendError>;
}
