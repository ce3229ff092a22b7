//! Error taxonomy for the pick lifecycle.
//!
//! `PickError` is what callers of the store, the engine and the results book
//! see. Backend failures have their own type (`BackendError`, in
//! `store::backend`) because the store recovers from most of them locally.

use thiserror::Error;

pub type PickResult<T> = Result<T, PickError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PickError {
    /// Contestant is not one of the contest's two contestants, or a method
    /// was supplied without a contestant.
    #[error("invalid selection for fight {contest_id}: {reason}")]
    InvalidSelection { contest_id: String, reason: String },

    /// Write attempted at or after the event's lock instant.
    #[error("picks for event {event_id} are locked")]
    Locked { event_id: String },

    /// Submit attempted before every required pick is complete.
    #[error("picks incomplete: {completed}/{required} completed")]
    Incomplete { completed: usize, required: usize },

    /// Backend unreachable and the fallback cache has nothing to serve.
    #[error("pick store unavailable: {0}")]
    StoreUnavailable(String),

    /// Catalog or identity collaborator failed; no draft can be built.
    #[error("cannot load event {event_id}: {reason}")]
    CatalogUnavailable { event_id: String, reason: String },

    #[error("user is not authenticated")]
    Unauthenticated,

    #[error("fight {contest_id} is not part of event {event_id}")]
    UnknownContest { event_id: String, contest_id: String },

    #[error("result for fight {contest_id} has already been published")]
    OutcomeAlreadyPublished { contest_id: String },

    #[error("invalid result for fight {contest_id}: {reason}")]
    InvalidOutcome { contest_id: String, reason: String },
}

impl PickError {
    pub fn invalid_selection(contest_id: &str, reason: impl Into<String>) -> Self {
        PickError::InvalidSelection {
            contest_id: contest_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors the caller may retry later without changing its input.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PickError::StoreUnavailable(_) | PickError::CatalogUnavailable { .. }
        )
    }
}
