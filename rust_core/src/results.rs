//! Published fight results.
//!
//! Outcomes are immutable once published. Readers take an
//! `Arc<OutcomeSnapshot>`; a later publication swaps in a new snapshot and
//! never touches one that is already handed out, so a leaderboard always
//! sees one consistent result set.
//!
//! The book lives in memory; `ResultArchive` is the durable copy it is
//! restored from at startup.

use crate::error::{PickError, PickResult};
use crate::models::{Contest, ContestOutcome};
use crate::store::BackendError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Every outcome published for one event at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutcomeSnapshot {
    pub event_id: String,
    pub outcomes: BTreeMap<String, ContestOutcome>,
    pub taken_at: Option<DateTime<Utc>>,
}

impl OutcomeSnapshot {
    pub fn new(event_id: &str) -> Self {
        Self {
            event_id: event_id.to_string(),
            ..Default::default()
        }
    }

    pub fn with_outcome(mut self, contest_id: &str, outcome: ContestOutcome) -> Self {
        self.outcomes.insert(contest_id.to_string(), outcome);
        self
    }

    pub fn get(&self, contest_id: &str) -> Option<&ContestOutcome> {
        self.outcomes.get(contest_id)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Check an outcome against its fight.
pub fn validate_outcome(contest: &Contest, outcome: &ContestOutcome) -> PickResult<()> {
    match outcome {
        ContestOutcome::NoContest => Ok(()),
        ContestOutcome::Winner { fighter_id, method } => {
            if !contest.has_contestant(fighter_id) {
                return Err(PickError::InvalidOutcome {
                    contest_id: contest.id.clone(),
                    reason: format!("winner {} did not compete in this fight", fighter_id),
                });
            }
            if method.trim().is_empty() {
                return Err(PickError::InvalidOutcome {
                    contest_id: contest.id.clone(),
                    reason: "method is required".to_string(),
                });
            }
            Ok(())
        }
    }
}

/// One persisted fight result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedResult {
    pub event_id: String,
    pub fight_id: String,
    pub outcome: ContestOutcome,
    pub published_at: DateTime<Utc>,
}

/// Durable storage for published results.
#[async_trait]
pub trait ResultArchive: Send + Sync {
    /// Store a result unless the fight already has one. Returns the result
    /// now on record (the first one written wins).
    async fn record(&self, result: &ArchivedResult) -> Result<ArchivedResult, BackendError>;

    async fn load_all(&self) -> Result<Vec<ArchivedResult>, BackendError>;
}

/// In-process archive for tests and database-less runs.
#[derive(Debug)]
pub struct MemoryResultArchive {
    results: RwLock<BTreeMap<(String, String), ArchivedResult>>,
    available: AtomicBool,
}

impl Default for MemoryResultArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryResultArchive {
    pub fn new() -> Self {
        Self {
            results: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.results.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.read().is_empty()
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
impl ResultArchive for MemoryResultArchive {
    async fn record(&self, result: &ArchivedResult) -> Result<ArchivedResult, BackendError> {
        self.check()?;
        Ok(self
            .results
            .write()
            .entry((result.event_id.clone(), result.fight_id.clone()))
            .or_insert_with(|| result.clone())
            .clone())
    }

    async fn load_all(&self) -> Result<Vec<ArchivedResult>, BackendError> {
        self.check()?;
        Ok(self.results.read().values().cloned().collect())
    }
}

#[derive(Debug, Default)]
pub struct ResultBook {
    events: RwLock<HashMap<String, Arc<OutcomeSnapshot>>>,
}

impl ResultBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the final outcome of one fight. A fight is published once.
    pub fn publish(
        &self,
        contest: &Contest,
        outcome: ContestOutcome,
        at: DateTime<Utc>,
    ) -> PickResult<Arc<OutcomeSnapshot>> {
        validate_outcome(contest, &outcome)?;

        let mut events = self.events.write();
        let current = events
            .get(&contest.event_id)
            .cloned()
            .unwrap_or_else(|| Arc::new(OutcomeSnapshot::new(&contest.event_id)));

        if current.outcomes.contains_key(&contest.id) {
            return Err(PickError::OutcomeAlreadyPublished {
                contest_id: contest.id.clone(),
            });
        }

        let mut next = (*current).clone();
        next.outcomes.insert(contest.id.clone(), outcome.clone());
        next.taken_at = Some(at);
        let next = Arc::new(next);
        events.insert(contest.event_id.clone(), next.clone());

        info!(
            "Result published: event={}, fight={}, outcome={:?} ({} results)",
            contest.event_id,
            contest.id,
            outcome,
            next.len()
        );
        Ok(next)
    }

    /// The current result set for an event (empty when nothing is published).
    pub fn snapshot(&self, event_id: &str) -> Arc<OutcomeSnapshot> {
        self.events
            .read()
            .get(event_id)
            .cloned()
            .unwrap_or_else(|| Arc::new(OutcomeSnapshot::new(event_id)))
    }

    /// Load archived results without re-validating them. Fights already in
    /// the book keep their outcome. Returns how many were added.
    pub fn restore(&self, results: impl IntoIterator<Item = ArchivedResult>) -> usize {
        let mut staged: HashMap<String, OutcomeSnapshot> = HashMap::new();
        let mut events = self.events.write();

        let mut added = 0;
        for result in results {
            let snapshot = staged.entry(result.event_id.clone()).or_insert_with(|| {
                events
                    .get(&result.event_id)
                    .map(|s| (**s).clone())
                    .unwrap_or_else(|| OutcomeSnapshot::new(&result.event_id))
            });
            if snapshot.outcomes.contains_key(&result.fight_id) {
                continue;
            }
            snapshot.outcomes.insert(result.fight_id, result.outcome);
            snapshot.taken_at = snapshot.taken_at.max(Some(result.published_at));
            added += 1;
        }

        for (event_id, snapshot) in staged {
            debug!("Restored {} results for event {}", snapshot.len(), event_id);
            events.insert(event_id, Arc::new(snapshot));
        }
        added
    }

    pub fn is_published(&self, event_id: &str, contest_id: &str) -> bool {
        self.events
            .read()
            .get(event_id)
            .map(|s| s.outcomes.contains_key(contest_id))
            .unwrap_or(false)
    }
}
