//! Picks service: turns published fight results into leaderboards.
//!
//! Listens on `results:published`, archives each outcome, records it in the
//! results book, recomputes the event's standings from one outcome snapshot
//! and publishes them on `leaderboard:{event_id}`.

use anyhow::{bail, Context, Result};
use futures_util::StreamExt;
use punch_picks_core::models::ResultPublished;
use punch_picks_core::redis::{channels, RedisBus};
use punch_picks_core::results::validate_outcome;
use punch_picks_core::{
    ArchivedResult, Catalog, Clock, Contest, LeaderboardEngine, LeaderboardResponse,
    PgPickBackend, PickError, PickStore, ResultArchive, ResultBook,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub struct ResultsProcessor {
    catalog: Arc<dyn Catalog>,
    store: Arc<PickStore>,
    book: Arc<ResultBook>,
    archive: Arc<dyn ResultArchive>,
    scoring: LeaderboardEngine,
    clock: Arc<dyn Clock>,
    /// Username lookup; entries fall back to user ids without it
    names: Option<PgPickBackend>,
}

impl ResultsProcessor {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        store: Arc<PickStore>,
        book: Arc<ResultBook>,
        archive: Arc<dyn ResultArchive>,
        scoring: LeaderboardEngine,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            store,
            book,
            archive,
            scoring,
            clock,
            names: None,
        }
    }

    pub fn with_names(mut self, names: PgPickBackend) -> Self {
        self.names = Some(names);
        self
    }

    pub fn book(&self) -> &Arc<ResultBook> {
        &self.book
    }

    /// Load every archived result into the book.
    pub async fn restore(&self) -> Result<usize> {
        let archived = self
            .archive
            .load_all()
            .await
            .context("Failed to load archived results")?;
        let restored = self.book.restore(archived);
        info!("Restored {} archived results", restored);
        Ok(restored)
    }

    /// Record one result and recompute the event's leaderboard.
    ///
    /// A redelivered result keeps the outcome already on record; the
    /// standings are still recomputed so a board that failed to build the
    /// first time is not lost.
    pub async fn handle(&self, msg: ResultPublished) -> Result<LeaderboardResponse> {
        let contests = self.contests(&msg.event_id).await?;
        let Some(contest) = contests.iter().find(|c| c.id == msg.fight_id) else {
            bail!("fight {} is not part of event {}", msg.fight_id, msg.event_id);
        };

        if self.book.is_published(&msg.event_id, &msg.fight_id) {
            warn!(
                "Result for fight {} (event {}) already published, recomputing standings",
                msg.fight_id, msg.event_id
            );
        } else {
            validate_outcome(contest, &msg.outcome)?;
            let kept = self
                .archive
                .record(&ArchivedResult {
                    event_id: msg.event_id.clone(),
                    fight_id: msg.fight_id.clone(),
                    outcome: msg.outcome,
                    published_at: self.clock.now(),
                })
                .await
                .with_context(|| format!("Failed to archive result for fight {}", msg.fight_id))?;

            match self.book.publish(contest, kept.outcome, kept.published_at) {
                Ok(_) | Err(PickError::OutcomeAlreadyPublished { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.standings(&msg.event_id, &contests).await
    }

    /// Standings for an event against the current outcome snapshot.
    pub async fn leaderboard(&self, event_id: &str) -> Result<LeaderboardResponse> {
        let contests = self.contests(event_id).await?;
        self.standings(event_id, &contests).await
    }

    async fn contests(&self, event_id: &str) -> Result<Vec<Contest>> {
        let contests = self
            .catalog
            .list_contests(event_id)
            .await
            .with_context(|| format!("Failed to load fights for event {}", event_id))?;
        Ok(contests.into_iter().filter(|c| c.event_id == event_id).collect())
    }

    async fn standings(&self, event_id: &str, card: &[Contest]) -> Result<LeaderboardResponse> {
        let snapshot = self.book.snapshot(event_id);
        let picks = self
            .store
            .list_for_event(event_id)
            .await
            .with_context(|| format!("Failed to load picks for event {}", event_id))?;

        let usernames = match &self.names {
            Some(names) => {
                let user_ids: Vec<String> = picks.iter().map(|p| p.user_id.clone()).collect();
                names.display_names(&user_ids).await.unwrap_or_else(|e| {
                    warn!("Username lookup failed, using user ids: {}", e);
                    HashMap::new()
                })
            }
            None => HashMap::new(),
        };

        Ok(self
            .scoring
            .response(event_id, card, &snapshot, &picks, &usernames))
    }
}

pub fn parse_result(payload: &[u8]) -> Result<ResultPublished> {
    serde_json::from_slice(payload).context("Malformed results:published payload")
}

/// Listen for results until the process exits, reconnecting on failure.
pub async fn run_results_listener(bus: RedisBus, processor: Arc<ResultsProcessor>) {
    loop {
        match bus.subscribe(channels::RESULTS_PUBLISHED).await {
            Ok(mut pubsub) => {
                info!("Listening for results on {}", channels::RESULTS_PUBLISHED);
                let mut stream = pubsub.on_message();
                while let Some(msg) = stream.next().await {
                    let payload: Vec<u8> = match msg.get_payload() {
                        Ok(p) => p,
                        Err(e) => {
                            warn!("Unreadable result message: {}", e);
                            continue;
                        }
                    };
                    let result = match parse_result(&payload) {
                        Ok(r) => r,
                        Err(e) => {
                            warn!("{:#}", e);
                            continue;
                        }
                    };

                    let event_id = result.event_id.clone();
                    match processor.handle(result).await {
                        Ok(board) => {
                            let channel = channels::leaderboard(&event_id);
                            if let Err(e) = bus.publish(&channel, &board).await {
                                error!("Failed to publish leaderboard for {}: {:#}", event_id, e);
                            } else {
                                debug!(
                                    "Leaderboard for {} published ({} entrants)",
                                    event_id,
                                    board.leaderboard.len()
                                );
                            }
                        }
                        Err(e) => error!("Failed to process result for {}: {:#}", event_id, e),
                    }
                }
                warn!("Results subscription ended, reconnecting");
            }
            Err(e) => error!("Failed to subscribe to {}: {:#}", channels::RESULTS_PUBLISHED, e),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}
