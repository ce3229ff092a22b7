//! Pick lifecycle engine
//!
//! A `PickSession` is the explicit, caller-owned draft for one (user, event).
//! Every edit goes through `transition`, a pure function of the window status,
//! the fight and the current pick:
//!
//! | state    | action            | current pick        | result                 |
//! |----------|-------------------|---------------------|------------------------|
//! | Locked   | any               | any                 | `Err(Locked)`          |
//! | Open     | select contestant | same contestant     | `Unchanged`            |
//! | Open     | select contestant | none / other        | set, method cleared    |
//! | Open     | select method     | no contestant       | `Ignored`              |
//! | Open     | select method     | same method         | `Unchanged`            |
//! | Open     | select method     | contestant chosen   | set                    |
//!
//! `PickEngine` wires sessions to the catalog, the clock and the pick store.

use crate::catalog::{Catalog, CatalogError, Identity};
use crate::error::{PickError, PickResult};
use crate::lock_watch::{LockWatcher, DEFAULT_LOCK_POLL_INTERVAL};
use crate::models::{split_card, Contest, Event, FightCard, Pick, UserEventPicks, MAIN_CARD_MAX_ORDER};
use crate::store::PickStore;
use crate::window::{self, Clock, TimeUntilLock, WindowStatus};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action<'a> {
    SelectContestant(&'a str),
    SelectMethod(&'a str),
}

/// What `transition` decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Set(Pick),
    Unchanged,
    /// Silently rejected (method before contestant)
    Ignored,
}

/// What an edit did to the draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Updated,
    Unchanged,
    Ignored,
}

/// Pure transition for one fight's pick.
pub fn transition(
    status: WindowStatus,
    contest: &Contest,
    current: Option<&Pick>,
    action: Action<'_>,
) -> PickResult<Step> {
    if status == WindowStatus::Locked {
        return Err(PickError::Locked {
            event_id: contest.event_id.clone(),
        });
    }

    let current_fighter = current.and_then(|p| p.fighter_id.as_deref());

    match action {
        Action::SelectContestant(contestant_id) => {
            if !contest.has_contestant(contestant_id) {
                return Err(PickError::invalid_selection(
                    &contest.id,
                    format!("fighter {} is not in this fight", contestant_id),
                ));
            }
            if current_fighter == Some(contestant_id) {
                Ok(Step::Unchanged)
            } else {
                Ok(Step::Set(Pick::fighter(contestant_id)))
            }
        }
        Action::SelectMethod(method) => {
            let method = method.trim();
            let fighter = match current_fighter {
                Some(f) if !method.is_empty() => f,
                _ => return Ok(Step::Ignored),
            };
            if current.and_then(|p| p.method.as_deref()) == Some(method) {
                Ok(Step::Unchanged)
            } else {
                Ok(Step::Set(Pick::complete(fighter, method)))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub completed: usize,
    pub required: usize,
}

impl Completion {
    pub fn is_complete(&self) -> bool {
        self.completed == self.required
    }
}

/// One user's editing session for one event.
#[derive(Debug, Clone)]
pub struct PickSession {
    pub id: Uuid,
    pub identity: Identity,
    pub event: Event,
    pub main_card: FightCard,
    pub prelims: Option<FightCard>,
    draft: UserEventPicks,
    status: WindowStatus,
    has_existing_picks: bool,
}

impl PickSession {
    pub fn new(
        identity: Identity,
        event: Event,
        contests: &[Contest],
        existing: Option<UserEventPicks>,
        now: DateTime<Utc>,
        main_card_max_order: u32,
    ) -> Self {
        let (main_card, prelims) = split_card(contests, main_card_max_order);
        let has_existing_picks = existing.as_ref().map(|r| !r.picks.is_empty()).unwrap_or(false);
        let draft = existing
            .unwrap_or_else(|| UserEventPicks::empty(&identity.user_id, &event.id, now));
        let status = WindowStatus::evaluate(&event, now);

        Self {
            id: Uuid::new_v4(),
            identity,
            event,
            main_card,
            prelims,
            draft,
            status,
            has_existing_picks,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    pub fn draft(&self) -> &UserEventPicks {
        &self.draft
    }

    pub fn status(&self) -> WindowStatus {
        self.status
    }

    pub fn is_locked(&self) -> bool {
        self.status == WindowStatus::Locked
    }

    /// Re-evaluate the window. Never unlocks.
    pub fn observe(&mut self, now: DateTime<Utc>) -> WindowStatus {
        self.observe_window(WindowStatus::evaluate(&self.event, now))
    }

    /// Fold in a status published by a `LockWatcher`.
    pub fn observe_window(&mut self, observed: WindowStatus) -> WindowStatus {
        let next = self.status.tighten(observed);
        if next != self.status {
            info!(
                "Session {} locked for event {}",
                self.id, self.event.id
            );
        }
        self.status = next;
        next
    }

    /// Every fight on the card, main card first.
    pub fn contests(&self) -> impl Iterator<Item = &Contest> {
        self.main_card
            .contests
            .iter()
            .chain(self.prelims.iter().flat_map(|p| p.contests.iter()))
    }

    pub fn contest(&self, contest_id: &str) -> Option<&Contest> {
        self.contests().find(|c| c.id == contest_id)
    }

    pub fn completion(&self) -> Completion {
        let required = self.main_card.len() + self.prelims.as_ref().map(FightCard::len).unwrap_or(0);
        let completed = self
            .draft
            .completed_among(self.contests().map(|c| c.id.as_str()));
        Completion { completed, required }
    }

    pub fn can_submit(&self) -> bool {
        !self.is_locked() && self.completion().is_complete()
    }

    /// True when the user already has stored picks ("Update" rather than "Submit").
    pub fn has_existing_picks(&self) -> bool {
        self.has_existing_picks
    }

    pub fn time_until_lock(&self, now: DateTime<Utc>) -> TimeUntilLock {
        if self.is_locked() {
            return TimeUntilLock::Locked;
        }
        window::time_until_lock(&self.event, now)
    }

    /// Decide an edit without applying it.
    pub fn plan(&self, contest_id: &str, action: Action<'_>) -> PickResult<Step> {
        let contest = self.contest(contest_id).ok_or_else(|| PickError::UnknownContest {
            event_id: self.event.id.clone(),
            contest_id: contest_id.to_string(),
        })?;
        transition(self.status, contest, self.draft.pick(contest_id), action)
    }

    fn apply(&mut self, contest_id: &str, step: Step, now: DateTime<Utc>) -> Transition {
        match step {
            Step::Set(pick) => {
                self.draft.set_pick(contest_id, pick, now);
                Transition::Updated
            }
            Step::Unchanged => Transition::Unchanged,
            Step::Ignored => Transition::Ignored,
        }
    }

    /// Edit the draft in memory only.
    pub fn select_contestant(
        &mut self,
        contest_id: &str,
        contestant_id: &str,
        now: DateTime<Utc>,
    ) -> PickResult<Transition> {
        self.observe(now);
        let step = self.plan(contest_id, Action::SelectContestant(contestant_id))?;
        Ok(self.apply(contest_id, step, now))
    }

    /// Edit the draft in memory only.
    pub fn select_method(
        &mut self,
        contest_id: &str,
        method: &str,
        now: DateTime<Utc>,
    ) -> PickResult<Transition> {
        self.observe(now);
        let step = self.plan(contest_id, Action::SelectMethod(method))?;
        Ok(self.apply(contest_id, step, now))
    }

    /// Picks for fights on this card only.
    fn card_picks(&self) -> BTreeMap<String, Pick> {
        self.contests()
            .filter_map(|c| self.draft.pick(&c.id).map(|p| (c.id.clone(), p.clone())))
            .collect()
    }

    fn mark_submitted(&mut self, record: UserEventPicks) {
        self.draft = record;
        self.has_existing_picks = true;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub main_card_max_order: u32,
    pub lock_poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            main_card_max_order: MAIN_CARD_MAX_ORDER,
            lock_poll_interval: DEFAULT_LOCK_POLL_INTERVAL,
        }
    }
}

fn cannot_load(event_id: &str, e: CatalogError) -> PickError {
    warn!("Cannot load event {}: {}", event_id, e);
    PickError::CatalogUnavailable {
        event_id: event_id.to_string(),
        reason: e.to_string(),
    }
}

pub struct PickEngine {
    catalog: Arc<dyn Catalog>,
    store: Arc<PickStore>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl PickEngine {
    pub fn new(catalog: Arc<dyn Catalog>, store: Arc<PickStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_config(catalog, store, clock, EngineConfig::default())
    }

    pub fn with_config(
        catalog: Arc<dyn Catalog>,
        store: Arc<PickStore>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            store,
            clock,
            config,
        }
    }

    pub fn store(&self) -> &Arc<PickStore> {
        &self.store
    }

    pub async fn list_events(&self) -> PickResult<Vec<Event>> {
        self.catalog
            .list_events()
            .await
            .map_err(|e| cannot_load("*", e))
    }

    /// Load the event, its card and the user's stored picks into a session.
    pub async fn open_session(&self, identity: &Identity, event_id: &str) -> PickResult<PickSession> {
        if !identity.authenticated || identity.user_id.is_empty() {
            return Err(PickError::Unauthenticated);
        }

        let event = self
            .catalog
            .get_event(event_id)
            .await
            .map_err(|e| cannot_load(event_id, e))?;
        let contests: Vec<Contest> = self
            .catalog
            .list_contests(event_id)
            .await
            .map_err(|e| cannot_load(event_id, e))?
            .into_iter()
            .filter(|c| c.event_id == event.id)
            .collect();

        let existing = self.store.read(&identity.user_id, &event.id).await?;
        let session = PickSession::new(
            identity.clone(),
            event,
            &contests,
            existing,
            self.clock.now(),
            self.config.main_card_max_order,
        );

        debug!(
            "Opened session {}: user={}, event={}, fights={}, status={:?}",
            session.id,
            identity.user_id,
            session.event.id,
            session.completion().required,
            session.status()
        );
        Ok(session)
    }

    /// Stored picks for (user, event), or an empty draft.
    pub async fn get_draft(&self, user_id: &str, event_id: &str) -> PickResult<UserEventPicks> {
        Ok(self
            .store
            .read(user_id, event_id)
            .await?
            .unwrap_or_else(|| UserEventPicks::empty(user_id, event_id, self.clock.now())))
    }

    /// Spawn the periodic lock re-check for a session's event.
    pub fn watch_lock(&self, session: &PickSession) -> LockWatcher {
        LockWatcher::spawn(
            session.event.clone(),
            self.clock.clone(),
            self.config.lock_poll_interval,
        )
    }

    async fn edit(
        &self,
        session: &mut PickSession,
        contest_id: &str,
        action: Action<'_>,
    ) -> PickResult<Transition> {
        let now = self.clock.now();
        session.observe(now);
        let step = session.plan(contest_id, action)?;

        if let Step::Set(pick) = &step {
            // plan() already resolved the contest
            let contest = session
                .contest(contest_id)
                .cloned()
                .ok_or_else(|| PickError::UnknownContest {
                    event_id: session.event.id.clone(),
                    contest_id: contest_id.to_string(),
                })?;
            self.store
                .upsert(session.user_id(), &session.event.id, &contest, pick.clone())
                .await?;
        }

        Ok(session.apply(contest_id, step, now))
    }

    pub async fn select_contestant(
        &self,
        session: &mut PickSession,
        contest_id: &str,
        contestant_id: &str,
    ) -> PickResult<Transition> {
        self.edit(session, contest_id, Action::SelectContestant(contestant_id))
            .await
    }

    pub async fn select_method(
        &self,
        session: &mut PickSession,
        contest_id: &str,
        method: &str,
    ) -> PickResult<Transition> {
        self.edit(session, contest_id, Action::SelectMethod(method))
            .await
    }

    /// Submit (or resubmit) the whole card.
    pub async fn submit(&self, session: &mut PickSession) -> PickResult<UserEventPicks> {
        session.observe(self.clock.now());
        if session.is_locked() {
            return Err(PickError::Locked {
                event_id: session.event.id.clone(),
            });
        }

        let completion = session.completion();
        if !completion.is_complete() {
            return Err(PickError::Incomplete {
                completed: completion.completed,
                required: completion.required,
            });
        }

        let contests: Vec<Contest> = session.contests().cloned().collect();
        let stored = self
            .store
            .submit(session.user_id(), &session.event.id, &contests, session.card_picks())
            .await?;

        if stored.is_pending() {
            warn!(
                "Submission for user={}, event={} accepted locally, pending sync",
                session.user_id(),
                session.event.id
            );
        }
        session.mark_submitted(stored.record.clone());
        Ok(stored.record)
    }
}
