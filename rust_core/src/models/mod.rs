// Shared models for the Punch Picks services
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod wire;

pub use wire::{LeaderboardResponse, PickRecord, PicksPayload, ResultPublished};

/// Fights with `order <= MAIN_CARD_MAX_ORDER` (or flagged as the main event)
/// belong to the main card.
pub const MAIN_CARD_MAX_ORDER: u32 = 5;

// ============================================================================
// Catalog: events, fights, fighters
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub date: NaiveDate,
    pub location: String,
    /// Picks are immutable at and after this instant
    pub lock_at: DateTime<Utc>,
    /// The event is concluded after this instant
    pub end_at: DateTime<Utc>,
}

impl Event {
    /// `lock_at < end_at`
    pub fn has_valid_window(&self) -> bool {
        self.lock_at < self.end_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contestant {
    pub id: String,
    pub name: String,
}

impl Contestant {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardSection {
    Main,
    Prelim,
}

/// A single matchup on an event's card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contest {
    pub id: String,
    pub event_id: String,
    pub weight_class: String,
    pub fighter1: Contestant,
    pub fighter2: Contestant,
    pub order: u32,
    pub is_main_event: bool,
}

impl Contest {
    pub fn has_contestant(&self, contestant_id: &str) -> bool {
        self.fighter1.id == contestant_id || self.fighter2.id == contestant_id
    }

    pub fn section(&self, main_card_max_order: u32) -> CardSection {
        if self.is_main_event || self.order <= main_card_max_order {
            CardSection::Main
        } else {
            CardSection::Prelim
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FightCard {
    pub title: String,
    pub contests: Vec<Contest>,
}

impl FightCard {
    pub fn len(&self) -> usize {
        self.contests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contests.is_empty()
    }
}

/// Split an event's fights into the main card and the (optional) prelims.
///
/// Both cards are sorted by `order`. When nothing qualifies for the main
/// card, every fight is shown as the main card and there are no prelims.
pub fn split_card(contests: &[Contest], main_card_max_order: u32) -> (FightCard, Option<FightCard>) {
    let mut sorted = contests.to_vec();
    sorted.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));

    let (main, prelims): (Vec<Contest>, Vec<Contest>) = sorted
        .into_iter()
        .partition(|c| c.section(main_card_max_order) == CardSection::Main);

    if main.is_empty() {
        return (
            FightCard {
                title: "Main Card".to_string(),
                contests: prelims,
            },
            None,
        );
    }

    let prelim_card = if prelims.is_empty() {
        None
    } else {
        Some(FightCard {
            title: "Preliminary Card".to_string(),
            contests: prelims,
        })
    };

    (
        FightCard {
            title: "Main Card".to_string(),
            contests: main,
        },
        prelim_card,
    )
}

// ============================================================================
// Picks
// ============================================================================

/// A user's prediction for one fight.
///
/// Both fields are optional; a pick is complete only when both are present.
/// A method without a fighter is never valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pick {
    pub fighter_id: Option<String>,
    pub method: Option<String>,
}

impl Pick {
    pub fn fighter(fighter_id: &str) -> Self {
        Self {
            fighter_id: Some(fighter_id.to_string()),
            method: None,
        }
    }

    pub fn complete(fighter_id: &str, method: &str) -> Self {
        Self {
            fighter_id: Some(fighter_id.to_string()),
            method: Some(method.to_string()),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.fighter_id.is_some() && self.method.is_some()
    }

    /// A method with no fighter selected must never be persisted.
    pub fn is_valid(&self) -> bool {
        !(self.fighter_id.is_none() && self.method.is_some())
    }

    /// Empty strings are treated as "not chosen".
    pub fn normalized(self) -> Self {
        fn non_empty(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        Self {
            fighter_id: non_empty(self.fighter_id),
            method: non_empty(self.method),
        }
    }
}

/// Every pick a user holds for one event, keyed by fight id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEventPicks {
    pub user_id: String,
    pub event_id: String,
    pub picks: BTreeMap<String, Pick>,
    /// Last write per fight. Fights missing here were last written at
    /// `updated_at`.
    #[serde(default)]
    pub entry_times: BTreeMap<String, DateTime<Utc>>,
    /// Last write to this record
    pub updated_at: DateTime<Utc>,
    pub submitted: bool,
}

impl UserEventPicks {
    pub fn empty(user_id: &str, event_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            event_id: event_id.to_string(),
            picks: BTreeMap::new(),
            entry_times: BTreeMap::new(),
            updated_at: now,
            submitted: false,
        }
    }

    /// Write one fight's pick at `at`.
    pub fn set_pick(&mut self, contest_id: &str, pick: Pick, at: DateTime<Utc>) {
        self.picks.insert(contest_id.to_string(), pick);
        self.entry_times.insert(contest_id.to_string(), at);
        self.updated_at = at;
    }

    /// When a fight's pick was last written.
    pub fn entry_time(&self, contest_id: &str) -> DateTime<Utc> {
        self.entry_times
            .get(contest_id)
            .copied()
            .unwrap_or(self.updated_at)
    }

    pub fn pick(&self, contest_id: &str) -> Option<&Pick> {
        self.picks.get(contest_id)
    }

    /// Number of complete picks among the given fights.
    pub fn completed_among<'a>(&self, contest_ids: impl IntoIterator<Item = &'a str>) -> usize {
        contest_ids
            .into_iter()
            .filter(|id| self.picks.get(*id).map(Pick::is_complete).unwrap_or(false))
            .count()
    }
}

/// Storage key used by the local fallback cache.
pub fn storage_key(user_id: &str, event_id: &str) -> String {
    format!("userPicks_{}_{}", user_id, event_id)
}

// ============================================================================
// Results & leaderboard
// ============================================================================

/// Final result of a fight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ContestOutcome {
    Winner { fighter_id: String, method: String },
    /// No contest / void: excluded from everyone's totals
    NoContest,
}

impl ContestOutcome {
    pub fn winner(fighter_id: &str, method: &str) -> Self {
        ContestOutcome::Winner {
            fighter_id: fighter_id.to_string(),
            method: method.to_string(),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, ContestOutcome::NoContest)
    }
}

/// Derived per-user standing for one event. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: String,
    pub username: String,
    pub total_picks: u32,
    pub correct_picks: u32,
    pub accuracy_percentage: f64,
    /// Picks whose method also matched (informational)
    #[serde(default)]
    pub method_correct: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contest(id: &str, order: u32, main_event: bool) -> Contest {
        Contest {
            id: id.to_string(),
            event_id: "ufc-300".to_string(),
            weight_class: "Lightweight".to_string(),
            fighter1: Contestant::new(&format!("{}-red", id), "Red"),
            fighter2: Contestant::new(&format!("{}-blue", id), "Blue"),
            order,
            is_main_event: main_event,
        }
    }

    #[test]
    fn test_split_card_by_order_and_headline() {
        let contests = vec![
            contest("f7", 7, false),
            contest("f1", 1, true),
            contest("f5", 5, false),
            contest("f9", 9, true),
            contest("f6", 6, false),
        ];
        let (main, prelims) = split_card(&contests, MAIN_CARD_MAX_ORDER);
        let main_ids: Vec<_> = main.contests.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(main_ids, vec!["f1", "f5", "f9"]);

        let prelims = prelims.unwrap();
        let prelim_ids: Vec<_> = prelims.contests.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(prelim_ids, vec!["f6", "f7"]);
    }

    #[test]
    fn test_split_card_without_main_fights() {
        let contests = vec![contest("f8", 8, false), contest("f6", 6, false)];
        let (main, prelims) = split_card(&contests, MAIN_CARD_MAX_ORDER);
        assert_eq!(main.len(), 2);
        assert_eq!(main.contests[0].id, "f6");
        assert!(prelims.is_none());
    }

    #[test]
    fn test_pick_validity() {
        assert!(Pick::default().is_valid());
        assert!(Pick::fighter("a").is_valid());
        assert!(!Pick::fighter("a").is_complete());
        assert!(Pick::complete("a", "KO").is_complete());

        let orphan = Pick {
            fighter_id: None,
            method: Some("KO".to_string()),
        };
        assert!(!orphan.is_valid());
    }

    #[test]
    fn test_pick_normalized_drops_empty_method() {
        let pick = Pick {
            fighter_id: Some("a".to_string()),
            method: Some("".to_string()),
        }
        .normalized();
        assert_eq!(pick, Pick::fighter("a"));
    }

    #[test]
    fn test_completed_among_ignores_other_fights() {
        let mut record = UserEventPicks::empty("u1", "ufc-300", Utc::now());
        record.picks.insert("f1".to_string(), Pick::complete("f1-red", "KO"));
        record.picks.insert("f2".to_string(), Pick::fighter("f2-red"));
        record.picks.insert("stray".to_string(), Pick::complete("x", "SUB"));

        assert_eq!(record.completed_among(["f1", "f2", "f3"]), 1);
    }

    #[test]
    fn test_entry_time_falls_back_to_record_time() {
        let t0 = Utc::now();
        let mut record = UserEventPicks::empty("u1", "ufc-300", t0);
        record.picks.insert("legacy".to_string(), Pick::fighter("a"));
        record.set_pick("f1", Pick::fighter("b"), t0 + chrono::Duration::minutes(1));
        record.set_pick("f2", Pick::fighter("c"), t0 + chrono::Duration::minutes(2));

        assert_eq!(record.entry_time("f1"), t0 + chrono::Duration::minutes(1));
        assert_eq!(record.entry_time("legacy"), record.updated_at);
        assert_eq!(record.updated_at, t0 + chrono::Duration::minutes(2));
    }

    #[test]
    fn test_storage_key() {
        assert_eq!(storage_key("42", "ufc-300"), "userPicks_42_ufc-300");
    }
}
