//! Result reducer and leaderboard ranking.
//!
//! Every complete pick on the event's card counts toward the total, except
//! picks on void fights. Picks on fights without a result yet count as not
//! correct (so far).
//! Ranking: accuracy desc, correct picks desc, user id asc; entries with the
//! same (accuracy, correct) share a rank and the next distinct entry resumes
//! at its position (1, 1, 3).

use crate::models::{Contest, ContestOutcome, LeaderboardEntry, LeaderboardResponse, UserEventPicks};
use crate::results::OutcomeSnapshot;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// A pick is correct when the winner matches; the method is informational
    #[default]
    WinnerOnly,
    /// Winner and method must both match
    ExactMethod,
}

impl FromStr for ScoringMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "winner" | "winner_only" => Ok(ScoringMode::WinnerOnly),
            "exact_method" | "exact" => Ok(ScoringMode::ExactMethod),
            other => Err(format!("unknown scoring mode '{}'", other)),
        }
    }
}

impl fmt::Display for ScoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringMode::WinnerOnly => write!(f, "winner"),
            ScoringMode::ExactMethod => write!(f, "exact_method"),
        }
    }
}

/// One user's totals before ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Score {
    pub total_picks: u32,
    pub correct_picks: u32,
    pub method_correct: u32,
}

impl Score {
    /// `correct / total * 100`, zero when nothing counted.
    pub fn accuracy(&self) -> f64 {
        if self.total_picks == 0 {
            0.0
        } else {
            self.correct_picks as f64 / self.total_picks as f64 * 100.0
        }
    }
}

fn same_method(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LeaderboardEngine {
    pub mode: ScoringMode,
}

impl LeaderboardEngine {
    pub fn new(mode: ScoringMode) -> Self {
        Self { mode }
    }

    pub fn score(&self, record: &UserEventPicks, card: &[Contest], outcomes: &OutcomeSnapshot) -> Score {
        let mut score = Score::default();

        for contest in card {
            let Some(pick) = record.pick(&contest.id) else {
                continue;
            };
            let (Some(fighter_id), Some(method)) = (&pick.fighter_id, &pick.method) else {
                continue;
            };
            let outcome = outcomes.get(&contest.id);
            if matches!(outcome, Some(ContestOutcome::NoContest)) {
                continue;
            }

            score.total_picks += 1;
            let Some(ContestOutcome::Winner {
                fighter_id: winner,
                method: actual_method,
            }) = outcome
            else {
                continue;
            };

            let winner_hit = fighter_id == winner;
            let method_hit = winner_hit && same_method(method, actual_method);
            if method_hit {
                score.method_correct += 1;
            }
            let correct = match self.mode {
                ScoringMode::WinnerOnly => winner_hit,
                ScoringMode::ExactMethod => method_hit,
            };
            if correct {
                score.correct_picks += 1;
            }
        }

        score
    }

    /// Ranked standings for one event, computed against a single snapshot.
    pub fn compute(
        &self,
        event_id: &str,
        card: &[Contest],
        outcomes: &OutcomeSnapshot,
        all_picks: &[UserEventPicks],
        usernames: &HashMap<String, String>,
    ) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = all_picks
            .par_iter()
            .filter(|r| r.event_id == event_id)
            .map(|record| {
                let score = self.score(record, card, outcomes);
                LeaderboardEntry {
                    rank: 0,
                    user_id: record.user_id.clone(),
                    username: usernames
                        .get(&record.user_id)
                        .cloned()
                        .unwrap_or_else(|| record.user_id.clone()),
                    total_picks: score.total_picks,
                    correct_picks: score.correct_picks,
                    accuracy_percentage: score.accuracy(),
                    method_correct: score.method_correct,
                }
            })
            .collect();

        entries.sort_by(compare_entries);
        assign_ranks(&mut entries);

        debug!(
            "Leaderboard for event {}: {} entrants, {} results, mode={}",
            event_id,
            entries.len(),
            outcomes.len(),
            self.mode
        );
        entries
    }

    pub fn response(
        &self,
        event_id: &str,
        card: &[Contest],
        outcomes: &OutcomeSnapshot,
        all_picks: &[UserEventPicks],
        usernames: &HashMap<String, String>,
    ) -> LeaderboardResponse {
        LeaderboardResponse {
            event_id: event_id.to_string(),
            leaderboard: self.compute(event_id, card, outcomes, all_picks, usernames),
        }
    }
}

fn compare_entries(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.accuracy_percentage
        .total_cmp(&a.accuracy_percentage)
        .then_with(|| b.correct_picks.cmp(&a.correct_picks))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

fn ties(a: &LeaderboardEntry, b: &LeaderboardEntry) -> bool {
    a.accuracy_percentage == b.accuracy_percentage && a.correct_picks == b.correct_picks
}

/// Standard competition ranking over already-sorted entries.
fn assign_ranks(entries: &mut [LeaderboardEntry]) {
    for i in 0..entries.len() {
        entries[i].rank = if i > 0 && ties(&entries[i - 1], &entries[i]) {
            entries[i - 1].rank
        } else {
            i as u32 + 1
        };
    }
}

/// A single entrant's accuracy, if they are on the board.
pub fn accuracy_for(entries: &[LeaderboardEntry], user_id: &str) -> Option<f64> {
    entries
        .iter()
        .find(|e| e.user_id == user_id)
        .map(|e| e.accuracy_percentage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contestant, Pick};
    use chrono::Utc;

    /// f1..f5 have results (f5 void), f6 is still to be fought.
    fn card() -> Vec<Contest> {
        (1..=6)
            .map(|order| {
                let id = format!("f{}", order);
                Contest {
                    id: id.clone(),
                    event_id: "ufc-300".to_string(),
                    weight_class: "Welterweight".to_string(),
                    fighter1: Contestant::new(&format!("{}-red", id), "Red"),
                    fighter2: Contestant::new(&format!("{}-blue", id), "Blue"),
                    order,
                    is_main_event: order == 1,
                }
            })
            .collect()
    }

    fn snapshot() -> OutcomeSnapshot {
        OutcomeSnapshot::new("ufc-300")
            .with_outcome("f1", ContestOutcome::winner("f1-red", "KO"))
            .with_outcome("f2", ContestOutcome::winner("f2-red", "SUB"))
            .with_outcome("f3", ContestOutcome::winner("f3-red", "DEC"))
            .with_outcome("f4", ContestOutcome::winner("f4-red", "KO"))
            .with_outcome("f5", ContestOutcome::NoContest)
    }

    /// `correct` red-corner picks followed by blue-corner picks, four fights.
    fn record(user_id: &str, correct: usize) -> UserEventPicks {
        let mut record = UserEventPicks::empty(user_id, "ufc-300", Utc::now());
        for (i, id) in ["f1", "f2", "f3", "f4"].iter().enumerate() {
            let corner = if i < correct { "red" } else { "blue" };
            record
                .picks
                .insert(id.to_string(), Pick::complete(&format!("{}-{}", id, corner), "KO"));
        }
        record
    }

    #[test]
    fn test_tied_users_share_rank_and_order_by_id() {
        let picks = vec![record("c", 2), record("b", 3), record("a", 3)];
        let board = LeaderboardEngine::default().compute("ufc-300", &card(), &snapshot(), &picks, &HashMap::new());

        let summary: Vec<_> = board.iter().map(|e| (e.user_id.as_str(), e.rank)).collect();
        assert_eq!(summary, vec![("a", 1), ("b", 1), ("c", 3)]);
        assert_eq!(board[0].accuracy_percentage, 75.0);
        assert_eq!(board[2].accuracy_percentage, 50.0);
    }

    #[test]
    fn test_zero_total_is_zero_accuracy() {
        let empty = UserEventPicks::empty("z", "ufc-300", Utc::now());
        let board = LeaderboardEngine::default().compute("ufc-300", &card(), &snapshot(), &[empty], &HashMap::new());
        assert_eq!(board[0].total_picks, 0);
        assert_eq!(board[0].accuracy_percentage, 0.0);
        assert!(!board[0].accuracy_percentage.is_nan());
    }

    #[test]
    fn test_void_incomplete_and_stray_picks_do_not_count() {
        let mut r = UserEventPicks::empty("u", "ufc-300", Utc::now());
        r.picks.insert("f1".into(), Pick::complete("f1-red", "KO"));
        r.picks.insert("f2".into(), Pick::fighter("f2-red"));
        r.picks.insert("f5".into(), Pick::complete("f5-red", "KO"));
        r.picks.insert("f42".into(), Pick::complete("f42-red", "KO"));

        let score = LeaderboardEngine::default().score(&r, &card(), &snapshot());
        assert_eq!(score.total_picks, 1);
        assert_eq!(score.correct_picks, 1);
    }

    #[test]
    fn test_undecided_fights_count_toward_total() {
        let mut r = UserEventPicks::empty("u", "ufc-300", Utc::now());
        r.picks.insert("f1".into(), Pick::complete("f1-red", "KO"));
        r.picks.insert("f6".into(), Pick::complete("f6-red", "KO"));

        let score = LeaderboardEngine::default().score(&r, &card(), &snapshot());
        assert_eq!((score.total_picks, score.correct_picks), (2, 1));
        assert_eq!(score.accuracy(), 50.0);
    }

    #[test]
    fn test_exact_method_mode() {
        let mut r = UserEventPicks::empty("u", "ufc-300", Utc::now());
        r.picks.insert("f1".into(), Pick::complete("f1-red", "ko"));
        r.picks.insert("f2".into(), Pick::complete("f2-red", "KO"));

        let winner = LeaderboardEngine::new(ScoringMode::WinnerOnly).score(&r, &card(), &snapshot());
        assert_eq!((winner.correct_picks, winner.method_correct), (2, 1));

        let exact = LeaderboardEngine::new(ScoringMode::ExactMethod).score(&r, &card(), &snapshot());
        assert_eq!(exact.correct_picks, 1);
        assert_eq!(exact.accuracy(), 50.0);
    }

    #[test]
    fn test_usernames_fall_back_to_user_id() {
        let names = HashMap::from([("a".to_string(), "Alice".to_string())]);
        let picks = vec![record("a", 4), record("b", 0)];
        let board = LeaderboardEngine::default().compute("ufc-300", &card(), &snapshot(), &picks, &names);
        assert_eq!(board[0].username, "Alice");
        assert_eq!(board[1].username, "b");
        assert_eq!(accuracy_for(&board, "a"), Some(100.0));
        assert_eq!(accuracy_for(&board, "nobody"), None);
    }

    #[test]
    fn test_scoring_mode_parse() {
        assert_eq!("winner".parse::<ScoringMode>().unwrap(), ScoringMode::WinnerOnly);
        assert_eq!("EXACT_METHOD".parse::<ScoringMode>().unwrap(), ScoringMode::ExactMethod);
        assert!("points".parse::<ScoringMode>().is_err());
    }
}
