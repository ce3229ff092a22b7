//! Wire shapes shared with the REST backend and the message bus.
//!
//! The backend has returned picks both as a list of records and as a map
//! keyed by fight id. `PicksPayload` accepts either and normalizes into the
//! canonical `BTreeMap<fight_id, Pick>` so only one shape exists past
//! ingestion.

use super::{ContestOutcome, LeaderboardEntry, Pick};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted form of one pick: `{fight_id, fighter_id, method}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickRecord {
    pub fight_id: String,
    pub fighter_id: String,
    #[serde(default)]
    pub method: String,
}

/// Map-shaped pick value (fight id is the key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedPick {
    #[serde(default)]
    pub fighter_id: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PicksPayload {
    List(Vec<PickRecord>),
    Map(BTreeMap<String, KeyedPick>),
}

impl Default for PicksPayload {
    fn default() -> Self {
        PicksPayload::List(Vec::new())
    }
}

impl PicksPayload {
    /// Normalize into the canonical map. Entries with neither a fighter nor a
    /// method are dropped; a method without a fighter is dropped as well
    /// since it can never be persisted.
    pub fn into_picks(self) -> BTreeMap<String, Pick> {
        let entries: Vec<(String, Pick)> = match self {
            PicksPayload::List(records) => records
                .into_iter()
                .map(|r| {
                    (
                        r.fight_id,
                        Pick {
                            fighter_id: Some(r.fighter_id),
                            method: Some(r.method),
                        },
                    )
                })
                .collect(),
            PicksPayload::Map(map) => map
                .into_iter()
                .map(|(fight_id, p)| {
                    (
                        fight_id,
                        Pick {
                            fighter_id: p.fighter_id,
                            method: p.method,
                        },
                    )
                })
                .collect(),
        };

        entries
            .into_iter()
            .map(|(fight_id, pick)| (fight_id, pick.normalized()))
            .filter(|(_, pick)| pick.fighter_id.is_some() && pick.is_valid())
            .collect()
    }

    /// Canonical list form. Picks without a fighter are not representable.
    pub fn from_picks(picks: &BTreeMap<String, Pick>) -> Self {
        PicksPayload::List(
            picks
                .iter()
                .filter_map(|(fight_id, pick)| {
                    pick.fighter_id.as_ref().map(|fighter_id| PickRecord {
                        fight_id: fight_id.clone(),
                        fighter_id: fighter_id.clone(),
                        method: pick.method.clone().unwrap_or_default(),
                    })
                })
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    pub event_id: String,
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// A fight result announced on the message bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPublished {
    pub event_id: String,
    pub fight_id: String,
    pub outcome: ContestOutcome,
}
