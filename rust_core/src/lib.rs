//! Punch Picks core - pick lifecycle, pick store and leaderboard scoring.
//!
//! This crate provides:
//! - Lock-window evaluation against an injectable clock, plus a periodic
//!   lock watcher
//! - A pick store with a backend of record (Postgres or in-memory), retry
//!   with backoff, a circuit breaker and a local fallback cache that queues
//!   writes while the backend is unreachable
//! - The per-session pick lifecycle engine (selection rules, completion
//!   accounting, submit)
//! - An immutable results book, its durable archive and the leaderboard
//!   reducer
//! - Catalog collaborators (REST and in-memory)

pub mod catalog;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod error;
pub mod leaderboard;
pub mod lifecycle;
pub mod lock_watch;
pub mod models;
pub mod redis;
pub mod results;
pub mod store;
pub mod window;

pub use catalog::{Catalog, CatalogError, HttpCatalog, Identity, MemoryCatalog};
pub use config::PicksConfig;
pub use error::{PickError, PickResult};
pub use leaderboard::{accuracy_for, LeaderboardEngine, ScoringMode};
pub use lifecycle::{Completion, PickEngine, PickSession, Transition};
pub use lock_watch::LockWatcher;
pub use models::{
    Contest, ContestOutcome, Contestant, Event, FightCard, LeaderboardEntry, LeaderboardResponse,
    Pick, UserEventPicks,
};
pub use results::{ArchivedResult, MemoryResultArchive, OutcomeSnapshot, ResultArchive, ResultBook};
pub use store::{MemoryPickBackend, PgPickBackend, PickBackend, PickStore, Stored, SyncState};
pub use window::{can_write, is_event_over, time_until_lock, Clock, ManualClock, SystemClock, TimeUntilLock, WindowStatus};
