use chrono::{Duration, NaiveDate, TimeZone, Utc};
use picks_service::{parse_result, ResultsProcessor};
use punch_picks_core::models::ResultPublished;
use punch_picks_core::{
    Contest, ContestOutcome, Contestant, Event, LeaderboardEngine, ManualClock, MemoryCatalog,
    MemoryPickBackend, MemoryResultArchive, Pick, PickBackend, PickStore, ResultBook,
    ScoringMode, UserEventPicks,
};
use std::sync::Arc;

fn event() -> Event {
    let lock_at = Utc.with_ymd_and_hms(2024, 4, 13, 22, 0, 0).unwrap();
    Event {
        id: "ufc-300".to_string(),
        title: "UFC 300".to_string(),
        date: NaiveDate::from_ymd_opt(2024, 4, 13).unwrap(),
        location: "Las Vegas".to_string(),
        lock_at,
        end_at: lock_at + Duration::hours(6),
    }
}

fn contest(id: &str, order: u32) -> Contest {
    Contest {
        id: id.to_string(),
        event_id: "ufc-300".to_string(),
        weight_class: "Featherweight".to_string(),
        fighter1: Contestant::new(&format!("{}-red", id), "Red"),
        fighter2: Contestant::new(&format!("{}-blue", id), "Blue"),
        order,
        is_main_event: order == 1,
    }
}

struct Fixture {
    catalog: Arc<MemoryCatalog>,
    backend: Arc<MemoryPickBackend>,
    archive: Arc<MemoryResultArchive>,
    processor: ResultsProcessor,
}

/// A fresh processor (empty book) over the fixture's collaborators.
fn processor(
    catalog: &Arc<MemoryCatalog>,
    backend: &Arc<MemoryPickBackend>,
    archive: &Arc<MemoryResultArchive>,
) -> ResultsProcessor {
    let clock = Arc::new(ManualClock::new(event().end_at));
    let store = Arc::new(PickStore::new(backend.clone(), clock.clone()));
    ResultsProcessor::new(
        catalog.clone(),
        store,
        Arc::new(ResultBook::new()),
        archive.clone(),
        LeaderboardEngine::new(ScoringMode::WinnerOnly),
        clock,
    )
}

async fn setup() -> Fixture {
    let catalog = Arc::new(MemoryCatalog::new());
    catalog.insert_event(event(), vec![contest("f1", 1), contest("f2", 2)]);

    let backend = Arc::new(MemoryPickBackend::new());
    for (user, f1, f2) in [("alice", "f1-red", "f2-red"), ("bob", "f1-blue", "f2-red")] {
        let mut record = UserEventPicks::empty(user, "ufc-300", event().lock_at - Duration::hours(1));
        record.picks.insert("f1".into(), Pick::complete(f1, "KO"));
        record.picks.insert("f2".into(), Pick::complete(f2, "DEC"));
        record.submitted = true;
        backend.replace(&record).await.unwrap();
    }

    let archive = Arc::new(MemoryResultArchive::new());
    let processor = processor(&catalog, &backend, &archive);
    Fixture {
        catalog,
        backend,
        archive,
        processor,
    }
}

fn published(fight_id: &str, outcome: ContestOutcome) -> ResultPublished {
    ResultPublished {
        event_id: "ufc-300".to_string(),
        fight_id: fight_id.to_string(),
        outcome,
    }
}

#[tokio::test]
async fn test_result_updates_leaderboard() {
    let f = setup().await;

    let board = f
        .processor
        .handle(published("f1", ContestOutcome::winner("f1-red", "KO")))
        .await
        .unwrap();

    // f2 is not decided yet but still counts toward the total.
    assert_eq!(board.event_id, "ufc-300");
    let alice = &board.leaderboard[0];
    assert_eq!((alice.user_id.as_str(), alice.rank), ("alice", 1));
    assert_eq!((alice.total_picks, alice.correct_picks), (2, 1));
    assert_eq!(alice.accuracy_percentage, 50.0);
    let bob = &board.leaderboard[1];
    assert_eq!((bob.rank, bob.accuracy_percentage), (2, 0.0));

    let board = f
        .processor
        .handle(published("f2", ContestOutcome::winner("f2-red", "SUB")))
        .await
        .unwrap();
    assert_eq!(board.leaderboard[0].accuracy_percentage, 100.0);
    assert_eq!(board.leaderboard[1].accuracy_percentage, 50.0);
    assert_eq!(f.archive.len(), 2);
}

#[tokio::test]
async fn test_duplicate_result_keeps_first_outcome() {
    let f = setup().await;
    f.processor
        .handle(published("f1", ContestOutcome::winner("f1-red", "KO")))
        .await
        .unwrap();

    let again = f
        .processor
        .handle(published("f1", ContestOutcome::winner("f1-blue", "KO")))
        .await
        .unwrap();
    assert_eq!(again.leaderboard[0].user_id, "alice");
    assert_eq!(again.leaderboard[0].correct_picks, 1);
    assert_eq!(
        f.processor.book().snapshot("ufc-300").get("f1"),
        Some(&ContestOutcome::winner("f1-red", "KO"))
    );
    assert_eq!(f.archive.len(), 1);
}

#[tokio::test]
async fn test_redelivery_rebuilds_board_after_backend_outage() {
    let f = setup().await;
    f.backend.set_available(false);
    assert!(f
        .processor
        .handle(published("f1", ContestOutcome::winner("f1-red", "KO")))
        .await
        .is_err());
    assert!(f.processor.book().is_published("ufc-300", "f1"));

    f.backend.set_available(true);
    let board = f
        .processor
        .handle(published("f1", ContestOutcome::winner("f1-red", "KO")))
        .await
        .unwrap();
    assert_eq!(board.leaderboard.len(), 2);
    assert_eq!(board.leaderboard[0].correct_picks, 1);
}

#[tokio::test]
async fn test_results_survive_restart() {
    let f = setup().await;
    f.processor
        .handle(published("f1", ContestOutcome::winner("f1-red", "KO")))
        .await
        .unwrap();

    let restarted = processor(&f.catalog, &f.backend, &f.archive);
    assert_eq!(restarted.restore().await.unwrap(), 1);
    assert!(restarted.book().is_published("ufc-300", "f1"));

    // A conflicting redelivery cannot change the archived outcome.
    restarted
        .handle(published("f1", ContestOutcome::winner("f1-blue", "SUB")))
        .await
        .unwrap();
    let board = restarted
        .handle(published("f2", ContestOutcome::winner("f2-red", "DEC")))
        .await
        .unwrap();

    let alice = &board.leaderboard[0];
    assert_eq!((alice.user_id.as_str(), alice.correct_picks), ("alice", 2));
    assert_eq!(
        restarted.book().snapshot("ufc-300").get("f1"),
        Some(&ContestOutcome::winner("f1-red", "KO"))
    );
}

#[tokio::test]
async fn test_archive_outage_leaves_result_unpublished() {
    let f = setup().await;
    f.archive.set_available(false);
    assert!(f
        .processor
        .handle(published("f1", ContestOutcome::winner("f1-red", "KO")))
        .await
        .is_err());
    assert!(!f.processor.book().is_published("ufc-300", "f1"));
}

#[tokio::test]
async fn test_unknown_fight_and_bad_winner_are_errors() {
    let f = setup().await;
    assert!(f
        .processor
        .handle(published("f9", ContestOutcome::NoContest))
        .await
        .is_err());
    assert!(f
        .processor
        .handle(published("f1", ContestOutcome::winner("f2-red", "KO")))
        .await
        .is_err());
    assert!(f.archive.is_empty());
}

#[tokio::test]
async fn test_leaderboard_requires_backend() {
    let f = setup().await;
    f.backend.set_available(false);
    assert!(f.processor.leaderboard("ufc-300").await.is_err());
}

#[test]
fn test_parse_result_payload() {
    let msg = parse_result(
        br#"{"event_id":"ufc-300","fight_id":"f2","outcome":{"status":"no_contest"}}"#,
    )
    .unwrap();
    assert_eq!(msg.fight_id, "f2");
    assert!(msg.outcome.is_void());
    assert!(parse_result(b"not json").is_err());
}
