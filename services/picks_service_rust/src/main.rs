use anyhow::{Context, Result};
use dotenv::dotenv;
use picks_service::{run_results_listener, ResultsProcessor};
use punch_picks_core::db::{
    create_pool, BackendHealthConfig, BackendHealthMonitor, DbPoolConfig, PgResultArchive,
};
use punch_picks_core::redis::RedisBus;
use punch_picks_core::{
    Catalog, Clock, HttpCatalog, LeaderboardEngine, MemoryPickBackend, MemoryResultArchive,
    PgPickBackend, PickBackend, PickStore, PicksConfig, ResultArchive, ResultBook, SystemClock,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting Punch Picks service...");

    let config = PicksConfig::from_env();
    config.log_config();

    // Backend of record
    let mut names = None;
    let (backend, archive) = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url, &DbPoolConfig::from_env()).await?;
            let pg = PgPickBackend::new(pool.clone());
            pg.ensure_schema()
                .await
                .context("Failed to create user_event_picks table")?;
            let results = PgResultArchive::new(pool);
            results
                .ensure_schema()
                .await
                .context("Failed to create fight_results table")?;
            names = Some(pg.clone());
            let backend: Arc<dyn PickBackend> = Arc::new(pg);
            let archive: Arc<dyn ResultArchive> = Arc::new(results);
            (backend, archive)
        }
        None => {
            warn!("DATABASE_URL not set, picks and results are held in memory only");
            let backend: Arc<dyn PickBackend> = Arc::new(MemoryPickBackend::new());
            let archive: Arc<dyn ResultArchive> = Arc::new(MemoryResultArchive::new());
            (backend, archive)
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(PickStore::with_config(
        backend.clone(),
        clock.clone(),
        config.store_config(),
    ));
    let catalog: Arc<dyn Catalog> = Arc::new(HttpCatalog::new(&config.catalog_api_url));

    let mut processor = ResultsProcessor::new(
        catalog,
        store,
        Arc::new(ResultBook::new()),
        archive,
        LeaderboardEngine::new(config.scoring_mode),
        clock,
    );
    if let Some(pg) = names {
        processor = processor.with_names(pg);
    }
    processor.restore().await?;
    let processor = Arc::new(processor);

    let bus = RedisBus::new(&config.redis_url).await?;

    // Tasks
    let mut tasks = Vec::new();

    // Picks are read-only here, so no pending-sync loop.

    // 1. Backend health
    tasks.push(BackendHealthMonitor::new(backend, BackendHealthConfig::from_env()).start_background());

    // 2. Results -> leaderboard
    tasks.push(tokio::spawn(run_results_listener(bus, processor)));

    // Wait for signal
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    for task in tasks {
        task.abort();
    }
    Ok(())
}
