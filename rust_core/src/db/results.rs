//! Published fight results in Postgres
//!
//! One row per fight in `fight_results`. The first result written for a
//! fight is final; later inserts leave it untouched.

use crate::models::ContestOutcome;
use crate::results::{ArchivedResult, ResultArchive};
use crate::store::BackendError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, info};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS fight_results (
        event_id     TEXT        NOT NULL,
        fight_id     TEXT        NOT NULL,
        outcome      JSONB       NOT NULL,
        published_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (event_id, fight_id)
    )
"#;

#[derive(Debug, sqlx::FromRow)]
struct ResultRow {
    event_id: String,
    fight_id: String,
    outcome: Json<ContestOutcome>,
    published_at: DateTime<Utc>,
}

impl From<ResultRow> for ArchivedResult {
    fn from(row: ResultRow) -> Self {
        ArchivedResult {
            event_id: row.event_id,
            fight_id: row.fight_id,
            outcome: row.outcome.0,
            published_at: row.published_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgResultArchive {
    pool: PgPool,
}

impl PgResultArchive {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), BackendError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        info!("fight_results table ready");
        Ok(())
    }
}

#[async_trait]
impl ResultArchive for PgResultArchive {
    async fn record(&self, result: &ArchivedResult) -> Result<ArchivedResult, BackendError> {
        let mut tx = self.pool.begin().await?;

        let insert = sqlx::query(
            r#"
            INSERT INTO fight_results (event_id, fight_id, outcome, published_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id, fight_id) DO NOTHING
            "#,
        )
        .bind(&result.event_id)
        .bind(&result.fight_id)
        .bind(Json(result.outcome.clone()))
        .bind(result.published_at)
        .execute(&mut *tx)
        .await?;
        let inserted = insert.rows_affected() > 0;

        let kept = sqlx::query_as::<_, ResultRow>(
            r#"
            SELECT event_id, fight_id, outcome, published_at
            FROM fight_results
            WHERE event_id = $1 AND fight_id = $2
            "#,
        )
        .bind(&result.event_id)
        .bind(&result.fight_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            "Result for fight {} (event {}) {}",
            result.fight_id,
            result.event_id,
            if inserted { "archived" } else { "already archived" }
        );
        Ok(kept.into())
    }

    async fn load_all(&self) -> Result<Vec<ArchivedResult>, BackendError> {
        let rows = sqlx::query_as::<_, ResultRow>(
            r#"
            SELECT event_id, fight_id, outcome, published_at
            FROM fight_results
            ORDER BY event_id, published_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ArchivedResult::from).collect())
    }
}
