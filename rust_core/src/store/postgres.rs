//! Postgres pick backend
//!
//! One row per (user, event) in `user_event_picks`; the picks themselves are
//! a JSONB list of `{fight_id, fighter_id, method}` records. Rows written by
//! older clients may hold a map keyed by fight id instead; both shapes are
//! normalized on read. `entry_times` holds the last write per fight.

use super::backend::{BackendError, PickBackend};
use crate::models::{Pick, PicksPayload, UserEventPicks};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS user_event_picks (
        user_id     TEXT        NOT NULL,
        event_id    TEXT        NOT NULL,
        picks       JSONB       NOT NULL DEFAULT '[]'::jsonb,
        entry_times JSONB       NOT NULL DEFAULT '{}'::jsonb,
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        submitted   BOOLEAN     NOT NULL DEFAULT FALSE,
        PRIMARY KEY (user_id, event_id)
    )
"#;

// Tables created before per-fight write times existed
const ADD_ENTRY_TIMES: &str = r#"
    ALTER TABLE user_event_picks
    ADD COLUMN IF NOT EXISTS entry_times JSONB NOT NULL DEFAULT '{}'::jsonb
"#;

#[derive(Debug, sqlx::FromRow)]
struct PicksRow {
    user_id: String,
    event_id: String,
    picks: Json<PicksPayload>,
    entry_times: Json<BTreeMap<String, DateTime<Utc>>>,
    updated_at: DateTime<Utc>,
    submitted: bool,
}

impl From<PicksRow> for UserEventPicks {
    fn from(row: PicksRow) -> Self {
        UserEventPicks {
            user_id: row.user_id,
            event_id: row.event_id,
            picks: row.picks.0.into_picks(),
            entry_times: row.entry_times.0,
            updated_at: row.updated_at,
            submitted: row.submitted,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgPickBackend {
    pool: PgPool,
}

impl PgPickBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), BackendError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(ADD_ENTRY_TIMES).execute(&self.pool).await?;
        info!("user_event_picks table ready");
        Ok(())
    }

    /// Usernames for the given users, from the `users` table.
    pub async fn display_names(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, String>, BackendError> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT id::text, username
            FROM users
            WHERE id::text = ANY($1)
            "#,
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }
}

#[async_trait]
impl PickBackend for PgPickBackend {
    async fn fetch(
        &self,
        user_id: &str,
        event_id: &str,
    ) -> Result<Option<UserEventPicks>, BackendError> {
        let row = sqlx::query_as::<_, PicksRow>(
            r#"
            SELECT user_id, event_id, picks, entry_times, updated_at, submitted
            FROM user_event_picks
            WHERE user_id = $1 AND event_id = $2
            "#,
        )
        .bind(user_id)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserEventPicks::from))
    }

    async fn upsert_pick(
        &self,
        user_id: &str,
        event_id: &str,
        contest_id: &str,
        pick: &Pick,
        at: DateTime<Utc>,
    ) -> Result<UserEventPicks, BackendError> {
        // Read-modify-write under a row lock; dropping the transaction
        // before commit rolls everything back.
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, PicksRow>(
            r#"
            SELECT user_id, event_id, picks, entry_times, updated_at, submitted
            FROM user_event_picks
            WHERE user_id = $1 AND event_id = $2
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(event_id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut record = existing
            .map(UserEventPicks::from)
            .unwrap_or_else(|| UserEventPicks::empty(user_id, event_id, at));
        record.set_pick(contest_id, pick.clone(), at);

        sqlx::query(
            r#"
            INSERT INTO user_event_picks (user_id, event_id, picks, entry_times, updated_at, submitted)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, event_id) DO UPDATE SET
                picks = EXCLUDED.picks,
                entry_times = EXCLUDED.entry_times,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.event_id)
        .bind(Json(PicksPayload::from_picks(&record.picks)))
        .bind(Json(record.entry_times.clone()))
        .bind(record.updated_at)
        .bind(record.submitted)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            "Upserted pick: user={}, event={}, fight={}",
            user_id, event_id, contest_id
        );
        Ok(record)
    }

    async fn replace(&self, record: &UserEventPicks) -> Result<UserEventPicks, BackendError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO user_event_picks (user_id, event_id, picks, entry_times, updated_at, submitted)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, event_id) DO UPDATE SET
                picks = EXCLUDED.picks,
                entry_times = EXCLUDED.entry_times,
                updated_at = EXCLUDED.updated_at,
                submitted = EXCLUDED.submitted
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.event_id)
        .bind(Json(PicksPayload::from_picks(&record.picks)))
        .bind(Json(record.entry_times.clone()))
        .bind(record.updated_at)
        .bind(record.submitted)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            "Replaced picks: user={}, event={}, fights={}",
            record.user_id,
            record.event_id,
            record.picks.len()
        );
        Ok(record.clone())
    }

    async fn list_for_event(&self, event_id: &str) -> Result<Vec<UserEventPicks>, BackendError> {
        let rows = sqlx::query_as::<_, PicksRow>(
            r#"
            SELECT user_id, event_id, picks, entry_times, updated_at, submitted
            FROM user_event_picks
            WHERE event_id = $1
            ORDER BY user_id
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserEventPicks::from).collect())
    }

    async fn remove(&self, user_id: &str, event_id: &str) -> Result<bool, BackendError> {
        let result = sqlx::query(
            r#"
            DELETE FROM user_event_picks
            WHERE user_id = $1 AND event_id = $2
            "#,
        )
        .bind(user_id)
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), BackendError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
