//! SQLite-backed [`SyncStateStore`].
//!
//! One row per card in `sync_state`, keyed by `content_hash`. Every write
//! is an upsert (`ON CONFLICT(content_hash) DO UPDATE`), so replaying the
//! same state is harmless and the table never grows past one row per card.
//!
//! Rows that cannot be decoded (unknown status, malformed payload JSON or
//! timestamps) are treated as storage corruption and returned as errors
//! rather than skipped.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use deckforge_core::models::{CardPayload, CardRecord, SyncState, SyncStatus};
use deckforge_core::store::SyncStateStore;

const SELECT_COLUMNS: &str = "content_hash, module_id, deck_path, payload_json, status, \
     attempt_count, last_error, note_id, file_location, created_at, updated_at";

/// SQLite implementation of [`SyncStateStore`].
pub struct SqliteSyncStore {
    pool: SqlitePool,
}

impl SqliteSyncStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_ts(value: &str, column: &str, hash: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Corrupt {} '{}' in sync_state row {}", column, value, hash))
}

fn row_to_state(row: &SqliteRow) -> Result<SyncState> {
    let content_hash: String = row.try_get("content_hash")?;
    let payload_json: String = row.try_get("payload_json")?;
    let status: String = row.try_get("status")?;
    let attempt_count: i64 = row.try_get("attempt_count")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    let payload: CardPayload = serde_json::from_str(&payload_json)
        .with_context(|| format!("Corrupt payload_json in sync_state row {}", content_hash))?;
    let status: SyncStatus = status
        .parse()
        .with_context(|| format!("Corrupt status in sync_state row {}", content_hash))?;
    let attempt_count = u32::try_from(attempt_count)
        .with_context(|| format!("Corrupt attempt_count in sync_state row {}", content_hash))?;

    Ok(SyncState {
        card: CardRecord {
            content_hash: content_hash.clone(),
            module_id: row.try_get("module_id")?,
            deck_path: row.try_get("deck_path")?,
            payload,
        },
        attempt_count,
        last_error: row.try_get("last_error")?,
        status,
        note_id: row.try_get("note_id")?,
        file_location: row.try_get("file_location")?,
        created_at: parse_ts(&created_at, "created_at", &content_hash)?,
        updated_at: parse_ts(&updated_at, "updated_at", &content_hash)?,
    })
}

#[async_trait]
impl SyncStateStore for SqliteSyncStore {
    async fn get(&self, content_hash: &str) -> Result<Option<SyncState>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM sync_state WHERE content_hash = ?",
            SELECT_COLUMNS
        ))
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_state).transpose()
    }

    async fn upsert(&self, state: &SyncState) -> Result<()> {
        let payload_json = serde_json::to_string(&state.card.payload)?;

        sqlx::query(
            r#"
            INSERT INTO sync_state (content_hash, module_id, deck_path, payload_json, status,
                                    attempt_count, last_error, note_id, file_location,
                                    created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(content_hash) DO UPDATE SET
                module_id = excluded.module_id,
                deck_path = excluded.deck_path,
                payload_json = excluded.payload_json,
                status = excluded.status,
                attempt_count = excluded.attempt_count,
                last_error = excluded.last_error,
                note_id = excluded.note_id,
                file_location = excluded.file_location,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.card.content_hash)
        .bind(&state.card.module_id)
        .bind(&state.card.deck_path)
        .bind(&payload_json)
        .bind(state.status.as_str())
        .bind(i64::from(state.attempt_count))
        .bind(&state.last_error)
        .bind(state.note_id)
        .bind(&state.file_location)
        .bind(state.created_at.to_rfc3339())
        .bind(state.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to persist sync state for {}", state.content_hash()))?;

        Ok(())
    }

    async fn list_non_terminal(&self) -> Result<Vec<SyncState>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM sync_state WHERE status IN (?, ?) ORDER BY created_at, content_hash",
            SELECT_COLUMNS
        ))
        .bind(SyncStatus::Pending.as_str())
        .bind(SyncStatus::QueuedRetry.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_state).collect()
    }

    async fn status_counts(&self) -> Result<BTreeMap<SyncStatus, usize>> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM sync_state GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            let status: SyncStatus = status
                .parse()
                .with_context(|| "Corrupt status in sync_state")?;
            counts.insert(status, n as usize);
        }
        Ok(counts)
    }
}
