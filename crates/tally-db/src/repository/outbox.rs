//! # Sync Outbox Repository
//!
//! Storage for the outbox queue that drives offline-first synchronization.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  LOCAL OPERATION (e.g., finalize order)                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  1. Domain write commits (owned by the caller)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  2. INSERT INTO sync_outbox (entity_kind, entity_id, action, payload)  │
//! │     status = 'PENDING'   ← separate statement, not the same tx         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            SYNC ENGINE PASS (async)                             │   │
//! │  │                                                                 │   │
//! │  │  1. SELECT ... WHERE status IN ('PENDING', 'FAILED')           │   │
//! │  │     ORDER BY created_at LIMIT 10                               │   │
//! │  │                                                                 │   │
//! │  │  2. For each entry, in order:                                  │   │
//! │  │     a. Send to cloud endpoint                                  │   │
//! │  │     b. On success: status = 'SYNCED'                           │   │
//! │  │     c. On failure: status = 'FAILED', attempts += 1            │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Rows are never deleted; SYNCED never changes again.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{EntityKind, OutboxEntry, OutboxStatus, SyncAction, SyncPayload};

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, entity_kind, entity_id, action, payload, status,
        attempts, last_error, created_at, updated_at, attempted_at
    FROM sync_outbox
"#;

/// Raw `sync_outbox` row before enum text is parsed.
#[derive(Debug, sqlx::FromRow)]
struct OutboxRow {
    id: String,
    entity_kind: String,
    entity_id: String,
    action: String,
    payload: String,
    status: String,
    attempts: i64,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    attempted_at: Option<DateTime<Utc>>,
}

impl OutboxRow {
    fn into_entry(self) -> DbResult<OutboxEntry> {
        Ok(OutboxEntry {
            id: self.id,
            entity_kind: self.entity_kind.parse()?,
            entity_id: self.entity_id,
            action: self.action.parse()?,
            payload: self.payload,
            status: self.status.parse()?,
            attempts: self.attempts,
            last_error: self.last_error,
            created_at: self.created_at,
            updated_at: self.updated_at,
            attempted_at: self.attempted_at,
        })
    }
}

/// Repository for sync outbox operations.
#[derive(Debug, Clone)]
pub struct SyncOutboxRepository {
    pool: SqlitePool,
}

impl SyncOutboxRepository {
    /// Creates a new SyncOutboxRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncOutboxRepository { pool }
    }

    /// Queues a mutation for synchronization with status `PENDING`.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let payload = SyncPayload::Order(serde_json::to_value(&order)?);
    /// repo.queue_for_sync(EntityKind::Order, &order.id, SyncAction::Create, &payload).await?;
    /// ```
    pub async fn queue_for_sync(
        &self,
        entity_kind: EntityKind,
        entity_id: &str,
        action: SyncAction,
        payload: &SyncPayload,
    ) -> DbResult<OutboxEntry> {
        let entry = OutboxEntry::new(entity_kind, entity_id, action, payload)
            .map_err(|e| DbError::InvalidInput(e.to_string()))?;

        debug!(
            entity_kind = %entity_kind,
            entity_id = %entity_id,
            action = %action,
            "Queuing for sync"
        );

        self.insert(&entry).await?;
        Ok(entry)
    }

    /// Inserts a fully built entry.
    pub async fn insert(&self, entry: &OutboxEntry) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_outbox (
                id, entity_kind, entity_id, action, payload, status,
                attempts, last_error, created_at, updated_at, attempted_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10, ?11
            )
            "#,
        )
        .bind(&entry.id)
        .bind(entry.entity_kind.as_str())
        .bind(&entry.entity_id)
        .bind(entry.action.as_str())
        .bind(&entry.payload)
        .bind(entry.status.as_str())
        .bind(entry.attempts)
        .bind(&entry.last_error)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .bind(entry.attempted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets the next entries a sync pass should attempt.
    ///
    /// ## Returns
    /// Up to `limit` entries with status `PENDING` or `FAILED`, oldest
    /// `created_at` first. Insertion order breaks timestamp ties.
    pub async fn get_sendable(&self, limit: u32) -> DbResult<Vec<OutboxEntry>> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE status IN ('PENDING', 'FAILED') \
             ORDER BY created_at ASC, rowid ASC LIMIT ?1"
        );

        let rows: Vec<OutboxRow> = sqlx::query_as(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(OutboxRow::into_entry).collect()
    }

    /// Gets a single entry by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<OutboxEntry>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");

        let row: Option<OutboxRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(OutboxRow::into_entry).transpose()
    }

    /// Lists every entry with the given status, oldest first.
    pub async fn list_by_status(&self, status: OutboxStatus) -> DbResult<Vec<OutboxEntry>> {
        let sql = format!("{SELECT_COLUMNS} WHERE status = ?1 ORDER BY created_at ASC, rowid ASC");

        let rows: Vec<OutboxRow> = sqlx::query_as(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(OutboxRow::into_entry).collect()
    }

    /// Marks an entry as accepted by the cloud.
    ///
    /// `attempts` is left unchanged.
    pub async fn mark_synced(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE sync_outbox SET
                status = 'SYNCED',
                updated_at = ?2,
                attempted_at = ?2
            WHERE id = ?1 AND status != 'SYNCED'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a failed send: status `FAILED`, `attempts + 1`.
    ///
    /// A `SYNCED` entry is never touched.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE sync_outbox SET
                status = 'FAILED',
                attempts = attempts + 1,
                last_error = ?2,
                updated_at = ?3,
                attempted_at = ?3
            WHERE id = ?1 AND status != 'SYNCED'
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counts entries with the given status.
    pub async fn count_by_status(&self, status: OutboxStatus) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_outbox WHERE status = ?1")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Counts entries still waiting for delivery (`PENDING` or `FAILED`).
    pub async fn count_unsynced(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sync_outbox WHERE status IN ('PENDING', 'FAILED')",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
