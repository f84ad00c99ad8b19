//! # Staff User Repository
//!
//! Staff accounts restored by recovery and sent by config push.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use tally_core::StaffUserRecord;

#[derive(Debug, sqlx::FromRow)]
struct StaffUserRow {
    id: String,
    name: String,
    role: String,
    pin_hash: Option<String>,
    is_active: bool,
    updated_at: Option<DateTime<Utc>>,
}

impl From<StaffUserRow> for StaffUserRecord {
    fn from(row: StaffUserRow) -> Self {
        StaffUserRecord {
            local_id: row.id,
            name: row.name,
            role: row.role,
            pin_hash: row.pin_hash,
            is_active: row.is_active,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for staff user rows.
#[derive(Debug, Clone)]
pub struct StaffUserRepository {
    pool: SqlitePool,
}

impl StaffUserRepository {
    /// Creates a new StaffUserRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StaffUserRepository { pool }
    }

    /// Inserts the staff user, or overwrites the row with the same id.
    pub async fn upsert(&self, staff: &StaffUserRecord) -> DbResult<()> {
        debug!(id = %staff.local_id, "Upserting staff user");

        sqlx::query(
            r#"
            INSERT INTO staff_users (id, name, role, pin_hash, is_active, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                role = excluded.role,
                pin_hash = excluded.pin_hash,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&staff.local_id)
        .bind(&staff.name)
        .bind(&staff.role)
        .bind(&staff.pin_hash)
        .bind(staff.is_active)
        .bind(staff.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a staff user by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<StaffUserRecord>> {
        let row: Option<StaffUserRow> = sqlx::query_as(
            "SELECT id, name, role, pin_hash, is_active, updated_at FROM staff_users WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(StaffUserRecord::from))
    }

    /// Lists every staff user ordered by id.
    pub async fn list_all(&self) -> DbResult<Vec<StaffUserRecord>> {
        let rows: Vec<StaffUserRow> = sqlx::query_as(
            "SELECT id, name, role, pin_hash, is_active, updated_at FROM staff_users ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StaffUserRecord::from).collect())
    }

    /// Counts staff user rows.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM staff_users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
