//! # Configuration Repository
//!
//! The singleton `sync_configuration` row (`id = 'default'`).
//!
//! Provisioning writes it; the sync engine, recovery and config push read it
//! fresh on every call. A missing row reads as an unlinked record.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use tally_core::{ConfigurationRecord, CONFIGURATION_RECORD_ID};

#[derive(Debug, sqlx::FromRow)]
struct ConfigurationRow {
    cloud_token: Option<String>,
    business_id: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

/// Repository for the device's cloud link.
#[derive(Debug, Clone)]
pub struct ConfigurationRepository {
    pool: SqlitePool,
}

impl ConfigurationRepository {
    /// Creates a new ConfigurationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ConfigurationRepository { pool }
    }

    /// Reads the configuration record.
    ///
    /// Returns [`ConfigurationRecord::default()`] when provisioning has not
    /// written the row yet.
    pub async fn get(&self) -> DbResult<ConfigurationRecord> {
        let row: Option<ConfigurationRow> = sqlx::query_as(
            "SELECT cloud_token, business_id, updated_at FROM sync_configuration WHERE id = ?1",
        )
        .bind(CONFIGURATION_RECORD_ID)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(|r| ConfigurationRecord {
                cloud_token: r.cloud_token,
                business_id: r.business_id,
                updated_at: r.updated_at,
            })
            .unwrap_or_default())
    }

    /// Writes the configuration record, replacing any previous link.
    pub async fn save(&self, record: &ConfigurationRecord) -> DbResult<()> {
        debug!(
            linked = record.is_linked(),
            business_id = ?record.business_id,
            "Saving sync configuration"
        );

        sqlx::query(
            r#"
            INSERT INTO sync_configuration (id, cloud_token, business_id, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                cloud_token = excluded.cloud_token,
                business_id = excluded.business_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(CONFIGURATION_RECORD_ID)
        .bind(&record.cloud_token)
        .bind(&record.business_id)
        .bind(record.updated_at.unwrap_or_else(Utc::now))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Clears the cloud link (device unlinked).
    pub async fn clear(&self) -> DbResult<()> {
        self.save(&ConfigurationRecord::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_missing_row_reads_unlinked() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let record = db.configuration().get().await.unwrap();
        assert_eq!(record.cloud_token, None);
        assert!(!record.is_linked());
    }

    #[tokio::test]
    async fn test_save_replaces_singleton() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.configuration();

        repo.save(&ConfigurationRecord::linked("tok-1", "biz-1")).await.unwrap();
        repo.save(&ConfigurationRecord::linked("tok-2", "biz-1")).await.unwrap();

        let record = repo.get().await.unwrap();
        assert_eq!(record.cloud_token.as_deref(), Some("tok-2"));
        assert!(record.updated_at.is_some());

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_configuration")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(rows, 1);

        repo.clear().await.unwrap();
        assert!(!repo.get().await.unwrap().is_linked());
    }
}
