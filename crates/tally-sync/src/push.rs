//! # Config Push
//!
//! Periodic upload of the full local catalog.
//!
//! Independent of the outbox: every run sends all `products` and
//! `staff_users` rows as the locally authoritative snapshot to
//! `POST /api/sync/recovery-sync`. It is a coarse safety net for anything
//! per-mutation sync missed, scheduled ten times less often than sync passes.

use std::sync::Arc;

use tracing::{debug, error, info};

use tally_db::Database;

use crate::cloud::{CatalogSnapshot, CloudClient};
use crate::engine::CredentialSource;
use crate::error::SyncResult;

/// Uploads the local catalog to the cloud.
pub struct ConfigPush {
    db: Database,
    client: CloudClient,
    credentials: Arc<dyn CredentialSource>,
}

impl ConfigPush {
    /// Creates a config push that reads credentials from the configuration record.
    pub fn new(db: Database, client: CloudClient) -> Self {
        let credentials: Arc<dyn CredentialSource> = Arc::new(db.clone());
        ConfigPush {
            db,
            client,
            credentials,
        }
    }

    /// Sends the whole local catalog. Returns true when the cloud accepted it.
    pub async fn push_config_to_cloud(&self) -> bool {
        match self.try_push().await {
            Ok(Some(snapshot)) => {
                info!(
                    products = snapshot.products.len(),
                    staff_users = snapshot.staff_users.len(),
                    "Pushed catalog to cloud"
                );
                true
            }
            Ok(None) => {
                debug!("Device not linked to cloud, config push skipped");
                false
            }
            Err(e) => {
                error!(error = %e, "Config push failed");
                false
            }
        }
    }

    /// Runs the push, returning the snapshot sent, or `None` when not linked.
    pub async fn try_push(&self) -> SyncResult<Option<CatalogSnapshot>> {
        let Some(credentials) = self.credentials.credentials().await? else {
            return Ok(None);
        };

        let snapshot = CatalogSnapshot {
            products: self.db.products().list_all().await?,
            staff_users: self.db.staff_users().list_all().await?,
        };

        self.client.push_snapshot(&credentials, &snapshot).await?;
        Ok(Some(snapshot))
    }
}
