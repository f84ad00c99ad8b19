//! # Recovery Engine
//!
//! Bootstraps a blank or reset device from the cloud's catalog.
//!
//! ## Recovery Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   RecoveryEngine::recover_from_cloud                    │
//! │                                                                         │
//! │  credentials ── absent ──► false                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  GET /api/sync/recovery ── transport / non-2xx / bad body ──► false    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  for product in products:     UPSERT products    (by localId)          │
//! │  for staff   in staffUsers:   UPSERT staff_users (by localId)          │
//! │       │         └── first failing upsert ──► false                     │
//! │       ▼             (earlier upserts stay applied)                     │
//! │  true                                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cloud wins. The outbox is never consulted, and each upsert commits on its
//! own, so a failure partway leaves a partially applied snapshot.

use std::sync::Arc;

use tracing::{error, info, warn};

use tally_db::Database;

use crate::cloud::CloudClient;
use crate::engine::CredentialSource;
use crate::error::SyncResult;

/// Rows written by one recovery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub products: usize,
    pub staff_users: usize,
}

/// Pulls the authoritative catalog into the local store.
pub struct RecoveryEngine {
    db: Database,
    client: CloudClient,
    credentials: Arc<dyn CredentialSource>,
}

impl RecoveryEngine {
    /// Creates a recovery engine that reads credentials from the configuration record.
    pub fn new(db: Database, client: CloudClient) -> Self {
        let credentials: Arc<dyn CredentialSource> = Arc::new(db.clone());
        RecoveryEngine {
            db,
            client,
            credentials,
        }
    }

    /// Fetches the cloud catalog and upserts every record.
    ///
    /// Returns true only when every record was applied.
    pub async fn recover_from_cloud(&self) -> bool {
        match self.try_recover().await {
            Ok(Some(report)) => {
                info!(
                    products = report.products,
                    staff_users = report.staff_users,
                    "Recovered catalog from cloud"
                );
                true
            }
            Ok(None) => {
                warn!("Device not linked to cloud, recovery skipped");
                false
            }
            Err(e) => {
                error!(error = %e, "Recovery from cloud failed");
                false
            }
        }
    }

    /// Runs recovery, returning `None` when the device is not linked.
    pub async fn try_recover(&self) -> SyncResult<Option<RecoveryReport>> {
        let Some(credentials) = self.credentials.credentials().await? else {
            return Ok(None);
        };

        let snapshot = self.client.fetch_recovery(&credentials).await?;
        let mut report = RecoveryReport::default();

        let products = self.db.products();
        for product in &snapshot.products {
            products.upsert(product).await?;
            report.products += 1;
        }

        let staff_users = self.db.staff_users();
        for staff in &snapshot.staff_users {
            staff_users.upsert(staff).await?;
            report.staff_users += 1;
        }

        Ok(Some(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use serde_json::{json, Value};
    use tally_core::ConfigurationRecord;
    use tally_db::DbConfig;

    fn recovery_body() -> Value {
        json!({
            "data": {
                "products": [
                    {"localId": "p-1", "name": "Espresso", "sku": "ESP", "priceCents": 300, "stock": 20},
                    {"localId": "p-2", "name": "Muffin", "priceCents": 250, "isActive": false,
                     "updatedAt": "2026-03-01T10:00:00Z", "supplier": "ignored"}
                ],
                "staffUsers": [
                    {"localId": "s-1", "name": "Mia", "role": "CASHIER", "pinHash": "h1"}
                ]
            }
        })
    }

    async fn setup(server: &MockServer) -> (Database, RecoveryEngine) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.configuration()
            .save(&ConfigurationRecord::linked("tok", "biz-1"))
            .await
            .unwrap();
        let client = CloudClient::with_client(reqwest::Client::new(), &server.base_url()).unwrap();
        let engine = RecoveryEngine::new(db.clone(), client);
        (db, engine)
    }

    #[tokio::test]
    async fn test_recovery_is_idempotent() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/sync/recovery")
                    .header("authorization", "Bearer tok")
                    .header("x-business-id", "biz-1");
                then.status(200).json_body(recovery_body());
            })
            .await;
        let (db, engine) = setup(&server).await;

        assert!(engine.recover_from_cloud().await);
        let products_once = db.products().list_all().await.unwrap();
        let staff_once = db.staff_users().list_all().await.unwrap();

        assert!(engine.recover_from_cloud().await);
        assert_eq!(db.products().list_all().await.unwrap(), products_once);
        assert_eq!(db.staff_users().list_all().await.unwrap(), staff_once);

        assert_eq!(products_once.len(), 2);
        assert!(!products_once[1].is_active);
        assert_eq!(staff_once[0].pin_hash.as_deref(), Some("h1"));
        mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_cloud_wins_over_local_rows() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/sync/recovery");
                then.status(200).json_body(recovery_body());
            })
            .await;
        let (db, engine) = setup(&server).await;

        db.products()
            .upsert(&tally_core::ProductRecord {
                local_id: "p-1".into(),
                name: "Old Espresso".into(),
                sku: None,
                barcode: Some("123".into()),
                price_cents: 1,
                category: None,
                stock: 0,
                is_active: true,
                updated_at: None,
            })
            .await
            .unwrap();

        assert!(engine.recover_from_cloud().await);

        let local = db.products().get_by_id("p-1").await.unwrap().unwrap();
        assert_eq!(local.name, "Espresso");
        assert_eq!(local.price_cents, 300);
        assert_eq!(local.barcode, None);
    }

    #[tokio::test]
    async fn test_not_linked_makes_no_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/sync/recovery");
                then.status(200).json_body(recovery_body());
            })
            .await;

        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let client = CloudClient::with_client(reqwest::Client::new(), &server.base_url()).unwrap();
        let engine = RecoveryEngine::new(db.clone(), client);

        assert!(!engine.recover_from_cloud().await);
        assert_eq!(engine.try_recover().await.unwrap(), None);
        mock.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_http_failure_returns_false() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/sync/recovery");
                then.status(401).body("token revoked");
            })
            .await;
        let (db, engine) = setup(&server).await;

        assert!(!engine.recover_from_cloud().await);
        assert_eq!(db.products().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_earlier_upserts() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/sync/recovery");
                then.status(200).json_body(recovery_body());
            })
            .await;
        let (db, engine) = setup(&server).await;

        // Products land first; every staff upsert then fails.
        sqlx::query("DROP TABLE staff_users")
            .execute(db.pool())
            .await
            .unwrap();

        assert!(!engine.recover_from_cloud().await);
        assert_eq!(db.products().count().await.unwrap(), 2);
        assert_eq!(db.sync_outbox().count_unsynced().await.unwrap(), 0);
    }
}
