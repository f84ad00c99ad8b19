//! # Per-Entity Dispatch
//!
//! Maps each [`EntityKind`] to the handler that delivers its entries.
//!
//! ## Endpoint Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  EntityKind      Path under /api/sync/     Handler                      │
//! │  ──────────────  ───────────────────────   ──────────────────────────   │
//! │  ORDER           orders                    EndpointHandler              │
//! │  PAYMENT         payments                  EndpointHandler              │
//! │  PRODUCT         products                  EndpointHandler              │
//! │  STAFF_USER      staff-users               EndpointHandler              │
//! │  AUDIT_LOG       audit-logs                EndpointHandler              │
//! │  TAX_DOCUMENT    (none)                    synced without a request     │
//! │  CLIENT          (none)                    synced without a request     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Unmapped kinds are reported as delivered so they never pin the queue.
//! They are therefore never propagated until the cloud gains an endpoint
//! and this table gains a row.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use tally_core::{CloudCredentials, EntityKind, OutboxEntry};

use crate::cloud::{CloudClient, EntitySyncRequest};
use crate::error::SyncResult;

/// Path of the cloud endpoint for `kind`, relative to `/api/sync/`.
pub const fn endpoint_path(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::Order => Some("orders"),
        EntityKind::Payment => Some("payments"),
        EntityKind::Product => Some("products"),
        EntityKind::StaffUser => Some("staff-users"),
        EntityKind::AuditLog => Some("audit-logs"),
        EntityKind::TaxDocument => None,
        EntityKind::Client => None,
    }
}

const fn slot(kind: EntityKind) -> usize {
    match kind {
        EntityKind::Order => 0,
        EntityKind::Payment => 1,
        EntityKind::Product => 2,
        EntityKind::StaffUser => 3,
        EntityKind::AuditLog => 4,
        EntityKind::TaxDocument => 5,
        EntityKind::Client => 6,
    }
}

// =============================================================================
// Syncable
// =============================================================================

/// Delivers one outbox entry. `Ok` means the cloud accepted it.
#[async_trait]
pub trait Syncable: Send + Sync {
    async fn send(&self, entry: &OutboxEntry, credentials: &CloudCredentials) -> SyncResult<()>;
}

/// Posts `{ localId, action, data }` to one cloud endpoint.
#[derive(Debug, Clone)]
pub struct EndpointHandler {
    client: CloudClient,
    path: &'static str,
}

impl EndpointHandler {
    pub fn new(client: CloudClient, path: &'static str) -> Self {
        EndpointHandler { client, path }
    }
}

#[async_trait]
impl Syncable for EndpointHandler {
    async fn send(&self, entry: &OutboxEntry, credentials: &CloudCredentials) -> SyncResult<()> {
        let data = entry.decode_payload()?.data()?;
        let request = EntitySyncRequest {
            local_id: &entry.entity_id,
            action: entry.action,
            data,
        };
        self.client.post_entity(self.path, credentials, &request).await
    }
}

// =============================================================================
// Dispatch Table
// =============================================================================

/// How an entry left the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// A handler delivered it.
    Sent,
    /// No handler exists for its kind.
    Unmapped,
}

/// One optional handler per entity kind.
#[derive(Clone, Default)]
pub struct DispatchTable {
    handlers: [Option<Arc<dyn Syncable>>; 7],
}

impl DispatchTable {
    /// A table with no handlers; every kind is unmapped.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The production table: an [`EndpointHandler`] for every kind that has
    /// an [`endpoint_path`].
    pub fn cloud(client: CloudClient) -> Self {
        EntityKind::ALL
            .into_iter()
            .fold(Self::empty(), |table, kind| match endpoint_path(kind) {
                Some(path) => table.with_handler(kind, Arc::new(EndpointHandler::new(client.clone(), path))),
                None => table,
            })
    }

    /// Installs `handler` for `kind`, replacing any previous one.
    pub fn with_handler(mut self, kind: EntityKind, handler: Arc<dyn Syncable>) -> Self {
        self.handlers[slot(kind)] = Some(handler);
        self
    }

    pub fn handler(&self, kind: EntityKind) -> Option<&Arc<dyn Syncable>> {
        self.handlers[slot(kind)].as_ref()
    }

    pub fn is_mapped(&self, kind: EntityKind) -> bool {
        self.handler(kind).is_some()
    }

    /// Sends one entry through the handler for its kind.
    pub async fn send_one(
        &self,
        entry: &OutboxEntry,
        credentials: &CloudCredentials,
    ) -> SyncResult<Delivery> {
        match self.handler(entry.entity_kind) {
            Some(handler) => {
                handler.send(entry, credentials).await?;
                Ok(Delivery::Sent)
            }
            None => {
                debug!(
                    entry_id = %entry.id,
                    entity_kind = %entry.entity_kind,
                    "No endpoint for entity kind; marking delivered"
                );
                Ok(Delivery::Unmapped)
            }
        }
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mapped: Vec<_> = EntityKind::ALL
            .into_iter()
            .filter(|kind| self.is_mapped(*kind))
            .collect();
        f.debug_struct("DispatchTable").field("mapped", &mapped).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;
    use tally_core::{SyncAction, SyncPayload};

    fn creds() -> CloudCredentials {
        CloudCredentials::new("tok", "biz")
    }

    fn entry(kind: EntityKind, payload: SyncPayload) -> OutboxEntry {
        OutboxEntry::new(kind, "e-1", SyncAction::Update, &payload).unwrap()
    }

    #[test]
    fn test_every_kind_has_a_slot() {
        let mut seen = [false; 7];
        for kind in EntityKind::ALL {
            seen[slot(kind)] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_cloud_table_mapping() {
        let client = CloudClient::with_client(reqwest::Client::new(), "http://localhost:1").unwrap();
        let table = DispatchTable::cloud(client);

        assert!(table.is_mapped(EntityKind::Order));
        assert!(table.is_mapped(EntityKind::StaffUser));
        assert!(!table.is_mapped(EntityKind::TaxDocument));
        assert!(!table.is_mapped(EntityKind::Client));
        assert_eq!(endpoint_path(EntityKind::AuditLog), Some("audit-logs"));
    }

    #[tokio::test]
    async fn test_unmapped_kind_makes_no_request() {
        let server = MockServer::start_async().await;
        let any = server
            .mock_async(|when, then| {
                when.path_contains("/");
                then.status(200);
            })
            .await;

        let client = CloudClient::with_client(reqwest::Client::new(), &server.base_url()).unwrap();
        let table = DispatchTable::cloud(client);

        let client_entry = entry(EntityKind::Client, SyncPayload::Client(json!({"name": "Ada"})));
        let delivery = table.send_one(&client_entry, &creds()).await.unwrap();

        assert_eq!(delivery, Delivery::Unmapped);
        any.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_mapped_kind_posts_snapshot() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/sync/staff-users").json_body_partial(
                    r#"{"localId": "e-1", "action": "UPDATE", "data": {"localId": "s-1", "role": "CASHIER"}}"#,
                );
                then.status(200);
            })
            .await;

        let client = CloudClient::with_client(reqwest::Client::new(), &server.base_url()).unwrap();
        let table = DispatchTable::cloud(client);

        let staff = tally_core::StaffUserRecord {
            local_id: "s-1".into(),
            name: "Mia".into(),
            role: "CASHIER".into(),
            pin_hash: None,
            is_active: true,
            updated_at: None,
        };
        let staff_entry = entry(EntityKind::StaffUser, SyncPayload::StaffUser(staff));

        assert_eq!(table.send_one(&staff_entry, &creds()).await.unwrap(), Delivery::Sent);
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_undecodable_payload_fails_without_request() {
        let server = MockServer::start_async().await;
        let any = server
            .mock_async(|when, then| {
                when.path_contains("/");
                then.status(200);
            })
            .await;

        let client = CloudClient::with_client(reqwest::Client::new(), &server.base_url()).unwrap();
        let table = DispatchTable::cloud(client);

        let mut order = entry(EntityKind::Order, SyncPayload::Order(json!({})));
        order.payload = json!({"schemaVersion": 7, "kind": "ORDER", "data": {}}).to_string();

        let err = table.send_one(&order, &creds()).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidPayload(_)));
        any.assert_hits_async(0).await;
    }
}
