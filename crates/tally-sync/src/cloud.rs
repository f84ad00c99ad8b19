//! # Cloud Client
//!
//! HTTP client for the cloud sync API.
//!
//! ## Endpoints
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Cloud Sync API                                  │
//! │                                                                         │
//! │  Every request carries:                                                │
//! │    Authorization: Bearer <cloud_token>                                 │
//! │    X-Business-Id: <business_id>                                        │
//! │                                                                         │
//! │  POST /api/sync/<entity>        { localId, action, data }              │
//! │       one path per mapped entity kind (see dispatch.rs)               │
//! │                                                                         │
//! │  GET  /api/sync/recovery        → { data: { products, staffUsers } }   │
//! │       authoritative catalog for bootstrapping a device                 │
//! │                                                                         │
//! │  POST /api/sync/recovery-sync   { products, staffUsers }               │
//! │       full local snapshot, periodic safety net                         │
//! │                                                                         │
//! │  2xx = accepted. Anything else, including transport failure, fails.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use tally_core::{CloudCredentials, ProductRecord, StaffUserRecord, SyncAction};

use crate::config::CloudSettings;
use crate::error::{SyncError, SyncResult};

/// Header carrying the business identifier.
pub const BUSINESS_ID_HEADER: &str = "X-Business-Id";

/// Shared prefix of every sync path.
pub const SYNC_BASE_PATH: &str = "api/sync/";

const RECOVERY_PATH: &str = "recovery";
const RECOVERY_SYNC_PATH: &str = "recovery-sync";

/// Longest error body kept in `last_error`.
const MAX_ERROR_BODY: usize = 512;

// =============================================================================
// Wire Types
// =============================================================================

/// Body of a per-entity sync request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySyncRequest<'a> {
    pub local_id: &'a str,
    pub action: SyncAction,
    pub data: Value,
}

/// Product and staff catalog exchanged by recovery and config push.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub products: Vec<ProductRecord>,
    #[serde(default)]
    pub staff_users: Vec<StaffUserRecord>,
}

#[derive(Debug, Deserialize)]
struct RecoveryResponse {
    data: CatalogSnapshot,
}

// =============================================================================
// Cloud Client
// =============================================================================

/// Thin reqwest wrapper that knows the sync paths and auth headers.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct CloudClient {
    http: Client,
    sync_base: Url,
}

impl CloudClient {
    /// Builds a client for the configured cloud.
    pub fn new(settings: &CloudSettings) -> SyncResult<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {e}")))?;

        Self::with_client(http, &settings.base_url)
    }

    /// Builds a client around an existing reqwest client.
    pub fn with_client(http: Client, base_url: &str) -> SyncResult<Self> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let sync_base = base.join(SYNC_BASE_PATH)?;

        Ok(CloudClient { http, sync_base })
    }

    /// Resolves a path relative to `/api/sync/`.
    pub fn sync_url(&self, path: &str) -> SyncResult<Url> {
        Ok(self.sync_base.join(path)?)
    }

    fn authorized(&self, request: RequestBuilder, credentials: &CloudCredentials) -> RequestBuilder {
        request
            .bearer_auth(&credentials.token)
            .header(BUSINESS_ID_HEADER, &credentials.business_id)
    }

    /// Sends one outbox entry to its entity endpoint.
    #[instrument(skip(self, credentials, request), fields(local_id = %request.local_id))]
    pub async fn post_entity(
        &self,
        path: &str,
        credentials: &CloudCredentials,
        request: &EntitySyncRequest<'_>,
    ) -> SyncResult<()> {
        let url = self.sync_url(path)?;
        debug!(%url, action = %request.action, "Posting entity");

        let response = self
            .authorized(self.http.post(url), credentials)
            .json(request)
            .send()
            .await?;

        ensure_success(response).await?;
        Ok(())
    }

    /// Fetches the authoritative catalog.
    pub async fn fetch_recovery(&self, credentials: &CloudCredentials) -> SyncResult<CatalogSnapshot> {
        let url = self.sync_url(RECOVERY_PATH)?;
        debug!(%url, "Fetching recovery snapshot");

        let response = self
            .authorized(self.http.get(url), credentials)
            .send()
            .await?;

        let body: RecoveryResponse = ensure_success(response).await?.json().await?;
        Ok(body.data)
    }

    /// Uploads the full local catalog.
    pub async fn push_snapshot(
        &self,
        credentials: &CloudCredentials,
        snapshot: &CatalogSnapshot,
    ) -> SyncResult<()> {
        let url = self.sync_url(RECOVERY_SYNC_PATH)?;
        debug!(
            %url,
            products = snapshot.products.len(),
            staff_users = snapshot.staff_users.len(),
            "Pushing catalog snapshot"
        );

        let response = self
            .authorized(self.http.post(url), credentials)
            .json(snapshot)
            .send()
            .await?;

        ensure_success(response).await?;
        Ok(())
    }
}

/// Turns any non-2xx response into [`SyncError::HttpStatus`].
async fn ensure_success(response: Response) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(SyncError::HttpStatus {
        status: status.as_u16(),
        body: body.chars().take(MAX_ERROR_BODY).collect(),
    })
}
