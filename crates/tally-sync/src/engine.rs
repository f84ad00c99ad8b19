//! # Sync Engine
//!
//! Drains the outbox against the cloud, one bounded pass at a time.
//!
//! ## Pass Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncEngine::run_once                             │
//! │                                                                         │
//! │  1. Single-flight guard ── already held ──► AlreadyRunning (no-op)     │
//! │       │  (released on every exit path by InFlightGuard::drop)          │
//! │       ▼                                                                 │
//! │  2. Credentials (read fresh) ── absent ──► NotLinked (no-op)           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  3. SELECT ... WHERE status IN (PENDING, FAILED)                       │
//! │     ORDER BY created_at LIMIT batch_size (10)                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  4. For each entry, strictly one after another:                        │
//! │       DispatchTable::send_one                                          │
//! │         ├─ Ok  ──► SYNCED                                              │
//! │         └─ Err ──► FAILED, attempts += 1, continue with the next       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  5. Completed(PassReport { remaining })                                │
//! │     remaining > 0 ──► the scheduler nudges again after retry_delay     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Failed entries are retried forever at a fixed delay. There is no attempt
//! cutoff and no dead-letter status.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use tally_core::{CloudCredentials, OutboxStatus, DEFAULT_BATCH_SIZE};
use tally_db::Database;

use crate::dispatch::{Delivery, DispatchTable};
use crate::error::SyncResult;

// =============================================================================
// Credential Source
// =============================================================================

/// Supplies the cloud link, read fresh on every call.
///
/// `Ok(None)` means the device is not linked yet, which is a normal state.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn credentials(&self) -> SyncResult<Option<CloudCredentials>>;
}

#[async_trait]
impl CredentialSource for Database {
    async fn credentials(&self) -> SyncResult<Option<CloudCredentials>> {
        Ok(self.configuration().get().await?.credentials())
    }
}

// =============================================================================
// Pass Results
// =============================================================================

/// Counts for one completed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Entries fetched and attempted.
    pub attempted: usize,
    /// Entries now `SYNCED`, unmapped kinds included.
    pub synced: usize,
    /// Entries now `FAILED`.
    pub failed: usize,
    /// `PENDING` + `FAILED` entries left after the pass.
    pub remaining: i64,
}

/// What a call to [`SyncEngine::run_once`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Another pass held the guard; nothing was done.
    AlreadyRunning,
    /// No cloud credentials; nothing was done.
    NotLinked,
    Completed(PassReport),
}

impl PassOutcome {
    /// Returns true when entries are still waiting after this pass.
    pub fn needs_follow_up(&self) -> bool {
        matches!(self, PassOutcome::Completed(report) if report.remaining > 0)
    }
}

/// Current sync status for external queries.
#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    /// Number of `PENDING` outbox entries.
    pub pending_count: i64,
    /// Number of `FAILED` outbox entries.
    pub failed_count: i64,
    /// Whether a pass is running right now.
    pub in_flight: bool,
    /// When the last pass completed.
    pub last_pass_at: Option<DateTime<Utc>>,
    /// Counts of the last completed pass.
    pub last_report: Option<PassReport>,
}

// =============================================================================
// Single-Flight Guard
// =============================================================================

/// Holds the in-flight flag; dropping it releases the flag.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// =============================================================================
// Sync Engine
// =============================================================================

/// Outbox drain with single-flight passes.
///
/// Each engine owns its guard, so independent engines never block each other.
pub struct SyncEngine {
    db: Database,
    credentials: Arc<dyn CredentialSource>,
    dispatch: DispatchTable,
    batch_size: u32,
    in_flight: AtomicBool,
    last_pass: RwLock<Option<(DateTime<Utc>, PassReport)>>,
}

impl SyncEngine {
    /// Creates an engine that reads credentials from the configuration record.
    pub fn new(db: Database, dispatch: DispatchTable) -> Self {
        let credentials: Arc<dyn CredentialSource> = Arc::new(db.clone());
        Self::with_credentials(db, credentials, dispatch)
    }

    /// Creates an engine with an injected credential source.
    pub fn with_credentials(
        db: Database,
        credentials: Arc<dyn CredentialSource>,
        dispatch: DispatchTable,
    ) -> Self {
        SyncEngine {
            db,
            credentials,
            dispatch,
            batch_size: DEFAULT_BATCH_SIZE,
            in_flight: AtomicBool::new(false),
            last_pass: RwLock::new(None),
        }
    }

    /// Overrides the batch size.
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Runs one pass over the oldest sendable entries.
    ///
    /// Per-entry send failures never fail the pass. An error is returned only
    /// when the outbox itself cannot be read.
    pub async fn run_once(&self) -> SyncResult<PassOutcome> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("Sync pass already running, skipping");
            return Ok(PassOutcome::AlreadyRunning);
        };

        let Some(credentials) = self.credentials.credentials().await? else {
            debug!("Device not linked to cloud, skipping sync pass");
            return Ok(PassOutcome::NotLinked);
        };

        let outbox = self.db.sync_outbox();
        let batch = outbox.get_sendable(self.batch_size).await?;

        let mut report = PassReport {
            attempted: batch.len(),
            ..Default::default()
        };

        if !batch.is_empty() {
            info!(count = batch.len(), "Processing outbox batch");
        }

        for entry in &batch {
            match self.dispatch.send_one(entry, &credentials).await {
                Ok(delivery) => {
                    if let Err(e) = outbox.mark_synced(&entry.id).await {
                        error!(error = %e, entry_id = %entry.id, "Failed to mark entry as synced");
                        continue;
                    }
                    debug!(
                        entry_id = %entry.id,
                        entity_kind = %entry.entity_kind,
                        unmapped = delivery == Delivery::Unmapped,
                        "Entry synced"
                    );
                    report.synced += 1;
                }
                Err(send_err) => {
                    warn!(
                        entry_id = %entry.id,
                        entity_kind = %entry.entity_kind,
                        attempts = entry.attempts + 1,
                        retryable = send_err.is_retryable(),
                        error = %send_err,
                        "Entry failed to sync"
                    );
                    if let Err(e) = outbox.mark_failed(&entry.id, &send_err.to_string()).await {
                        error!(error = %e, entry_id = %entry.id, "Failed to mark entry as failed");
                        continue;
                    }
                    report.failed += 1;
                }
            }
        }

        report.remaining = outbox.count_unsynced().await?;

        if report.attempted > 0 {
            info!(
                synced = report.synced,
                failed = report.failed,
                remaining = report.remaining,
                "Sync pass complete"
            );
        }

        *self.last_pass.write().await = Some((Utc::now(), report));
        Ok(PassOutcome::Completed(report))
    }

    /// Returns the current sync status.
    pub async fn status(&self) -> SyncResult<SyncStatus> {
        let outbox = self.db.sync_outbox();
        let last_pass = *self.last_pass.read().await;

        Ok(SyncStatus {
            pending_count: outbox.count_by_status(OutboxStatus::Pending).await?,
            failed_count: outbox.count_by_status(OutboxStatus::Failed).await?,
            in_flight: self.in_flight.load(Ordering::Acquire),
            last_pass_at: last_pass.map(|(at, _)| at),
            last_report: last_pass.map(|(_, report)| report),
        })
    }

    /// Returns the database this engine drains.
    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("dispatch", &self.dispatch)
            .field("batch_size", &self.batch_size)
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cloud::CloudClient;
    use crate::error::SyncError;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tally_core::{ConfigurationRecord, EntityKind, OutboxEntry, SyncAction, SyncPayload};
    use tally_db::DbConfig;
    use tokio::sync::Notify;

    /// In-process `Syncable` with scripted behavior.
    #[derive(Default)]
    pub(crate) struct ScriptedHandler {
        /// Entity ids in the order they were sent.
        pub sent: Mutex<Vec<String>>,
        /// Entity ids that always fail.
        pub fail_ids: HashSet<String>,
        /// The first N calls fail regardless of id.
        pub fail_first: usize,
        pub calls: AtomicUsize,
        /// Signalled when a send starts.
        pub entered: Option<Arc<Notify>>,
        /// Awaited before a send completes.
        pub gate: Option<Arc<Notify>>,
    }

    impl ScriptedHandler {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl crate::dispatch::Syncable for ScriptedHandler {
        async fn send(&self, entry: &OutboxEntry, _credentials: &CloudCredentials) -> SyncResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.sent.lock().unwrap().push(entry.entity_id.clone());

            if let Some(entered) = &self.entered {
                entered.notify_one();
            }
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }

            if call < self.fail_first || self.fail_ids.contains(&entry.entity_id) {
                return Err(SyncError::HttpStatus {
                    status: 500,
                    body: "scripted failure".into(),
                });
            }
            Ok(())
        }
    }

    pub(crate) async fn linked_db() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.configuration()
            .save(&ConfigurationRecord::linked("tok", "biz-1"))
            .await
            .unwrap();
        db
    }

    pub(crate) async fn queue_orders(db: &Database, count: usize) -> Vec<String> {
        let mut ids = Vec::new();
        for i in 1..=count {
            let id = format!("e{i}");
            db.sync_outbox()
                .queue_for_sync(
                    EntityKind::Order,
                    &id,
                    SyncAction::Create,
                    &SyncPayload::Order(json!({ "seq": i })),
                )
                .await
                .unwrap();
            ids.push(id);
        }
        ids
    }

    fn engine_with(db: &Database, handler: Arc<ScriptedHandler>) -> SyncEngine {
        let table = DispatchTable::empty().with_handler(EntityKind::Order, handler);
        SyncEngine::new(db.clone(), table)
    }

    async fn status_of(db: &Database, entity_id: &str) -> (OutboxStatus, i64) {
        let entries = db.sync_outbox().list_by_status(OutboxStatus::Pending).await.unwrap();
        let synced = db.sync_outbox().list_by_status(OutboxStatus::Synced).await.unwrap();
        let failed = db.sync_outbox().list_by_status(OutboxStatus::Failed).await.unwrap();
        entries
            .into_iter()
            .chain(synced)
            .chain(failed)
            .find(|e| e.entity_id == entity_id)
            .map(|e| (e.status, e.attempts))
            .unwrap()
    }

    #[tokio::test]
    async fn test_batch_takes_oldest_ten() {
        let db = linked_db().await;
        let ids = queue_orders(&db, 12).await;
        let handler = Arc::new(ScriptedHandler::default());
        let engine = engine_with(&db, handler.clone());

        let outcome = engine.run_once().await.unwrap();

        assert_eq!(handler.sent(), ids[..10].to_vec());
        assert_eq!(
            outcome,
            PassOutcome::Completed(PassReport {
                attempted: 10,
                synced: 10,
                failed: 0,
                remaining: 2,
            })
        );
        assert!(outcome.needs_follow_up());
        assert_eq!(status_of(&db, "e11").await, (OutboxStatus::Pending, 0));
        assert_eq!(status_of(&db, "e12").await, (OutboxStatus::Pending, 0));
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let db = linked_db().await;
        let ids = queue_orders(&db, 10).await;
        let handler = Arc::new(ScriptedHandler {
            fail_ids: HashSet::from(["e3".to_string()]),
            ..Default::default()
        });
        let engine = engine_with(&db, handler.clone());

        let outcome = engine.run_once().await.unwrap();

        assert_eq!(handler.calls(), 10);
        assert_eq!(status_of(&db, "e3").await, (OutboxStatus::Failed, 1));
        for id in ids.iter().filter(|id| *id != "e3") {
            assert_eq!(status_of(&db, id).await, (OutboxStatus::Synced, 0));
        }
        match outcome {
            PassOutcome::Completed(report) => {
                assert_eq!(report.synced, 9);
                assert_eq!(report.failed, 1);
                assert_eq!(report.remaining, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let failed = db.sync_outbox().list_by_status(OutboxStatus::Failed).await.unwrap();
        assert!(failed[0].last_error.as_deref().unwrap().contains("scripted failure"));
    }

    #[tokio::test]
    async fn test_failed_entries_retry_until_delivered() {
        let db = linked_db().await;
        queue_orders(&db, 1).await;
        let handler = Arc::new(ScriptedHandler {
            fail_first: 3,
            ..Default::default()
        });
        let engine = engine_with(&db, handler.clone());

        let mut passes = 0;
        while status_of(&db, "e1").await.0 != OutboxStatus::Synced {
            engine.run_once().await.unwrap();
            passes += 1;
            assert!(passes <= 4, "entry never delivered");
        }

        assert_eq!(passes, 4);
        assert_eq!(status_of(&db, "e1").await, (OutboxStatus::Synced, 3));
        assert_eq!(handler.calls(), 4);
    }

    #[tokio::test]
    async fn test_second_call_during_pass_is_noop() {
        let db = linked_db().await;
        queue_orders(&db, 2).await;
        let entered = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let handler = Arc::new(ScriptedHandler {
            entered: Some(entered.clone()),
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let engine = Arc::new(engine_with(&db, handler.clone()));

        let first = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run_once().await }
        });

        entered.notified().await;
        assert!(engine.status().await.unwrap().in_flight);
        assert_eq!(engine.run_once().await.unwrap(), PassOutcome::AlreadyRunning);
        assert_eq!(handler.calls(), 1);

        gate.notify_one();
        entered.notified().await;
        gate.notify_one();

        let outcome = first.await.unwrap().unwrap();
        assert!(matches!(outcome, PassOutcome::Completed(r) if r.synced == 2));
        assert_eq!(handler.calls(), 2);

        // Guard released: the next pass runs.
        assert!(matches!(
            engine.run_once().await.unwrap(),
            PassOutcome::Completed(r) if r.attempted == 0
        ));
        assert!(!engine.status().await.unwrap().in_flight);
    }

    #[tokio::test]
    async fn test_guard_released_after_error() {
        let db = linked_db().await;
        let engine = engine_with(&db, Arc::new(ScriptedHandler::default()));

        db.close().await;

        assert!(engine.run_once().await.is_err());
        assert!(!engine.in_flight.load(Ordering::SeqCst));
        assert!(engine.run_once().await.is_err());
    }

    #[tokio::test]
    async fn test_not_linked_is_noop() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        queue_orders(&db, 3).await;
        let handler = Arc::new(ScriptedHandler::default());
        let engine = engine_with(&db, handler.clone());

        assert_eq!(engine.run_once().await.unwrap(), PassOutcome::NotLinked);
        assert_eq!(handler.calls(), 0);
        assert_eq!(
            db.sync_outbox().count_by_status(OutboxStatus::Pending).await.unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn test_unmapped_kind_syncs_without_call() {
        let db = linked_db().await;
        db.sync_outbox()
            .queue_for_sync(
                EntityKind::TaxDocument,
                "t1",
                SyncAction::Create,
                &SyncPayload::TaxDocument(json!({"folio": 77})),
            )
            .await
            .unwrap();
        let handler = Arc::new(ScriptedHandler::default());
        let engine = engine_with(&db, handler.clone());

        engine.run_once().await.unwrap();

        assert_eq!(handler.calls(), 0);
        assert_eq!(status_of(&db, "t1").await, (OutboxStatus::Synced, 0));
    }

    #[tokio::test]
    async fn test_link_then_sync_against_cloud() {
        let server = MockServer::start_async().await;
        let orders = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/sync/orders")
                    .header("authorization", "Bearer tok-live")
                    .header("x-business-id", "biz-7");
                then.status(200);
            })
            .await;

        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let client = CloudClient::with_client(reqwest::Client::new(), &server.base_url()).unwrap();
        let engine = SyncEngine::new(db.clone(), DispatchTable::cloud(client));

        let (trigger, _rx) = crate::outbox::SyncTrigger::channel();
        crate::outbox::Outbox::new(db.clone(), trigger)
            .enqueue(
                EntityKind::Order,
                "o1",
                SyncAction::Create,
                SyncPayload::Order(json!({"total": 4200})),
            )
            .await;

        assert_eq!(engine.run_once().await.unwrap(), PassOutcome::NotLinked);
        assert_eq!(status_of(&db, "o1").await, (OutboxStatus::Pending, 0));
        orders.assert_hits_async(0).await;

        db.configuration()
            .save(&ConfigurationRecord::linked("tok-live", "biz-7"))
            .await
            .unwrap();

        engine.run_once().await.unwrap();

        assert_eq!(status_of(&db, "o1").await, (OutboxStatus::Synced, 0));
        orders.assert_hits_async(1).await;

        let status = engine.status().await.unwrap();
        assert_eq!(status.pending_count, 0);
        assert_eq!(status.failed_count, 0);
        assert_eq!(status.last_report.map(|r| r.synced), Some(1));
        assert!(status.last_pass_at.is_some());
    }

    #[tokio::test]
    async fn test_independent_engines_do_not_share_guard() {
        let a = linked_db().await;
        let b = linked_db().await;
        let entered = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        queue_orders(&a, 1).await;
        queue_orders(&b, 1).await;

        let slow = Arc::new(engine_with(
            &a,
            Arc::new(ScriptedHandler {
                entered: Some(entered.clone()),
                gate: Some(gate.clone()),
                ..Default::default()
            }),
        ));
        let fast = engine_with(&b, Arc::new(ScriptedHandler::default()));

        let running = tokio::spawn({
            let slow = slow.clone();
            async move { slow.run_once().await }
        });
        entered.notified().await;

        assert!(matches!(fast.run_once().await.unwrap(), PassOutcome::Completed(r) if r.synced == 1));

        gate.notify_one();
        assert!(running.await.unwrap().is_ok());
    }
}
