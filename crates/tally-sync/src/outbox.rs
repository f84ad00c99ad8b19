//! # Outbox Writer
//!
//! The boundary domain write paths call after committing a local mutation.
//!
//! ## Enqueue Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Outbox::enqueue                                 │
//! │                                                                         │
//! │  caller (order finalized, product edited, ...)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT sync_outbox (status = PENDING)                                 │
//! │       │                                                                 │
//! │       ├── insert failed ──► error! logged, intent dropped, return      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncTrigger::nudge()  (try_send on a channel of capacity 1)           │
//! │       │                                                                 │
//! │       ├── slot free   ──► consumer task runs a pass soon               │
//! │       └── slot full   ──► a pass is already queued; nothing to do      │
//! │                                                                         │
//! │  The caller never waits for the network and never sees an error.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, warn};

use tally_core::{EntityKind, SyncAction, SyncPayload};
use tally_db::Database;

// =============================================================================
// Sync Trigger
// =============================================================================

/// Non-blocking request for a sync pass.
///
/// Clones share one channel. At most one nudge is ever buffered.
#[derive(Debug, Clone)]
pub struct SyncTrigger {
    tx: mpsc::Sender<()>,
}

impl SyncTrigger {
    /// Creates a trigger and the receiver its single consumer reads.
    pub fn channel() -> (SyncTrigger, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (SyncTrigger { tx }, rx)
    }

    /// Requests a pass without waiting.
    ///
    /// Returns false when a pass was already queued or the consumer is gone.
    pub fn nudge(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                debug!("Sync pass already queued");
                false
            }
            Err(TrySendError::Closed(())) => {
                warn!("Sync consumer stopped; nudge ignored");
                false
            }
        }
    }
}

// =============================================================================
// Outbox
// =============================================================================

/// Appends outbox entries and nudges the engine.
#[derive(Debug, Clone)]
pub struct Outbox {
    db: Database,
    trigger: SyncTrigger,
}

impl Outbox {
    pub fn new(db: Database, trigger: SyncTrigger) -> Self {
        Outbox { db, trigger }
    }

    /// Records a committed domain mutation for delivery to the cloud.
    ///
    /// Never fails the caller. If the entry cannot be stored it is logged
    /// and dropped; the domain write stands.
    pub async fn enqueue(
        &self,
        entity_kind: EntityKind,
        entity_id: &str,
        action: SyncAction,
        payload: SyncPayload,
    ) {
        let queued = self
            .db
            .sync_outbox()
            .queue_for_sync(entity_kind, entity_id, action, &payload)
            .await;

        match queued {
            Ok(entry) => {
                debug!(
                    entry_id = %entry.id,
                    entity_kind = %entity_kind,
                    entity_id = %entity_id,
                    "Outbox entry queued"
                );
                self.trigger.nudge();
            }
            Err(e) => {
                error!(
                    error = %e,
                    entity_kind = %entity_kind,
                    entity_id = %entity_id,
                    action = %action,
                    "Failed to queue outbox entry; sync intent lost"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tally_core::OutboxStatus;
    use tally_db::DbConfig;

    #[tokio::test]
    async fn test_enqueue_stores_pending_and_nudges() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (trigger, mut rx) = SyncTrigger::channel();
        let outbox = Outbox::new(db.clone(), trigger);

        outbox
            .enqueue(
                EntityKind::Order,
                "o1",
                SyncAction::Create,
                SyncPayload::Order(json!({"total": 1200})),
            )
            .await;

        let pending = db.sync_outbox().list_by_status(OutboxStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entity_id, "o1");
        assert_eq!(pending[0].attempts, 0);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_nudges_coalesce() {
        let (trigger, mut rx) = SyncTrigger::channel();

        assert!(trigger.nudge());
        assert!(!trigger.clone().nudge());

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_nudge_after_consumer_dropped() {
        let (trigger, rx) = SyncTrigger::channel();
        drop(rx);
        assert!(!trigger.nudge());
    }

    #[tokio::test]
    async fn test_enqueue_failure_is_swallowed() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (trigger, mut rx) = SyncTrigger::channel();
        let outbox = Outbox::new(db.clone(), trigger);

        // Mismatched payload kind.
        outbox
            .enqueue(
                EntityKind::Order,
                "o1",
                SyncAction::Create,
                SyncPayload::Payment(json!({})),
            )
            .await;

        // Store unavailable.
        db.close().await;
        outbox
            .enqueue(
                EntityKind::Client,
                "c1",
                SyncAction::Update,
                SyncPayload::Client(json!({})),
            )
            .await;

        assert!(rx.try_recv().is_err());
    }
}
