//! # Sync Types
//!
//! Core types of the offline-first sync subsystem.
//!
//! ## Outbox Entry Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       OutboxEntry State Machine                         │
//! │                                                                         │
//! │   enqueue                                                               │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  ┌─────────┐   send ok    ┌─────────┐                                  │
//! │  │ PENDING │─────────────►│ SYNCED  │  (terminal, never deleted)       │
//! │  └────┬────┘              └─────────┘                                  │
//! │       │ send failed            ▲                                        │
//! │       ▼                        │ retry ok                               │
//! │  ┌─────────┐───────────────────┘                                        │
//! │  │ FAILED  │◄──┐                                                        │
//! │  └────┬────┘   │ retry failed (attempts += 1)                           │
//! │       └────────┘                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::payload::SyncPayload;

// =============================================================================
// Entity Kind
// =============================================================================

/// The closed set of domain entities that propagate to the cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Order,
    Payment,
    Product,
    StaffUser,
    AuditLog,
    TaxDocument,
    Client,
}

impl EntityKind {
    /// Every entity kind, in declaration order.
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Order,
        EntityKind::Payment,
        EntityKind::Product,
        EntityKind::StaffUser,
        EntityKind::AuditLog,
        EntityKind::TaxDocument,
        EntityKind::Client,
    ];

    /// Returns the stored text form (e.g. `STAFF_USER`).
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Order => "ORDER",
            EntityKind::Payment => "PAYMENT",
            EntityKind::Product => "PRODUCT",
            EntityKind::StaffUser => "STAFF_USER",
            EntityKind::AuditLog => "AUDIT_LOG",
            EntityKind::TaxDocument => "TAX_DOCUMENT",
            EntityKind::Client => "CLIENT",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CoreError::unknown_variant("EntityKind", s))
    }
}

// =============================================================================
// Sync Action
// =============================================================================

/// The kind of mutation an outbox entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

impl SyncAction {
    /// Returns the stored text form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncAction::Create => "CREATE",
            SyncAction::Update => "UPDATE",
            SyncAction::Delete => "DELETE",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(SyncAction::Create),
            "UPDATE" => Ok(SyncAction::Update),
            "DELETE" => Ok(SyncAction::Delete),
            other => Err(CoreError::unknown_variant("SyncAction", other)),
        }
    }
}

// =============================================================================
// Outbox Status
// =============================================================================

/// Delivery status of an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    /// Enqueued, never attempted.
    Pending,
    /// Accepted by the cloud. Terminal.
    Synced,
    /// Last attempt failed; retried on the next pass.
    Failed,
}

impl OutboxStatus {
    /// Returns the stored text form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Synced => "SYNCED",
            OutboxStatus::Failed => "FAILED",
        }
    }

    /// Returns true once no transition can leave this status.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, OutboxStatus::Synced)
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OutboxStatus::Pending),
            "SYNCED" => Ok(OutboxStatus::Synced),
            "FAILED" => Ok(OutboxStatus::Failed),
            other => Err(CoreError::unknown_variant("OutboxStatus", other)),
        }
    }
}

// =============================================================================
// Outbox Entry
// =============================================================================

/// One pending mutation destined for the cloud.
///
/// `payload` is the encoded envelope captured at enqueue time. Retries send
/// this snapshot as-is; the domain row is never re-read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: String,
    pub entity_kind: EntityKind,
    /// Identifier of the affected domain row, opaque to the engine.
    pub entity_id: String,
    pub action: SyncAction,
    /// Encoded [`SyncPayload`] envelope.
    pub payload: String,
    pub status: OutboxStatus,
    /// Failed send attempts. Successful sends do not increment it.
    pub attempts: i64,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When a send was last attempted.
    pub attempted_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    /// Builds a fresh `PENDING` entry for a mutation that just happened.
    ///
    /// Fails when `payload` is tagged with a different kind than `entity_kind`.
    pub fn new(
        entity_kind: EntityKind,
        entity_id: impl Into<String>,
        action: SyncAction,
        payload: &SyncPayload,
    ) -> CoreResult<Self> {
        if payload.entity_kind() != entity_kind {
            return Err(CoreError::PayloadKindMismatch {
                expected: entity_kind,
                found: payload.entity_kind(),
            });
        }

        let now = Utc::now();
        Ok(OutboxEntry {
            id: Uuid::new_v4().to_string(),
            entity_kind,
            entity_id: entity_id.into(),
            action,
            payload: payload.encode()?,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
            attempted_at: None,
        })
    }

    /// Decodes the stored payload envelope.
    pub fn decode_payload(&self) -> CoreResult<SyncPayload> {
        SyncPayload::decode(&self.payload, self.entity_kind)
    }
}

// =============================================================================
// Configuration Record
// =============================================================================

/// Singleton record holding the cloud link for this device.
///
/// Written by the provisioning flow; the sync engine only reads it, fresh on
/// every pass, so credentials can be rotated while the process runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationRecord {
    pub cloud_token: Option<String>,
    pub business_id: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConfigurationRecord {
    /// Creates a linked record.
    pub fn linked(cloud_token: impl Into<String>, business_id: impl Into<String>) -> Self {
        ConfigurationRecord {
            cloud_token: Some(cloud_token.into()),
            business_id: Some(business_id.into()),
            updated_at: Some(Utc::now()),
        }
    }

    /// Returns credentials when both fields are present and non-empty.
    ///
    /// `None` means "device not linked yet", which is a normal state.
    pub fn credentials(&self) -> Option<CloudCredentials> {
        let token = self.cloud_token.as_deref().filter(|t| !t.is_empty())?;
        let business_id = self.business_id.as_deref().filter(|b| !b.is_empty())?;
        Some(CloudCredentials::new(token, business_id))
    }

    /// Returns true if the device is linked to a cloud business.
    pub fn is_linked(&self) -> bool {
        self.credentials().is_some()
    }
}

/// Bearer token and business identifier attached to every cloud request.
#[derive(Clone, PartialEq, Eq)]
pub struct CloudCredentials {
    pub token: String,
    pub business_id: String,
}

impl CloudCredentials {
    pub fn new(token: impl Into<String>, business_id: impl Into<String>) -> Self {
        CloudCredentials {
            token: token.into(),
            business_id: business_id.into(),
        }
    }
}

// Token stays out of logs.
impl fmt::Debug for CloudCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudCredentials")
            .field("token", &"<redacted>")
            .field("business_id", &self.business_id)
            .finish()
    }
}
