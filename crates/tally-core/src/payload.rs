//! # Sync Payloads
//!
//! Snapshot of a domain row, captured when its mutation is enqueued.
//!
//! ## Stored Envelope
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sync_outbox.payload                                                    │
//! │                                                                         │
//! │  {                                                                      │
//! │    "schemaVersion": 1,          ← rejected if this build can't read it │
//! │    "kind": "ORDER",             ← must equal sync_outbox.entity_kind   │
//! │    "data": { ...snapshot... }   ← sent to the cloud as `data`          │
//! │  }                                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Orders, payments, audit logs, tax documents and clients are owned by
//! other write paths and travel as opaque JSON. Products and staff users
//! are typed because recovery and config push read and write their tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::types::EntityKind;

/// Envelope schema version written by this build.
pub const PAYLOAD_SCHEMA_VERSION: u32 = 1;

// =============================================================================
// Typed Records
// =============================================================================

/// Product row as exchanged with the cloud.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub local_id: String,
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub price_cents: i64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub stock: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Staff user row as exchanged with the cloud.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffUserRecord {
    pub local_id: String,
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub pin_hash: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

// =============================================================================
// Sync Payload
// =============================================================================

/// Tagged snapshot, one variant per [`EntityKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum SyncPayload {
    Order(Value),
    Payment(Value),
    Product(ProductRecord),
    StaffUser(StaffUserRecord),
    AuditLog(Value),
    TaxDocument(Value),
    Client(Value),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    schema_version: u32,
    kind: EntityKind,
    data: Value,
}

impl SyncPayload {
    /// Returns the entity kind this payload describes.
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            SyncPayload::Order(_) => EntityKind::Order,
            SyncPayload::Payment(_) => EntityKind::Payment,
            SyncPayload::Product(_) => EntityKind::Product,
            SyncPayload::StaffUser(_) => EntityKind::StaffUser,
            SyncPayload::AuditLog(_) => EntityKind::AuditLog,
            SyncPayload::TaxDocument(_) => EntityKind::TaxDocument,
            SyncPayload::Client(_) => EntityKind::Client,
        }
    }

    /// Returns the snapshot as the JSON sent in the request's `data` field.
    pub fn data(&self) -> CoreResult<Value> {
        let value = match self {
            SyncPayload::Order(v)
            | SyncPayload::Payment(v)
            | SyncPayload::AuditLog(v)
            | SyncPayload::TaxDocument(v)
            | SyncPayload::Client(v) => v.clone(),
            SyncPayload::Product(product) => serde_json::to_value(product)?,
            SyncPayload::StaffUser(staff) => serde_json::to_value(staff)?,
        };
        Ok(value)
    }

    /// Encodes the payload as a versioned envelope for the outbox column.
    pub fn encode(&self) -> CoreResult<String> {
        let envelope = Envelope {
            schema_version: PAYLOAD_SCHEMA_VERSION,
            kind: self.entity_kind(),
            data: self.data()?,
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    /// Decodes an envelope stored for an entry of kind `expected`.
    ///
    /// ## Rejected
    /// - Unknown `schemaVersion`
    /// - `kind` different from `expected`
    /// - `data` that does not fit a typed record
    pub fn decode(raw: &str, expected: EntityKind) -> CoreResult<Self> {
        let envelope: Envelope = serde_json::from_str(raw)?;

        if envelope.schema_version != PAYLOAD_SCHEMA_VERSION {
            return Err(CoreError::UnsupportedPayloadVersion {
                found: envelope.schema_version,
                supported: PAYLOAD_SCHEMA_VERSION,
            });
        }

        if envelope.kind != expected {
            return Err(CoreError::PayloadKindMismatch {
                expected,
                found: envelope.kind,
            });
        }

        let data = envelope.data;
        let payload = match envelope.kind {
            EntityKind::Order => SyncPayload::Order(data),
            EntityKind::Payment => SyncPayload::Payment(data),
            EntityKind::Product => SyncPayload::Product(serde_json::from_value(data)?),
            EntityKind::StaffUser => SyncPayload::StaffUser(serde_json::from_value(data)?),
            EntityKind::AuditLog => SyncPayload::AuditLog(data),
            EntityKind::TaxDocument => SyncPayload::TaxDocument(data),
            EntityKind::Client => SyncPayload::Client(data),
        };
        Ok(payload)
    }
}
