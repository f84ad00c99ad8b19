//! # tally-core: Pure Sync Types for Tally POS
//!
//! Every type the offline-first sync subsystem passes between the local
//! store and the cloud engine lives here, with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Sync Data Flow                         │
//! │                                                                         │
//! │  Domain write path (sale, payment, product edit, ...)                  │
//! │       │                                                                 │
//! │       │  Outbox::enqueue(kind, entity_id, action, payload)             │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────────┐  ┌─────────────┐  ┌──────────────────────┐   │   │
//! │  │   │ OutboxEntry │  │ SyncPayload │  │ ConfigurationRecord  │   │   │
//! │  │   │ EntityKind  │  │ (versioned  │  │ CloudCredentials     │   │   │
//! │  │   │ OutboxStatus│  │  envelope)  │  │                      │   │   │
//! │  │   └─────────────┘  └─────────────┘  └──────────────────────┘   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                  │                              │
//! │       ▼                                  ▼                              │
//! │  tally-db (sync_outbox table)      tally-sync (engine, recovery)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Outbox entry, entity kinds, statuses, configuration record
//! - [`payload`] - Versioned, tagged payload snapshots
//! - [`error`] - Domain error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod payload;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult};
pub use payload::{ProductRecord, StaffUserRecord, SyncPayload, PAYLOAD_SCHEMA_VERSION};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Primary key of the singleton configuration record.
pub const CONFIGURATION_RECORD_ID: &str = "default";

/// Number of outbox entries attempted per sync pass.
pub const DEFAULT_BATCH_SIZE: u32 = 10;

/// Delay before the follow-up pass when entries remain unsynced.
///
/// Fixed: it never grows across repeated failures.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;

/// Config push runs this many times less often than the sync pass.
pub const PUSH_INTERVAL_MULTIPLIER: u32 = 10;
