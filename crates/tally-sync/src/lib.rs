//! # tally-sync: Sync Engine for Tally POS
//!
//! This crate keeps a Tally POS terminal working offline and reconciles it
//! with the cloud once connectivity returns.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Architecture                                │
//! │                                                                         │
//! │  domain write path                                                     │
//! │       │ Outbox::enqueue (never blocks, never fails the caller)         │
//! │       ▼                                                                 │
//! │  ┌────────────────┐  nudge   ┌────────────────┐  send_one ┌─────────┐  │
//! │  │  sync_outbox   │ ───────► │   SyncEngine   │ ────────► │Dispatch │  │
//! │  │  (tally-db)    │ ◄─────── │  single-flight │           │ Table   │  │
//! │  └────────────────┘  status  └────────────────┘           └────┬────┘  │
//! │                                                                 │       │
//! │                                                                 ▼       │
//! │  ┌────────────────┐  GET /recovery          ┌──────────────────────┐   │
//! │  │ RecoveryEngine │ ◄────────────────────── │                      │   │
//! │  └────────────────┘                         │     Cloud API        │   │
//! │  ┌────────────────┐  POST /recovery-sync    │   (CloudClient)      │   │
//! │  │   ConfigPush   │ ──────────────────────► │                      │   │
//! │  └────────────────┘                         └──────────────────────┘   │
//! │                                                                         │
//! │  start_background_sync drives the engine and the push on timers.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Sync error types
//! - [`cloud`] - HTTP client for the cloud sync API
//! - [`dispatch`] - Entity kind to endpoint table
//! - [`outbox`] - Outbox writer and sync trigger
//! - [`engine`] - `SyncEngine` and its pass results
//! - [`recovery`] - Cloud to local catalog bootstrap
//! - [`push`] - Local to cloud catalog snapshot
//! - [`scheduler`] - Background tasks
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tally_sync::{
//!     start_background_sync, BackgroundSchedule, CloudClient, ConfigPush,
//!     DispatchTable, Outbox, SyncConfig, SyncEngine,
//! };
//!
//! let config = SyncConfig::load_or_default(None);
//! let client = CloudClient::new(&config.cloud)?;
//!
//! let engine = Arc::new(SyncEngine::new(db.clone(), DispatchTable::cloud(client.clone())));
//! let push = Arc::new(ConfigPush::new(db.clone(), client));
//! let background = start_background_sync(
//!     engine,
//!     push,
//!     BackgroundSchedule::from_settings(&config.sync),
//! );
//!
//! // Hand this to every domain write path.
//! let outbox = Outbox::new(db, background.trigger());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cloud;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod outbox;
pub mod push;
pub mod recovery;
pub mod scheduler;

// =============================================================================
// Re-exports
// =============================================================================

pub use cloud::{CatalogSnapshot, CloudClient};
pub use config::{CloudSettings, DatabaseSettings, SyncConfig, SyncSettings};
pub use dispatch::{endpoint_path, Delivery, DispatchTable, EndpointHandler, Syncable};
pub use engine::{CredentialSource, PassOutcome, PassReport, SyncEngine, SyncStatus};
pub use error::{SyncError, SyncResult};
pub use outbox::{Outbox, SyncTrigger};
pub use push::ConfigPush;
pub use recovery::{RecoveryEngine, RecoveryReport};
pub use scheduler::{start_background_sync, BackgroundSchedule, BackgroundSync};
