//! # tally-db: Local Durable Store for Tally POS
//!
//! SQLite storage for the offline-first sync subsystem, via sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Data Flow                              │
//! │                                                                         │
//! │  Domain write path          Sync engine / recovery / push              │
//! │       │                            │                                    │
//! │       ▼                            ▼                                    │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌──────────────────────┐  ┌──────────┐  │   │
//! │  │   │   Database    │    │  Repositories        │  │Migrations│  │   │
//! │  │   │   (pool.rs)   │    │                      │  │(embedded)│  │   │
//! │  │   │               │◄───│ SyncOutboxRepository │  │          │  │   │
//! │  │   │ SqlitePool    │    │ ConfigurationRepo    │  │ 001_...  │  │   │
//! │  │   │               │    │ ProductRepository    │  │          │  │   │
//! │  │   │               │    │ StaffUserRepository  │  │          │  │   │
//! │  │   └───────────────┘    └──────────────────────┘  └──────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tally.db (local file, WAL mode)                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The store knows nothing about the network.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/tally.db")).await?;
//! let pending = db.sync_outbox().get_sendable(10).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::configuration::ConfigurationRepository;
pub use repository::outbox::SyncOutboxRepository;
pub use repository::product::ProductRepository;
pub use repository::staff::StaffUserRepository;
