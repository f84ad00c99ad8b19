//! # Repository Module
//!
//! Repository implementations for the local store.
//!
//! ## Available Repositories
//!
//! - [`outbox::SyncOutboxRepository`] - Outbox queue: enqueue, batch fetch, status updates
//! - [`configuration::ConfigurationRepository`] - Singleton cloud link record
//! - [`product::ProductRepository`] - Product snapshot reads and idempotent upserts
//! - [`staff::StaffUserRepository`] - Staff snapshot reads and idempotent upserts

pub mod configuration;
pub mod outbox;
pub mod product;
pub mod staff;
