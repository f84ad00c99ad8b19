//! # Tally Terminal
//!
//! Headless process that keeps a POS terminal's local store in step with
//! the cloud.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Terminal Startup                                  │
//! │                                                                         │
//! │  1. Initialize Logging                                                 │
//! │     • tracing-subscriber with env filter (RUST_LOG)                    │
//! │                                                                         │
//! │  2. Load Configuration                                                 │
//! │     • tally.toml, then TALLY_* environment overrides                   │
//! │                                                                         │
//! │  3. Open Database                                                      │
//! │     • SQLite with WAL mode, pending migrations applied                 │
//! │                                                                         │
//! │  4. Recovery                                                           │
//! │     • Linked device with an empty catalog pulls it from the cloud      │
//! │                                                                         │
//! │  5. Background Sync                                                    │
//! │     • Startup pass, periodic passes, periodic config push              │
//! │                                                                         │
//! │  6. Wait for Ctrl+C / SIGTERM                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tally_db::{Database, DbConfig};
use tally_sync::{
    start_background_sync, BackgroundSchedule, CloudClient, ConfigPush, DispatchTable,
    RecoveryEngine, SyncConfig, SyncEngine,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting Tally terminal...");

    let config = SyncConfig::load(None).context("Failed to load sync configuration")?;
    info!(
        cloud_url = %config.cloud_url(),
        interval_ms = config.sync.interval_ms,
        "Configuration loaded"
    );

    let db_path = config.database_path();
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
    }

    let db = Database::new(DbConfig::new(&db_path))
        .await
        .context("Failed to open local database")?;
    info!(path = %db_path.display(), "Database ready");

    let client = CloudClient::new(&config.cloud).context("Failed to build cloud client")?;

    bootstrap_catalog(&db, &client).await?;

    let engine = Arc::new(
        SyncEngine::new(db.clone(), DispatchTable::cloud(client.clone()))
            .batch_size(config.sync.batch_size),
    );
    let push = Arc::new(ConfigPush::new(db.clone(), client));
    let background = start_background_sync(
        engine.clone(),
        push,
        BackgroundSchedule::from_settings(&config.sync),
    );
    info!(tasks = background.task_count(), "Background sync running");

    shutdown_signal().await;

    match engine.status().await {
        Ok(status) => info!(
            pending = status.pending_count,
            failed = status.failed_count,
            "Outbox state at shutdown"
        ),
        Err(e) => warn!(error = %e, "Could not read outbox state"),
    }

    db.close().await;
    info!("Terminal shutdown complete");
    Ok(())
}

/// Pulls the cloud catalog into a linked device that has none yet.
///
/// A failed recovery is not fatal: the terminal keeps running on local data
/// and tries again on the next start.
async fn bootstrap_catalog(db: &Database, client: &CloudClient) -> anyhow::Result<()> {
    if !db.configuration().get().await?.is_linked() {
        info!("Device not linked to cloud, skipping recovery");
        return Ok(());
    }

    if db.products().count().await? > 0 {
        return Ok(());
    }

    let recovery = RecoveryEngine::new(db.clone(), client.clone());
    if !recovery.recover_from_cloud().await {
        warn!("Cloud recovery failed, continuing with local data");
    }

    Ok(())
}

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info,tally=debug,sqlx=warn";

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=tally_sync=trace` - Show trace for the sync crate only
/// - Default: INFO, DEBUG for tally crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
