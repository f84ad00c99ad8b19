//! # Background Sync Scheduler
//!
//! Starts the long-lived tasks that keep the outbox draining.
//!
//! ## Task Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      start_background_sync                              │
//! │                                                                         │
//! │  startup nudge ──(startup_delay, once)──┐                              │
//! │  sync ticker   ──(every interval)───────┼──► SyncTrigger               │
//! │  Outbox::enqueue ───────────────────────┘    (mpsc, capacity 1)        │
//! │                                                    │                    │
//! │                                                    ▼                    │
//! │                        ┌──────────────► consumer task                  │
//! │                        │                engine.run_once()              │
//! │   follow-up timer ─────┘                       │                        │
//! │   (retry_delay, at most one armed) ◄── remaining > 0                    │
//! │                                                                         │
//! │  push ticker   ──(every push_multiplier × interval)──► ConfigPush      │
//! │                                                                         │
//! │  No shutdown path: tasks live as long as the runtime.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One consumer runs every pass, so scheduled passes never overlap each
//! other. The follow-up timer is owned by the consumer: a pass that leaves
//! entries behind arms it only when it is not already armed, and a pass that
//! drains the outbox disarms it. Direct callers of `run_once` are still covered by the engine's
//! single-flight guard.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use tally_core::{DEFAULT_RETRY_DELAY_MS, PUSH_INTERVAL_MULTIPLIER};

use crate::config::SyncSettings;
use crate::engine::{PassOutcome, SyncEngine};
use crate::outbox::SyncTrigger;
use crate::push::ConfigPush;

/// Shortest period accepted for the tickers.
const MIN_TICK: Duration = Duration::from_millis(10);

// =============================================================================
// Schedule
// =============================================================================

/// Timings of the background tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundSchedule {
    /// Cadence of scheduled passes.
    pub interval: Duration,
    /// Delay of the follow-up pass while entries remain.
    pub retry_delay: Duration,
    /// Delay of the first pass after startup.
    pub startup_delay: Duration,
    /// Cadence of the config push.
    pub push_interval: Duration,
}

impl BackgroundSchedule {
    /// Default timings around a sync interval.
    pub fn new(interval: Duration) -> Self {
        BackgroundSchedule {
            interval,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            startup_delay: Duration::from_secs(2),
            push_interval: interval.saturating_mul(PUSH_INTERVAL_MULTIPLIER),
        }
    }

    pub fn from_settings(settings: &SyncSettings) -> Self {
        BackgroundSchedule {
            interval: settings.interval(),
            retry_delay: settings.retry_delay(),
            startup_delay: settings.startup_delay(),
            push_interval: settings.push_interval(),
        }
    }

    /// Raises both ticker periods to at least 10 ms.
    ///
    /// `interval_at` panics on a zero period.
    pub fn clamped(self) -> Self {
        BackgroundSchedule {
            interval: self.interval.max(MIN_TICK),
            push_interval: self.push_interval.max(MIN_TICK),
            ..self
        }
    }
}

// =============================================================================
// Background Sync
// =============================================================================

/// Handle to the running background tasks.
///
/// Dropping it leaves the tasks running.
#[derive(Debug)]
pub struct BackgroundSync {
    trigger: SyncTrigger,
    tasks: Vec<JoinHandle<()>>,
}

impl BackgroundSync {
    /// Trigger to hand to [`crate::Outbox`] writers.
    pub fn trigger(&self) -> SyncTrigger {
        self.trigger.clone()
    }

    /// Number of spawned tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

/// Starts background sync for the lifetime of the process.
///
/// Must be called from within a Tokio runtime, once per process.
pub fn start_background_sync(
    engine: Arc<SyncEngine>,
    push: Arc<ConfigPush>,
    schedule: BackgroundSchedule,
) -> BackgroundSync {
    let requested = schedule;
    let schedule = schedule.clamped();
    if schedule != requested {
        warn!(
            interval_ms = requested.interval.as_millis() as u64,
            push_interval_ms = requested.push_interval.as_millis() as u64,
            min_ms = MIN_TICK.as_millis() as u64,
            "Ticker period below minimum, clamping"
        );
    }

    info!(
        interval_ms = schedule.interval.as_millis() as u64,
        retry_delay_ms = schedule.retry_delay.as_millis() as u64,
        push_interval_ms = schedule.push_interval.as_millis() as u64,
        "Starting background sync"
    );

    let (trigger, rx) = SyncTrigger::channel();

    let tasks = vec![
        tokio::spawn(run_consumer(engine, rx, schedule.retry_delay)),
        tokio::spawn(startup_nudge(trigger.clone(), schedule.startup_delay)),
        tokio::spawn(sync_ticker(trigger.clone(), schedule.interval)),
        tokio::spawn(push_ticker(push, schedule.push_interval)),
    ];

    BackgroundSync { trigger, tasks }
}

/// Runs one pass per nudge or follow-up.
async fn run_consumer(engine: Arc<SyncEngine>, mut rx: mpsc::Receiver<()>, retry_delay: Duration) {
    let follow_up = tokio::time::sleep(retry_delay);
    tokio::pin!(follow_up);
    let mut armed = false;

    loop {
        tokio::select! {
            nudge = rx.recv() => {
                if nudge.is_none() {
                    break;
                }
            }
            () = &mut follow_up, if armed => {
                armed = false;
            }
        }

        match engine.run_once().await {
            Ok(outcome) if outcome.needs_follow_up() => {
                if !armed {
                    debug!(?outcome, delay_ms = retry_delay.as_millis() as u64, "Scheduling follow-up pass");
                    follow_up.as_mut().reset(Instant::now() + retry_delay);
                    armed = true;
                }
            }
            Ok(PassOutcome::AlreadyRunning) => debug!("Pass already running"),
            Ok(outcome) => {
                armed = false;
                debug!(?outcome, "Sync pass finished");
            }
            Err(e) => error!(error = %e, "Sync pass failed"),
        }
    }
}

async fn startup_nudge(trigger: SyncTrigger, delay: Duration) {
    tokio::time::sleep(delay).await;
    debug!("Startup sync pass");
    trigger.nudge();
}

async fn sync_ticker(trigger: SyncTrigger, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        trigger.nudge();
    }
}

async fn push_ticker(push: Arc<ConfigPush>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        push.push_config_to_cloud().await;
    }
}
