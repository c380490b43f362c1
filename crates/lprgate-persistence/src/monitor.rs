//! Promotion Monitor
//!
//! Periodically asks the [`StorageManager`] to promote the durable store and
//! drain the local buffer. Each tick runs in its own task, so an error or
//! even a panic inside a tick is logged and the timer keeps going.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval_at};
use tracing::{debug, error, info};

use crate::manager::StorageManager;

pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
pub const MIN_SYNC_INTERVAL_SECS: u64 = 10;

/// Monitor state, as reported by health endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorPhase {
    /// Waiting for the next tick, or probing
    Watching = 0,
    /// Copying buffered rows into the durable store
    Migrating = 1,
    /// Swapping the active store
    Promoting = 2,
}

impl From<u8> for MonitorPhase {
    fn from(value: u8) -> Self {
        match value {
            1 => MonitorPhase::Migrating,
            2 => MonitorPhase::Promoting,
            _ => MonitorPhase::Watching,
        }
    }
}

impl MonitorPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorPhase::Watching => "watching",
            MonitorPhase::Migrating => "migrating",
            MonitorPhase::Promoting => "promoting",
        }
    }
}

/// Timing of the background promotion check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Seconds between ticks (`DB_SYNC_INTERVAL_SECONDS`)
    pub interval_secs: u64,
    /// Floor applied to `interval_secs`
    pub min_interval_secs: u64,
    /// Bound on each liveness probe
    pub probe_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            min_interval_secs: MIN_SYNC_INTERVAL_SECS,
            probe_timeout_secs: 5,
        }
    }
}

impl SyncSettings {
    /// Effective tick interval, never below the floor
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(self.min_interval_secs).max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }
}

pub struct PromotionMonitor {
    manager: Arc<StorageManager>,
    interval: Duration,
}

impl PromotionMonitor {
    pub fn new(manager: Arc<StorageManager>, settings: &SyncSettings) -> Self {
        Self {
            manager,
            interval: settings.interval(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the monitor; the first check happens one interval from now
    pub fn spawn(self) -> JoinHandle<()> {
        info!(
            "Promotion monitor started (every {}s)",
            self.interval.as_secs()
        );

        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.interval;
            let mut ticker = interval_at(start, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let manager = Arc::clone(&self.manager);
                let tick = tokio::spawn(async move { manager.try_promote_and_migrate().await });

                match tick.await {
                    Ok(outcome) if outcome.promoted || outcome.migrated > 0 => {
                        info!(
                            "Promotion check: promoted={}, migrated={}",
                            outcome.promoted, outcome.migrated
                        );
                    }
                    Ok(_) => debug!("Promotion check: nothing to do"),
                    Err(e) => error!("Promotion check aborted: {}", e),
                }
            }
        })
    }
}
