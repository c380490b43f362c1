//! lprgate persistence subsystem
//!
//! Keeps plate events flowing regardless of PostgreSQL's availability:
//! - Writes go to PostgreSQL when it answers and to a local SQLite buffer
//!   when it does not ([`ActiveStore`], [`StoreHandle`])
//! - A background [`PromotionMonitor`] probes PostgreSQL, drains the local
//!   buffer into it ([`migrate_buffered`]) and switches writes back
//! - [`ConnectionFactory`] turns environment settings into a connection
//!   target, refusing example passwords
//!
//! # Example
//! ```no_run
//! # use std::sync::Arc;
//! # use lprgate_persistence::{DurableSettings, PromotionMonitor, StorageManager, SyncSettings};
//! # use lprgate_store_postgres::PostgresConnector;
//! # use lprgate_store_sqlite::SqliteRecordStore;
//! # async fn example() -> lprgate_core::Result<()> {
//! let local = Arc::new(SqliteRecordStore::open("storage/lpr_local.db").await?);
//! let manager = Arc::new(StorageManager::new(
//!     local,
//!     DurableSettings::default(),
//!     Arc::new(PostgresConnector::default()),
//! ));
//! manager.initialize().await?;
//! PromotionMonitor::new(manager.clone(), &SyncSettings::default()).spawn();
//! # Ok(())
//! # }
//! ```

mod connection;
mod handle;
mod manager;
mod migration;
mod monitor;
mod registry;

#[cfg(test)]
mod testing;

pub use connection::{ConnectionFactory, DurableSettings, is_placeholder_password, percent_encode};
pub use handle::{DEFAULT_PROBE_TIMEOUT, Probe, StoreHandle};
pub use manager::{PromotionOutcome, StorageManager, StorageStats};
pub use migration::{MigrationReport, migrate_buffered};
pub use monitor::{
    DEFAULT_SYNC_INTERVAL_SECS, MIN_SYNC_INTERVAL_SECS, MonitorPhase, PromotionMonitor,
    SyncSettings,
};
pub use registry::ActiveStore;
