//! Embedded SQLite store for lprgate
//!
//! This crate implements the `LocalStore` trait on a single SQLite file. It is
//! the fallback the gateway writes to whenever PostgreSQL is unreachable, and
//! the buffer that is drained into PostgreSQL once it comes back.
//!
//! # Features
//! - WAL journal with `synchronous = NORMAL`
//! - `AUTOINCREMENT` identities, so ids of drained rows are never reused
//! - In-place schema upgrade for files written by older deployments
//!
//! # Example
//! ```no_run
//! # use lprgate_store_sqlite::SqliteRecordStore;
//! # async fn example() -> lprgate_core::Result<()> {
//! let store = SqliteRecordStore::open("storage/lpr_local.db").await?;
//! # Ok(())
//! # }
//! ```

mod sqlite_record_store;

pub use sqlite_record_store::SqliteRecordStore;
