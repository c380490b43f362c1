//! lprgate Core Types and Traits
//!
//! This crate provides the fundamental types and traits shared by the
//! lprgate stores, the persistence subsystem and the HTTP server:
//! - The plate-event record model and query filters
//! - Store trait abstractions (local buffer, durable target)
//! - Core error types and database diagnostic normalization

pub mod connection;
pub mod diagnostics;
pub mod error;
pub mod record;
pub mod store;

pub use connection::ConnectionTarget;
pub use error::{Error, Result};
pub use record::{NewRecord, Record, RecordFilter, RecordId, StoreMode};
pub use store::{
    DurableConnector, DurableStore, DurableTarget, ImportTransaction, LocalStore, RecordStore,
    StoreSession,
};
