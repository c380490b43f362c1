//! Store traits
//!
//! Every physical store implements [`RecordStore`], the surface the HTTP layer
//! uses through a session. The two roles in the failover pair add to it:
//! - [`LocalStore`]: the embedded fallback, which can hand over and discard
//!   its buffered rows
//! - [`DurableStore`]: the system of record, which can import rows inside a
//!   single transaction ([`ImportTransaction`])

use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    ConnectionTarget, Result,
    record::{NewRecord, Record, RecordFilter, RecordId, StoreMode},
};

/// A unit of work bound to whichever store was active when it was issued
pub type StoreSession = Arc<dyn RecordStore>;

/// Record store trait
///
/// Implementations:
/// - `SqliteRecordStore`: embedded local fallback
/// - `PostgresRecordStore`: durable system of record
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Role this store plays in the failover pair
    fn mode(&self) -> StoreMode;

    /// Human-readable location (file path or redacted connection string)
    fn location(&self) -> String;

    /// Execute a trivial round-trip query
    ///
    /// # Errors
    /// - `Error::Database` when the store cannot be reached or answers with an error
    async fn ping(&self) -> Result<()>;

    /// Create the record table if it is missing
    ///
    /// Safe to call repeatedly.
    async fn ensure_schema(&self) -> Result<()>;

    /// Insert a record, letting the store assign its identity
    async fn insert(&self, record: &NewRecord) -> Result<Record>;

    /// Attach the stored image path to an existing record
    async fn attach_image(&self, id: RecordId, image_path: &str) -> Result<()>;

    /// Most recent record for `plate` with a timestamp at or after `since`
    async fn find_recent(&self, plate: &str, since: NaiveDateTime) -> Result<Option<Record>>;

    /// Records matching `filter`, newest first
    async fn query(&self, filter: &RecordFilter) -> Result<Vec<Record>>;
}

/// The embedded fallback store
#[async_trait]
pub trait LocalStore: RecordStore {
    /// All buffered records ordered by ascending identity
    async fn load_buffered(&self) -> Result<Vec<Record>>;

    /// Delete exactly the given records in one transaction
    ///
    /// Rows inserted after `load_buffered` are never touched.
    ///
    /// # Returns
    /// Number of rows deleted
    async fn discard(&self, ids: &[RecordId]) -> Result<u64>;
}

/// A store that can receive migrated records
#[async_trait]
pub trait DurableTarget: Send + Sync {
    /// Open a transaction for importing records
    async fn begin_import(&self) -> Result<Box<dyn ImportTransaction>>;
}

/// The durable system of record
pub trait DurableStore: RecordStore + DurableTarget {}

impl<T: RecordStore + DurableTarget> DurableStore for T {}

/// Import transaction against the durable store
///
/// Nothing is visible to other sessions until [`ImportTransaction::commit`].
/// Dropping the transaction without committing rolls it back.
#[async_trait]
pub trait ImportTransaction: Send {
    /// Every identity currently present in the record table
    async fn occupied_ids(&mut self) -> Result<HashSet<RecordId>>;

    /// Subset of `keys` already present as ingest keys
    async fn existing_keys(&mut self, keys: &[String]) -> Result<HashSet<String>>;

    /// Insert a record, preserving `id` when given, otherwise letting the
    /// store assign one
    ///
    /// # Returns
    /// The identity the row ended up with
    async fn insert(&mut self, record: &NewRecord, id: Option<RecordId>) -> Result<RecordId>;

    /// Move the identity sequence to at least the highest identity present
    async fn reconcile_sequence(&mut self) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Builds a durable store from a connection target without opening a session
pub trait DurableConnector: Send + Sync {
    fn connect(&self, target: &ConnectionTarget) -> Result<Arc<dyn DurableStore>>;
}
