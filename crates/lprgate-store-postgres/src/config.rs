//! Connection pool settings for the PostgreSQL record store

use std::time::Duration;

/// Configuration for the PostgreSQL connection pool
///
/// The pool is built lazily: no connection is opened until the first query,
/// so a store can exist while the server is down. `acquire_timeout` bounds
/// how long any query waits for a connection, which is what keeps probes and
/// failed writes from hanging.
///
/// # Example
/// ```
/// use lprgate_store_postgres::PostgresStoreConfig;
/// use std::time::Duration;
///
/// let config = PostgresStoreConfig::default()
///     .with_max_connections(4)
///     .with_acquire_timeout(Duration::from_secs(3));
/// ```
#[derive(Debug, Clone)]
pub struct PostgresStoreConfig {
    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections kept open
    pub min_connections: u32,

    /// Timeout for acquiring a connection from the pool
    pub acquire_timeout: Duration,

    /// How long a connection can remain idle before being closed
    pub idle_timeout: Duration,

    /// Maximum lifetime of a connection
    pub max_lifetime: Duration,
}

impl Default for PostgresStoreConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            // Zero so that an unreachable server is never dialed in the background
            min_connections: 0,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

impl PostgresStoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}
