//! DurableConnector backed by PostgresRecordStore

use std::sync::Arc;

use crate::{PostgresRecordStore, PostgresStoreConfig};
use lprgate_core::{ConnectionTarget, DurableConnector, DurableStore, Result};

/// Builds lazily-connected PostgreSQL stores for the persistence layer
#[derive(Debug, Clone, Default)]
pub struct PostgresConnector {
    config: PostgresStoreConfig,
}

impl PostgresConnector {
    pub fn new(config: PostgresStoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PostgresStoreConfig {
        &self.config
    }
}

impl DurableConnector for PostgresConnector {
    fn connect(&self, target: &ConnectionTarget) -> Result<Arc<dyn DurableStore>> {
        let store = PostgresRecordStore::connect_lazy(target, &self.config)?;
        Ok(Arc::new(store))
    }
}
