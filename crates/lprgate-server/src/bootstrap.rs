//! Service assembly for the lprgate server
//!
//! Turns a merged [`ServerConfig`] into the shared application state:
//! - the local SQLite buffer and the storage manager around it
//! - the frontend allow-list
//! - the capture store and metrics
//! - the relay notifier, when a relay port is configured
//!
//! Nothing here touches the durable store; that happens in
//! [`StorageManager::initialize`].

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::access::AllowList;
use crate::app::AppState;
use crate::captures::CaptureStore;
use crate::config::ServerConfig;
use crate::metrics::Metrics;
use lprgate_notify::{NotifyError, RelayConfig, RelayNotifier};
use lprgate_persistence::StorageManager;
use lprgate_store_postgres::{PostgresConnector, PostgresStoreConfig};
use lprgate_store_sqlite::SqliteRecordStore;

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Local store error: {0}")]
    Storage(#[from] lprgate_core::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Relay error: {0}")]
    Relay(#[from] NotifyError),
}

/// Everything the router and the background tasks need
pub struct Services {
    pub state: AppState,
    pub allow_list: Arc<AllowList>,
}

impl Services {
    pub fn storage(&self) -> &Arc<StorageManager> {
        &self.state.storage
    }

    pub fn notifier(&self) -> Option<&Arc<RelayNotifier>> {
        self.state.notifier.as_ref()
    }
}

/// Build all services described by `config`
///
/// # Errors
/// - `BootstrapError::Storage` if the local database cannot be opened
/// - `BootstrapError::Relay` if the relay HTTP client cannot be created
pub async fn build(config: &ServerConfig) -> Result<Services, BootstrapError> {
    let local = Arc::new(SqliteRecordStore::open(&config.database.local_path).await?);

    // Probes and queries share the pool's acquire timeout
    let probe_timeout = config.sync.probe_timeout();
    let connector = PostgresConnector::new(
        PostgresStoreConfig::default()
            .with_max_connections(5)
            .with_acquire_timeout(probe_timeout),
    );
    let storage = Arc::new(
        StorageManager::new(
            local,
            config.database.postgres.clone(),
            Arc::new(connector),
        )
        .with_probe_timeout(probe_timeout),
    );

    let allow_list = build_allow_list(&config.access.allowed_ips);

    let captures = CaptureStore::new(config.captures.directory.clone());
    let metrics = Arc::new(Metrics::new()?);

    let mut state = AppState::new(storage, captures, metrics);
    if let Some(notifier) = build_notifier(config)? {
        state = state.with_notifier(Arc::new(notifier));
    }

    Ok(Services {
        state,
        allow_list: Arc::new(allow_list),
    })
}

fn build_allow_list(entries: &[String]) -> AllowList {
    let (allow_list, rejected) = AllowList::parse(entries);
    for entry in &rejected {
        warn!("Ignoring invalid FRONTEND_ALLOWED_IPS entry '{}'", entry);
    }
    if allow_list.is_empty() {
        info!("Frontend allow-list empty; records API open to all clients");
    } else {
        info!("Frontend allow-list: {} entr(ies)", allow_list.len());
    }
    allow_list
}

fn build_notifier(config: &ServerConfig) -> Result<Option<RelayNotifier>, NotifyError> {
    let Some(port) = config.relay.port else {
        info!("Relay notifications disabled (API_WHATSAPP_PORT not set)");
        return Ok(None);
    };

    let relay_config = RelayConfig::local(&config.relay.host, port, config.relay.recipients.clone());
    let notifier = RelayNotifier::new(relay_config)?;
    info!(
        "Relay notifications via {} to {}",
        notifier.base_url(),
        notifier.recipients_summary()
    );
    if !notifier.has_recipients() {
        warn!("DESTINO_ENTRADAS is empty; entry notifications will be skipped");
    }
    Ok(Some(notifier))
}

/// Interval between relay connectivity warnings
pub fn relay_alert_interval(config: &ServerConfig) -> Duration {
    Duration::from_secs(config.relay.alert_interval_secs.max(1))
}
