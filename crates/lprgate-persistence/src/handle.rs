//! Store Handle and liveness probe

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use lprgate_core::{
    DurableStore, LocalStore, RecordStore, StoreMode, StoreSession, diagnostics::describe_error,
};

/// Default bound on a single liveness probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a liveness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub reachable: bool,
    /// Normalized reason when unreachable
    pub diagnostic: Option<String>,
}

impl Probe {
    pub fn reachable() -> Self {
        Self {
            reachable: true,
            diagnostic: None,
        }
    }

    pub fn unreachable(diagnostic: impl Into<String>) -> Self {
        Self {
            reachable: false,
            diagnostic: Some(diagnostic.into()),
        }
    }
}

/// One physical store together with the role it plays
///
/// The store and its mode travel together so the registry can never pair a
/// store with the wrong mode.
#[derive(Clone)]
pub struct StoreHandle {
    store: Arc<dyn RecordStore>,
    mode: StoreMode,
}

impl StoreHandle {
    pub fn local(store: Arc<dyn LocalStore>) -> Self {
        Self {
            store,
            mode: StoreMode::Local,
        }
    }

    pub fn durable(store: Arc<dyn DurableStore>) -> Self {
        Self {
            store,
            mode: StoreMode::Durable,
        }
    }

    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    pub fn location(&self) -> String {
        self.store.location()
    }

    /// A new session bound to this store
    pub fn session(&self) -> StoreSession {
        Arc::clone(&self.store)
    }

    /// Round-trip a trivial query, bounded by `timeout`
    ///
    /// Never fails: any error, including the timeout, becomes an unreachable
    /// probe with a normalized diagnostic.
    pub async fn probe(&self, timeout: Duration) -> Probe {
        match tokio::time::timeout(timeout, self.store.ping()).await {
            Ok(Ok(())) => Probe::reachable(),
            Ok(Err(e)) => Probe::unreachable(describe_error(&e)),
            Err(_) => Probe::unreachable(format!(
                "no response from {} within {}s",
                self.mode,
                timeout.as_secs_f32()
            )),
        }
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("mode", &self.mode)
            .field("location", &self.store.location())
            .finish()
    }
}
