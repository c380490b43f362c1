//! StorageManager - the persistence subsystem's public face
//!
//! Owns the local store, the connection factory and the registry, and
//! implements initialization and promotion on top of them.

use serde::Serialize;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::connection::{ConnectionFactory, DurableSettings};
use crate::handle::{DEFAULT_PROBE_TIMEOUT, StoreHandle};
use crate::migration::migrate_buffered;
use crate::monitor::MonitorPhase;
use crate::registry::ActiveStore;
use lprgate_core::{
    ConnectionTarget, DurableConnector, DurableStore, LocalStore, Result, StoreMode, StoreSession,
    diagnostics::describe_error,
};

/// Result of [`StorageManager::try_promote_and_migrate`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PromotionOutcome {
    /// The registry was switched to the durable store by this call
    pub promoted: bool,
    /// Records moved out of the local store by this call
    pub migrated: u64,
}

/// Counters exposed to metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub promotions: u64,
    pub records_migrated: u64,
    pub migration_failures: u64,
    pub probe_failures: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    promotions: AtomicU64,
    records_migrated: AtomicU64,
    migration_failures: AtomicU64,
    probe_failures: AtomicU64,
}

/// Resets the phase when a promotion attempt ends, including by panic
struct PhaseGuard<'a>(&'a AtomicU8);

impl<'a> PhaseGuard<'a> {
    fn enter(phase: &'a AtomicU8, to: MonitorPhase) -> Self {
        phase.store(to as u8, Ordering::Release);
        Self(phase)
    }

    fn set(&self, to: MonitorPhase) {
        self.0.store(to as u8, Ordering::Release);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.0.store(MonitorPhase::Watching as u8, Ordering::Release);
    }
}

pub struct StorageManager {
    local: Arc<dyn LocalStore>,
    factory: ConnectionFactory,
    connector: Arc<dyn DurableConnector>,
    registry: ActiveStore,
    target: RwLock<Option<ConnectionTarget>>,
    durable: RwLock<Option<Arc<dyn DurableStore>>>,
    /// Serializes promotion attempts; never held by readers
    promotion: Mutex<()>,
    probe_timeout: Duration,
    phase: AtomicU8,
    stats: StatsCounters,
}

impl StorageManager {
    pub fn new(
        local: Arc<dyn LocalStore>,
        settings: DurableSettings,
        connector: Arc<dyn DurableConnector>,
    ) -> Self {
        Self {
            local,
            factory: ConnectionFactory::new(settings),
            connector,
            registry: ActiveStore::new(),
            target: RwLock::new(None),
            durable: RwLock::new(None),
            promotion: Mutex::new(()),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            phase: AtomicU8::new(MonitorPhase::Watching as u8),
            stats: StatsCounters::default(),
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// First-time setup
    ///
    /// Creates the local schema, then activates the durable store if it is
    /// configured, reachable and its schema can be created; otherwise the
    /// local store.
    ///
    /// # Errors
    /// - `Error::Database` / `Error::Io` if the local store cannot be prepared
    pub async fn initialize(&self) -> Result<StoreMode> {
        self.local.ensure_schema().await?;

        if let Some(durable) = self.resolve_durable() {
            let handle = StoreHandle::durable(Arc::clone(&durable));
            let probe = handle.probe(self.probe_timeout).await;
            if probe.reachable {
                match durable.ensure_schema().await {
                    Ok(()) => {
                        self.registry.set_active(handle);
                        info!("Initial active store: PostgreSQL");
                        return Ok(StoreMode::Durable);
                    }
                    Err(e) => warn!(
                        "PostgreSQL reachable but schema setup failed: {}",
                        describe_error(&e)
                    ),
                }
            } else {
                self.stats.probe_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "PostgreSQL unavailable at startup: {}",
                    probe.diagnostic.unwrap_or_default()
                );
            }
        }

        self.registry
            .set_active(StoreHandle::local(Arc::clone(&self.local)));
        info!(
            "Initial active store: local SQLite ({})",
            self.local.location()
        );
        Ok(StoreMode::Local)
    }

    /// Probe the durable store and, if it answers, drain the local buffer
    /// into it and make it the active store
    ///
    /// Safe to call at any time; concurrent calls wait for each other.
    pub async fn try_promote_and_migrate(&self) -> PromotionOutcome {
        let _serialized = self.promotion.lock().await;

        let Some(durable) = self.resolve_durable() else {
            return PromotionOutcome::default();
        };

        let handle = StoreHandle::durable(Arc::clone(&durable));
        let probe = handle.probe(self.probe_timeout).await;
        if !probe.reachable {
            self.stats.probe_failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                "PostgreSQL still unavailable: {}",
                probe.diagnostic.unwrap_or_default()
            );
            return PromotionOutcome::default();
        }

        if let Err(e) = durable.ensure_schema().await {
            warn!("PostgreSQL schema setup failed: {}", describe_error(&e));
            return PromotionOutcome::default();
        }

        let phase = PhaseGuard::enter(&self.phase, MonitorPhase::Migrating);
        let report = migrate_buffered(self.local.as_ref(), durable.as_ref()).await;
        if report.failed {
            self.stats.migration_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.stats
            .records_migrated
            .fetch_add(report.migrated, Ordering::Relaxed);

        phase.set(MonitorPhase::Promoting);
        let promoted = if self.registry.mode() != Some(StoreMode::Durable) {
            self.registry.set_active(handle);
            self.stats.promotions.fetch_add(1, Ordering::Relaxed);
            info!("Active store switched to PostgreSQL");
            true
        } else {
            false
        };

        PromotionOutcome {
            promoted,
            migrated: report.migrated,
        }
    }

    /// Mode of the active store, `None` before [`StorageManager::initialize`]
    pub fn mode(&self) -> Option<StoreMode> {
        self.registry.mode()
    }

    /// A session on the active store
    ///
    /// # Errors
    /// - `Error::NotInitialized` before [`StorageManager::initialize`]
    pub fn session(&self) -> Result<StoreSession> {
        self.registry.session()
    }

    /// Probe the durable store; `false` when none is configured
    pub async fn durable_reachable(&self) -> bool {
        match self.resolve_durable() {
            Some(durable) => {
                StoreHandle::durable(durable)
                    .probe(self.probe_timeout)
                    .await
                    .reachable
            }
            None => false,
        }
    }

    pub fn local_location(&self) -> String {
        self.local.location()
    }

    pub fn phase(&self) -> MonitorPhase {
        MonitorPhase::from(self.phase.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            promotions: self.stats.promotions.load(Ordering::Relaxed),
            records_migrated: self.stats.records_migrated.load(Ordering::Relaxed),
            migration_failures: self.stats.migration_failures.load(Ordering::Relaxed),
            probe_failures: self.stats.probe_failures.load(Ordering::Relaxed),
        }
    }

    pub fn connection_factory(&self) -> &ConnectionFactory {
        &self.factory
    }

    /// The durable store, building it on first use
    ///
    /// Settings are read once; a target derived earlier is reused.
    fn resolve_durable(&self) -> Option<Arc<dyn DurableStore>> {
        if let Some(store) = self
            .durable
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
        {
            return Some(Arc::clone(store));
        }

        let known = self
            .target
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let target = match known {
            Some(target) => target,
            None => {
                let target = self.factory.target()?;
                *self
                    .target
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(target.clone());
                target
            }
        };

        match self.connector.connect(&target) {
            Ok(store) => {
                let mut slot = self
                    .durable
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                Some(Arc::clone(slot.get_or_insert(store)))
            }
            Err(e) => {
                warn!(
                    "Failed to create PostgreSQL client for {}: {}",
                    target.redacted(),
                    describe_error(&e)
                );
                None
            }
        }
    }
}
