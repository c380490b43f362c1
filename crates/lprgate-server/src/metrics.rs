//! Metrics collection with Prometheus
//!
//! This module provides Prometheus metrics for lprgate:
//! - Webhook event counts by outcome
//! - Stored capture count
//! - Active store and persistence subsystem counters

use lprgate_core::StoreMode;
use lprgate_persistence::StorageStats;
use prometheus::{CounterVec, IntCounter, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Metrics collector for lprgate
#[derive(Clone)]
pub struct Metrics {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Webhook plate events by outcome (stored, duplicate, invalid, error)
    pub events_total: CounterVec,
    /// Capture images written to disk
    pub captures_stored: IntCounter,

    /// Active store (0=uninitialized, 1=local, 2=durable)
    pub active_store: IntGauge,
    /// Successful promotions to the durable store
    pub promotions: IntGauge,
    /// Records migrated from the local buffer
    pub records_migrated: IntGauge,
    /// Failed migration runs
    pub migration_failures: IntGauge,
    /// Failed durable liveness probes
    pub probe_failures: IntGauge,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let events_total = CounterVec::new(
            Opts::new("lprgate_events_total", "Plate events received by outcome"),
            &["outcome"],
        )?;
        let captures_stored =
            IntCounter::new("lprgate_captures_stored_total", "Capture images stored")?;

        let active_store = IntGauge::new(
            "lprgate_active_store",
            "Active store (0=uninitialized, 1=local, 2=durable)",
        )?;
        let promotions = IntGauge::new(
            "lprgate_promotions_total",
            "Promotions to the durable store",
        )?;
        let records_migrated = IntGauge::new(
            "lprgate_records_migrated_total",
            "Records migrated from the local buffer",
        )?;
        let migration_failures = IntGauge::new(
            "lprgate_migration_failures_total",
            "Failed migration runs",
        )?;
        let probe_failures = IntGauge::new(
            "lprgate_probe_failures_total",
            "Failed durable store liveness probes",
        )?;

        registry.register(Box::new(events_total.clone()))?;
        registry.register(Box::new(captures_stored.clone()))?;
        registry.register(Box::new(active_store.clone()))?;
        registry.register(Box::new(promotions.clone()))?;
        registry.register(Box::new(records_migrated.clone()))?;
        registry.register(Box::new(migration_failures.clone()))?;
        registry.register(Box::new(probe_failures.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            events_total,
            captures_stored,
            active_store,
            promotions,
            records_migrated,
            migration_failures,
            probe_failures,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_event(&self, outcome: &str) {
        self.events_total.with_label_values(&[outcome]).inc();
    }

    /// Copy persistence counters into the gauges before a scrape
    pub fn observe_storage(&self, mode: Option<StoreMode>, stats: &StorageStats) {
        self.active_store.set(match mode {
            None => 0,
            Some(StoreMode::Local) => 1,
            Some(StoreMode::Durable) => 2,
        });
        self.promotions.set(stats.promotions as i64);
        self.records_migrated.set(stats.records_migrated as i64);
        self.migration_failures.set(stats.migration_failures as i64);
        self.probe_failures.set(stats.probe_failures as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::TextEncoder;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.record_event("stored");
        metrics.record_event("stored");
        metrics.record_event("duplicate");

        assert_eq!(
            metrics.events_total.with_label_values(&["stored"]).get(),
            2.0
        );
    }

    #[test]
    fn test_observe_storage() {
        let metrics = Metrics::new().unwrap();
        let stats = StorageStats {
            promotions: 1,
            records_migrated: 12,
            migration_failures: 0,
            probe_failures: 3,
        };
        metrics.observe_storage(Some(StoreMode::Durable), &stats);

        let body = TextEncoder::new()
            .encode_to_string(&metrics.registry().gather())
            .unwrap();
        assert!(body.contains("lprgate_active_store 2"));
        assert!(body.contains("lprgate_records_migrated_total 12"));
        assert!(body.contains("lprgate_probe_failures_total 3"));
    }
}
