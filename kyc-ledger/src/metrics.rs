//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `kyc_ledger_operations_total{operation,outcome}` - Dispatched operations
//! - `kyc_ledger_operation_duration_seconds{operation}` - Operation latency
//! - `kyc_ledger_history_entries_skipped_total` - Unreadable history entries
//!
//! Collectors are registered in a per-instance [`Registry`], so several
//! ledgers (or tests) can live in one process.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Operations by name and outcome (`ok` or an error kind)
    pub operations_total: IntCounterVec,

    /// Operation latency
    pub operation_duration: HistogramVec,

    /// History entries that failed to decode
    pub history_entries_skipped: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations_total = IntCounterVec::new(
            Opts::new("kyc_ledger_operations_total", "Dispatched ledger operations"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "kyc_ledger_operation_duration_seconds",
                "Histogram of operation latencies",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let history_entries_skipped = IntCounter::new(
            "kyc_ledger_history_entries_skipped_total",
            "History entries that could not be decoded",
        )?;
        registry.register(Box::new(history_entries_skipped.clone()))?;

        Ok(Self {
            operations_total,
            operation_duration,
            history_entries_skipped,
            registry,
        })
    }

    /// Record one dispatched operation
    pub fn record(&self, operation: &str, outcome: &str, elapsed: Duration) {
        self.operations_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.operation_duration
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }

    /// Count for one operation/outcome pair
    pub fn operation_count(&self, operation: &str, outcome: &str) -> u64 {
        self.operations_total
            .with_label_values(&[operation, outcome])
            .get()
    }

    /// Render in Prometheus text exposition format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
