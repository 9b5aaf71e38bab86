//! DashMap Metrics Store
//!
//! Implements MetricsStore using DashMap for lock-free concurrent access.

use crate::domain::entities::DestinationCounters;
use crate::domain::ports::MetricsStore;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for a single destination.
#[derive(Debug, Default)]
pub struct DestinationMetrics {
    /// Lines fully written
    pub num_out: AtomicU64,
    /// Hard write errors
    pub num_err_write: AtomicU64,
    /// Truncated writes
    pub num_err_truncated: AtomicU64,
    /// Lines dropped while down
    pub num_dropped: AtomicU64,
}

impl DestinationMetrics {
    fn snapshot(&self) -> DestinationCounters {
        DestinationCounters {
            out: self.num_out.load(Ordering::Relaxed),
            err_write: self.num_err_write.load(Ordering::Relaxed),
            err_truncated: self.num_err_truncated.load(Ordering::Relaxed),
            dropped: self.num_dropped.load(Ordering::Relaxed),
        }
    }
}

/// DashMap-backed metrics store.
///
/// Each destination has its own entry of atomics, so increments from
/// different connections never contend on a lock.
pub struct DashMapMetricsStore {
    metrics: DashMap<String, DestinationMetrics>,
}

impl DashMapMetricsStore {
    /// Create a new metrics store.
    pub fn new() -> Self {
        Self {
            metrics: DashMap::new(),
        }
    }

    fn bump(&self, dest: &str, counter: impl Fn(&DestinationMetrics) -> &AtomicU64) {
        if let Some(m) = self.metrics.get(dest) {
            counter(m.value()).fetch_add(1, Ordering::Relaxed);
            return;
        }
        let entry = self.metrics.entry(dest.to_string()).or_default();
        counter(entry.value()).fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for DashMapMetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsStore for DashMapMetricsStore {
    fn record_out(&self, dest: &str) {
        self.bump(dest, |m| &m.num_out);
    }

    fn record_err_write(&self, dest: &str) {
        self.bump(dest, |m| &m.num_err_write);
    }

    fn record_err_truncated(&self, dest: &str) {
        self.bump(dest, |m| &m.num_err_truncated);
    }

    fn record_dropped(&self, dest: &str) {
        self.bump(dest, |m| &m.num_dropped);
    }

    fn counters(&self, dest: &str) -> Option<DestinationCounters> {
        self.metrics.get(dest).map(|m| m.snapshot())
    }

    fn destinations(&self) -> Vec<String> {
        let mut dests: Vec<String> = self.metrics.iter().map(|e| e.key().clone()).collect();
        dests.sort();
        dests
    }
}
