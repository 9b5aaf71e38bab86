//! Metrics Store Port
//!
//! Defines the counter interface a Connection reports write outcomes through.

use crate::domain::entities::DestinationCounters;

/// Store for per-destination relay counters.
///
/// This is an outbound port. Many connections increment it concurrently, so
/// implementations must be safe to share across tasks. Counters are keyed by
/// destination address.
pub trait MetricsStore: Send + Sync {
    /// A line was fully written to the destination's buffer.
    fn record_out(&self, dest: &str);

    /// A write to the destination failed with a hard error.
    fn record_err_write(&self, dest: &str);

    /// A write to the destination was accepted only partially.
    fn record_err_truncated(&self, dest: &str);

    /// A line was dropped because the destination had no live connection.
    fn record_dropped(&self, dest: &str);

    /// Current counters for a destination.
    fn counters(&self, dest: &str) -> Option<DestinationCounters>;

    /// All destinations with counters.
    fn destinations(&self) -> Vec<String>;
}
