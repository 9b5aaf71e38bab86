//! Domain Entities - Core relay objects
//!
//! These entities have no I/O and contain only relay logic.

use serde::{Deserialize, Serialize};

/// A route: lines matching it are relayed to every one of its destinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Name of the route, used in logs
    pub key: String,
    /// Only lines starting with this prefix match (all lines when empty)
    #[serde(default)]
    pub prefix: Option<String>,
    /// Destination addresses (`host:port`)
    pub destinations: Vec<String>,
}

impl Route {
    /// Create a route matching every line.
    pub fn new(key: impl Into<String>, destinations: Vec<String>) -> Self {
        Self {
            key: key.into(),
            prefix: None,
            destinations,
        }
    }

    /// Restrict the route to lines starting with `prefix`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Check whether a metric line matches this route.
    pub fn matches(&self, line: &[u8]) -> bool {
        match &self.prefix {
            Some(prefix) if !prefix.is_empty() => line.starts_with(prefix.as_bytes()),
            _ => true,
        }
    }
}

/// Snapshot of a destination's relay counters.
///
/// `out`, `err_write` and `err_truncated` are mutually exclusive per write
/// attempt; `dropped` counts lines that never reached a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestinationCounters {
    /// Lines fully written
    pub out: u64,
    /// Hard write failures
    pub err_write: u64,
    /// Truncated writes
    pub err_truncated: u64,
    /// Lines dropped while the destination was down
    pub dropped: u64,
}

impl DestinationCounters {
    /// Counter names paired with their values, in reporting order.
    pub fn named(&self) -> [(&'static str, u64); 4] {
        [
            ("out", self.out),
            ("err_write", self.err_write),
            ("err_truncated", self.err_truncated),
            ("dropped", self.dropped),
        ]
    }
}
