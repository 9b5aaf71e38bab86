//! carbon-relay library
//!
//! This module exposes the relay components for use in integration tests
//! and as a library.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use adapters::inbound::LineServer;
pub use adapters::outbound::DashMapMetricsStore;
pub use application::{Destination, DestinationConfig, DestinationHandle, RelayService};
pub use config::load_config;
pub use domain::entities::{DestinationCounters, Route};
pub use domain::ports::MetricsStore;
pub use infrastructure::{ConnError, Connection, ShutdownController};
