mod dashmap_metrics_store;

pub use dashmap_metrics_store::{DashMapMetricsStore, DestinationMetrics};
