//! carbon-relay - plaintext metrics relay
//!
//! This is the composition root that wires together all the components.

use carbon_relay::adapters::inbound::LineServer;
use carbon_relay::adapters::outbound::DashMapMetricsStore;
use carbon_relay::application::RelayService;
use carbon_relay::config::{load_config, Config};
use carbon_relay::domain::ports::MetricsStore;
use carbon_relay::infrastructure::{
    shutdown_signal, PidFile, Reporter, ReporterConfig, ShutdownController,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

/// How long inbound clients get to disconnect after shutdown starts.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    tracing_subscriber::fmt()
        .with_max_level(cfg.tracing_level()?)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    runtime.enable_all();
    if cfg.max_procs > 0 {
        runtime.worker_threads(cfg.max_procs);
    }

    runtime.build()?.block_on(run(cfg))
}

async fn run(cfg: Config) -> anyhow::Result<()> {
    tracing::info!(
        "starting carbon-relay instance={} listen={}",
        cfg.instance,
        cfg.listen_addr
    );

    let max_age = cfg.bad_metrics_max_age()?;
    tracing::debug!(
        "validation legacy={} m20={} ordered={} max_age={:?}",
        cfg.validation_level_legacy,
        cfg.validation_level_m20,
        cfg.validate_order,
        max_age
    );
    if !cfg.init.is_empty() {
        tracing::warn!(
            "ignoring {} init commands; routes come from RELAY_ROUTES",
            cfg.init.len()
        );
    }
    if cfg.routes.is_empty() {
        tracing::warn!("no routes configured, every line will be discarded");
    }

    let _pid_file = match &cfg.pid_file {
        Some(path) => Some(PidFile::create(path)?),
        None => None,
    };

    // ===== COMPOSITION ROOT =====

    // 1. Counters shared by every connection
    let metrics: Arc<dyn MetricsStore> = Arc::new(DashMapMetricsStore::new());

    // 2. Destinations and routes
    let relay = Arc::new(RelayService::new(
        cfg.routes.clone(),
        cfg.first_only,
        metrics.clone(),
        cfg.destination_config(),
    ));

    let shutdown = ShutdownController::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    // 3. Self instrumentation
    let reporter = Reporter::new(
        ReporterConfig {
            graphite_addr: cfg.instrumentation.graphite_addr.clone(),
            interval: Duration::from_millis(cfg.instrumentation.graphite_interval),
            instance: cfg.instance.clone(),
        },
        metrics.clone(),
    );
    let reporter_task = reporter.map(|r| tokio::spawn(r.run(shutdown.clone())));

    // 4. Inbound listener, until shutdown
    let server = LineServer::new(relay.clone(), cfg.listen_addr.clone(), shutdown.clone());
    let result = server.run().await;
    if result.is_err() {
        shutdown.shutdown();
    }

    shutdown.wait_for_drain(DRAIN_TIMEOUT).await;
    relay.shutdown().await;
    if let Some(task) = reporter_task {
        let _ = task.await;
    }

    tracing::info!("carbon-relay stopped");
    result
}
