//! Self Instrumentation
//!
//! Periodically reports the relay's own destination counters as plaintext
//! carbon lines, written through a regular [`Connection`].

use crate::domain::ports::MetricsStore;
use crate::infrastructure::connection::Connection;
use crate::infrastructure::shutdown::ShutdownController;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Instrumentation reporter configuration.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Where to send the relay's own metrics
    pub graphite_addr: String,
    /// How often to report
    pub interval: Duration,
    /// Instance name, part of every metric name
    pub instance: String,
}

/// Reports counters from a [`MetricsStore`] to a carbon endpoint.
pub struct Reporter {
    config: ReporterConfig,
    metrics: Arc<dyn MetricsStore>,
}

impl Reporter {
    /// Create a reporter. Returns `None` when instrumentation is disabled
    /// (no address or a zero interval).
    pub fn new(config: ReporterConfig, metrics: Arc<dyn MetricsStore>) -> Option<Self> {
        if config.graphite_addr.is_empty() || config.interval.is_zero() {
            return None;
        }
        Some(Self { config, metrics })
    }

    /// Sanitize a destination address into a single metric node.
    pub fn metric_node(addr: &str) -> String {
        addr.chars()
            .map(|c| match c {
                '.' | ':' | ' ' | '/' => '_',
                c => c,
            })
            .collect()
    }

    /// Render every counter of every known destination.
    pub fn render(&self, timestamp: u64) -> Vec<String> {
        let mut lines = Vec::new();
        for dest in self.metrics.destinations() {
            let Some(counters) = self.metrics.counters(&dest) else {
                continue;
            };
            let node = Self::metric_node(&dest);
            for (name, value) in counters.named() {
                lines.push(format!(
                    "carbon-relay-ng.{}.destination.{}.{} {} {}",
                    self.config.instance, node, name, value, timestamp
                ));
            }
        }
        lines
    }

    /// Run until shutdown.
    ///
    /// The reporter's own connection reports into the same store, so its
    /// counters show up under the instrumentation address.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub async fn run(self, shutdown: ShutdownController) {
        let mut ticker = tokio::time::interval(self.config.interval);
        let mut conn: Option<Connection> = None;

        tracing::info!(
            "reporting instrumentation to {} every {:?}",
            self.config.graphite_addr,
            self.config.interval
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.wait() => break,
            }

            if let Some(c) = &conn {
                if !c.is_alive().await {
                    tracing::warn!("{} instrumentation connection down", c.addr());
                    conn = None;
                }
            }
            if conn.is_none() {
                match Connection::connect(
                    &self.config.graphite_addr,
                    self.metrics.clone(),
                    self.config.interval,
                )
                .await
                {
                    Ok(c) => conn = Some(c),
                    Err(e) => {
                        tracing::warn!("instrumentation: {}", e);
                        continue;
                    }
                }
            }

            let Some(c) = &conn else { continue };
            if let Err(e) = self.report(c).await {
                tracing::warn!("{} instrumentation report failed: {}", c.addr(), e);
            }
        }

        if let Some(c) = conn {
            Self::finish(c).await;
        }
    }

    /// Flush what is left, then close.
    async fn finish(conn: Connection) {
        if let Err(e) = conn.flush().await {
            tracing::warn!("{} final instrumentation flush failed: {}", conn.addr(), e);
        }
        if let Err(e) = conn.close().await {
            tracing::debug!("{} {}", conn.addr(), e);
        }
    }

    async fn report(&self, conn: &Connection) -> Result<(), crate::infrastructure::ConnError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        for line in self.render(now) {
            conn.write(line.as_str()).await?;
        }
        conn.flush().await
    }
}
