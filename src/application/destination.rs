//! Destination - one configured downstream relay target
//!
//! A destination owns at most one [`Connection`] at a time. It checks
//! liveness before relaying every line, throws a dead connection away and
//! dials a fresh one on the next reconnect tick. Lines that arrive while no
//! connection is up are counted as dropped.

use crate::domain::ports::MetricsStore;
use crate::infrastructure::{ConnError, Connection};
use bytes::BytesMut;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

/// Destination configuration.
#[derive(Debug, Clone)]
pub struct DestinationConfig {
    /// Flush period handed to every connection
    pub flush_interval: Duration,
    /// How often to redial while down
    pub reconnect_interval: Duration,
    /// Lines buffered between the router and the destination task
    pub queue_size: usize,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(1000),
            reconnect_interval: Duration::from_secs(10),
            queue_size: 1024,
        }
    }
}

/// Destination errors.
#[derive(Debug, thiserror::Error)]
pub enum DestinationError {
    /// The destination task is gone
    #[error("destination {0} is stopped")]
    Stopped(String),
    /// The live connection failed
    #[error(transparent)]
    Conn(#[from] ConnError),
}

enum Command {
    Line(BytesMut),
    Flush(oneshot::Sender<Result<(), ConnError>>),
    IsAlive(oneshot::Sender<bool>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle to a running destination.
#[derive(Clone)]
pub struct DestinationHandle {
    addr: Arc<str>,
    tx: mpsc::Sender<Command>,
}

impl DestinationHandle {
    /// Destination address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn stopped(&self) -> DestinationError {
        DestinationError::Stopped(self.addr.to_string())
    }

    /// Queue one line for relaying.
    pub async fn send(&self, line: impl Into<BytesMut>) -> Result<(), DestinationError> {
        self.tx
            .send(Command::Line(line.into()))
            .await
            .map_err(|_| self.stopped())
    }

    /// Whether the destination currently has a live connection.
    pub async fn is_alive(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Command::IsAlive(tx)).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Flush the live connection. Succeeds when there is none.
    pub async fn flush(&self) -> Result<(), DestinationError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(tx))
            .await
            .map_err(|_| self.stopped())?;
        Ok(rx.await.map_err(|_| self.stopped())??)
    }

    /// Flush and close the connection, then stop the destination task.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }
}

/// Destination task state.
pub struct Destination {
    addr: String,
    metrics: Arc<dyn MetricsStore>,
    config: DestinationConfig,
    conn: Option<Connection>,
}

impl Destination {
    /// Start a destination task and return its handle.
    pub fn spawn(
        addr: impl Into<String>,
        metrics: Arc<dyn MetricsStore>,
        config: DestinationConfig,
    ) -> DestinationHandle {
        let addr = addr.into();
        let (tx, rx) = mpsc::channel(config.queue_size.max(1));
        let handle = DestinationHandle {
            addr: Arc::from(addr.as_str()),
            tx,
        };

        let destination = Self {
            addr,
            metrics,
            config,
            conn: None,
        };
        tokio::spawn(destination.run(rx));

        handle
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        self.connect().await;

        let period = self.config.reconnect_interval;
        let mut reconnect = tokio::time::interval_at(Instant::now() + period, period);
        reconnect.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(Command::Line(line)) => self.relay(line).await,
                    Some(Command::Flush(reply)) => {
                        let _ = reply.send(self.flush().await);
                    }
                    Some(Command::IsAlive(reply)) => {
                        let alive = self.check_alive().await;
                        let _ = reply.send(alive);
                    }
                    Some(Command::Shutdown(ack)) => {
                        self.close().await;
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        self.close().await;
                        break;
                    }
                },
                _ = reconnect.tick() => {
                    if !self.check_alive().await {
                        self.connect().await;
                    }
                }
            }
        }

        tracing::info!("{} destination stopped", self.addr);
    }

    async fn connect(&mut self) {
        match Connection::connect(&self.addr, self.metrics.clone(), self.config.flush_interval)
            .await
        {
            Ok(conn) => self.conn = Some(conn),
            Err(e) => tracing::warn!("{} connect failed: {}", self.addr, e),
        }
    }

    /// Report liveness, discarding the connection once it is down.
    async fn check_alive(&mut self) -> bool {
        let Some(conn) = &self.conn else {
            return false;
        };
        if conn.is_alive().await {
            return true;
        }

        tracing::warn!("{} connection is down", self.addr);
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                tracing::debug!("{} {}", self.addr, e);
            }
        }
        false
    }

    async fn relay(&mut self, line: BytesMut) {
        if self.check_alive().await {
            if let Some(conn) = &self.conn {
                if conn.write(line).await.is_ok() {
                    return;
                }
            }
        }

        self.metrics.record_dropped(&self.addr);
        tracing::debug!("{} no live connection, dropping line", self.addr);
    }

    async fn flush(&mut self) -> Result<(), ConnError> {
        match &self.conn {
            Some(conn) => conn.flush().await,
            None => Ok(()),
        }
    }

    async fn close(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if let Err(e) = conn.flush().await {
            tracing::warn!("{} final flush failed: {}", self.addr, e);
        }
        if let Err(e) = conn.close().await {
            tracing::debug!("{} {}", self.addr, e);
        }
    }
}
