//! Graceful Shutdown
//!
//! Coordinates relay shutdown: tells the listener to stop accepting, tracks
//! inbound metric clients still being read, and waits for them to drain.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// Shutdown coordinator.
///
/// Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct ShutdownController {
    state: Arc<watch::Sender<bool>>,
    active_clients: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl ShutdownController {
    /// Create a new controller.
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
            active_clients: Arc::new(AtomicUsize::new(0)),
            drained: Arc::new(Notify::new()),
        }
    }

    /// Initiate shutdown. Idempotent.
    pub fn shutdown(&self) {
        let changed = self.state.send_if_modified(|down| !std::mem::replace(down, true));
        if changed {
            tracing::info!(
                "initiating shutdown with {} active clients",
                self.active_clients()
            );
        }
    }

    /// Whether shutdown has been initiated.
    pub fn is_shutdown(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolve once shutdown has been initiated.
    pub async fn wait(&self) {
        let mut rx = self.state.subscribe();
        // Only fails if the sender is gone, which `self` prevents.
        let _ = rx.wait_for(|down| *down).await;
    }

    /// Number of inbound clients still connected.
    pub fn active_clients(&self) -> usize {
        self.active_clients.load(Ordering::SeqCst)
    }

    /// Track a new inbound client until the guard is dropped.
    pub fn client_guard(&self) -> ClientGuard {
        self.active_clients.fetch_add(1, Ordering::SeqCst);
        ClientGuard {
            controller: self.clone(),
        }
    }

    fn client_ended(&self) {
        let prev = self.active_clients.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            self.drained.notify_waiters();
        }
    }

    /// Wait for every client to disconnect, up to `timeout`.
    ///
    /// Returns false on timeout.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let drained = async {
            loop {
                let notified = self.drained.notified();
                if self.active_clients() == 0 {
                    return;
                }
                notified.await;
            }
        };

        match tokio::time::timeout(timeout, drained).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    "drain timeout: {} clients still connected",
                    self.active_clients()
                );
                false
            }
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps an inbound client counted while alive.
pub struct ClientGuard {
    controller: ShutdownController,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.controller.client_ended();
    }
}

/// Wait for Ctrl+C or SIGTERM, then initiate shutdown.
#[cfg_attr(coverage_nightly, coverage(off))]
pub async fn shutdown_signal(controller: ShutdownController) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
        _ = controller.wait() => return,
    }

    controller.shutdown();
}
