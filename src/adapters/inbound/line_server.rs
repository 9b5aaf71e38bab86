//! Line Server Adapter
//!
//! Accepts TCP clients sending newline-delimited plaintext metrics and hands
//! each line to the relay service.

use crate::application::RelayService;
use crate::infrastructure::ShutdownController;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Line Server - inbound adapter for metric clients.
///
/// This adapter:
/// 1. Accepts incoming TCP connections
/// 2. Splits each stream into lines
/// 3. Dispatches every non-empty line through the RelayService
pub struct LineServer {
    relay: Arc<RelayService>,
    listen_addr: String,
    shutdown: ShutdownController,
}

impl LineServer {
    /// Create a new line server.
    pub fn new(
        relay: Arc<RelayService>,
        listen_addr: String,
        shutdown: ShutdownController,
    ) -> Self {
        Self {
            relay,
            listen_addr,
            shutdown,
        }
    }

    /// Bind the listen address and serve until shutdown.
    pub async fn run(&self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("carbon-relay listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Serve an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let (stream, addr) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = self.shutdown.wait() => {
                    tracing::info!("listener on {} stopped", self.listen_addr);
                    return Ok(());
                }
            };

            let relay = self.relay.clone();
            let shutdown = self.shutdown.clone();

            tokio::spawn(async move {
                let _guard = shutdown.client_guard();
                if let Err(e) = Self::handle_client(relay, stream, addr, shutdown.clone()).await {
                    tracing::error!("client error from {}: {:?}", addr, e);
                }
            });
        }
    }

    /// Read lines from one client until EOF or shutdown.
    async fn handle_client(
        relay: Arc<RelayService>,
        stream: TcpStream,
        addr: SocketAddr,
        shutdown: ShutdownController,
    ) -> anyhow::Result<()> {
        tracing::debug!("client connected: {}", addr);
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::with_capacity(256);

        loop {
            buf.clear();
            let n = tokio::select! {
                read = reader.read_until(b'\n', &mut buf) => read?,
                _ = shutdown.wait() => break,
            };
            if n == 0 {
                break;
            }

            let line = trim_line(&buf);
            if line.is_empty() {
                continue;
            }
            relay.dispatch(line).await;
        }

        tracing::debug!("client disconnected: {}", addr);
        Ok(())
    }
}

/// Strip the line terminator (`\n` or `\r\n`) and surrounding whitespace.
fn trim_line(buf: &[u8]) -> &[u8] {
    let mut end = buf.len();
    while end > 0 && buf[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    let mut start = 0;
    while start < end && buf[start].is_ascii_whitespace() {
        start += 1;
    }
    &buf[start..end]
}
