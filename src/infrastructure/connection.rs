//! Destination Connection
//!
//! Owns one outbound TCP connection to a relay destination. Two worker tasks
//! share nothing but channels:
//!
//! - the data worker is the only code that touches the socket and its write
//!   buffer; it serves line writes, periodic flushes, explicit flushes and
//!   shutdown, one at a time;
//! - the status worker is the only code that touches the liveness flag; it
//!   serializes "mark down" updates against "are you up" queries.
//!
//! Writes are fire-and-forget. A failed write marks the connection down,
//! closes the socket and ends the data worker; callers learn about it by
//! polling [`Connection::is_alive`] or through the destination counters.

use crate::domain::ports::MetricsStore;
use crate::infrastructure::handoff::{self, HandoffReceiver, HandoffSender};
use bytes::{BufMut, BytesMut};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

/// Connection errors.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    /// Address could not be resolved
    #[error("cannot resolve {addr}: {reason}")]
    Resolve { addr: String, reason: String },
    /// TCP dial failed
    #[error("cannot connect to {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },
    /// Flush period must be positive
    #[error("flush period must be greater than zero")]
    InvalidFlushPeriod,
    /// The writer accepted fewer bytes than requested without an error
    #[error("truncated write: wrote {written} of {requested} bytes, unwritten: {unwritten}")]
    Truncated {
        written: usize,
        requested: usize,
        unwritten: String,
    },
    /// Hard error from the socket write
    #[error("write error: {0}")]
    Write(#[source] io::Error),
    /// Explicit flush failed
    #[error("flush error: {0}")]
    Flush(#[source] io::Error),
    /// Socket shutdown failed
    #[error("close error: {0}")]
    Close(#[source] io::Error),
    /// The data worker has exited
    #[error("connection is closed")]
    Closed,
}

/// Messages served by the status worker.
#[derive(Debug)]
enum StatusMsg {
    /// The connection is dead. There is no way back up.
    Down,
    /// Report the current liveness.
    Query(oneshot::Sender<bool>),
    /// Stop serving.
    Stop,
}

type FlushReply = oneshot::Sender<io::Result<()>>;

/// Handle to a live destination connection.
///
/// Dropping the handle stops both workers without flushing.
pub struct Connection {
    addr: String,
    data_tx: HandoffSender<BytesMut>,
    flush_tx: mpsc::Sender<FlushReply>,
    shutdown_tx: HandoffSender<FlushReply>,
    status_tx: mpsc::Sender<StatusMsg>,
}

impl Connection {
    /// Resolve `addr`, dial it and start the workers.
    ///
    /// No retry is attempted; reconnect policy belongs to the caller.
    pub async fn connect(
        addr: &str,
        metrics: Arc<dyn MetricsStore>,
        period_flush: Duration,
    ) -> Result<Self, ConnError> {
        if period_flush.is_zero() {
            return Err(ConnError::InvalidFlushPeriod);
        }

        let raddr = resolve(addr).await?;
        let stream = TcpStream::connect(raddr)
            .await
            .map_err(|source| ConnError::Dial {
                addr: addr.to_string(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("{} cannot set TCP_NODELAY: {}", addr, e);
        }

        tracing::info!("{} connected ({})", addr, raddr);
        Self::with_writer(addr, stream, metrics, period_flush)
    }

    /// Start the workers over an already established writer.
    ///
    /// `addr` only labels logs and counters.
    pub fn with_writer<W>(
        addr: &str,
        writer: W,
        metrics: Arc<dyn MetricsStore>,
        period_flush: Duration,
    ) -> Result<Self, ConnError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        if period_flush.is_zero() {
            return Err(ConnError::InvalidFlushPeriod);
        }

        let (data_tx, data_rx) = handoff::channel();
        let (shutdown_tx, shutdown_rx) = handoff::channel();
        // Flush and status requests carry a reply the caller awaits, so one
        // buffered slot still blocks them until served. A lone `Down` may sit
        // in the slot while the data worker exits: every query that can
        // observe the exit (a write failing with `Closed`) is queued behind it.
        let (flush_tx, flush_rx) = mpsc::channel(1);
        let (status_tx, status_rx) = mpsc::channel(1);

        let worker = DataWorker {
            addr: addr.to_string(),
            writer: BufWriter::new(writer),
            metrics,
            status_tx: status_tx.clone(),
            period_flush,
            failed: None,
        };
        tokio::spawn(worker.run(data_rx, flush_rx, shutdown_rx));
        tokio::spawn(run_status(addr.to_string(), status_rx));

        Ok(Self {
            addr: addr.to_string(),
            data_tx,
            flush_tx,
            shutdown_tx,
            status_tx,
        })
    }

    /// Destination address this connection writes to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Submit one line. A newline is appended by the data worker.
    ///
    /// Waits until the data worker takes the line. Write failures are not
    /// reported here; they show up as `is_alive() == false`. Returns
    /// `Err(ConnError::Closed)` once the data worker has exited.
    pub async fn write(&self, line: impl Into<BytesMut>) -> Result<(), ConnError> {
        self.data_tx
            .send(line.into())
            .await
            .map_err(|_| ConnError::Closed)
    }

    /// Query liveness. Once `false`, never `true` again.
    pub async fn is_alive(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.status_tx.send(StatusMsg::Query(tx)).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Flush the write buffer, waiting until the bytes reached the socket.
    pub async fn flush(&self) -> Result<(), ConnError> {
        tracing::trace!("{} requesting flush", self.addr);
        let (tx, rx) = oneshot::channel();
        self.flush_tx.send(tx).await.map_err(|_| ConnError::Closed)?;
        let result = rx.await.map_err(|_| ConnError::Closed)?;
        tracing::trace!("{} flush done: {:?}", self.addr, result);
        result.map_err(ConnError::Flush)
    }

    /// Stop the data worker without flushing, close the socket and stop the
    /// status worker.
    ///
    /// Succeeds trivially when the data worker already exited. Does not wait
    /// for the status worker.
    pub async fn close(&self) -> Result<(), ConnError> {
        tracing::debug!("{} close called, sending shutdown", self.addr);
        let (tx, rx) = oneshot::channel();
        let result = match self.shutdown_tx.send(tx).await {
            Ok(()) => rx.await.unwrap_or(Ok(())),
            Err(_) => Ok(()),
        };
        let _ = self.status_tx.send(StatusMsg::Stop).await;
        tracing::debug!("{} closed", self.addr);
        result.map_err(ConnError::Close)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("addr", &self.addr)
            .field("closed", &self.data_tx.is_closed())
            .finish()
    }
}

async fn resolve(addr: &str) -> Result<SocketAddr, ConnError> {
    let mut addrs = tokio::net::lookup_host(addr)
        .await
        .map_err(|e| ConnError::Resolve {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
    addrs.next().ok_or_else(|| ConnError::Resolve {
        addr: addr.to_string(),
        reason: "no addresses found".to_string(),
    })
}

/// Liveness register. The flag lives only on this task's stack.
async fn run_status(addr: String, mut rx: mpsc::Receiver<StatusMsg>) {
    let mut up = true;

    while let Some(msg) = rx.recv().await {
        match msg {
            StatusMsg::Down => {
                if up {
                    tracing::debug!("{} marked down", addr);
                }
                up = false;
            }
            StatusMsg::Query(reply) => {
                let _ = reply.send(up);
            }
            StatusMsg::Stop => break,
        }
    }

    tracing::trace!("{} status worker stopped", addr);
}

/// An error the buffered writer keeps returning once it has failed.
#[derive(Debug, Clone)]
struct StickyError {
    kind: io::ErrorKind,
    message: String,
}

impl StickyError {
    fn from_io(e: &io::Error) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }

    fn to_io(&self) -> io::Error {
        io::Error::new(self.kind, self.message.clone())
    }
}

struct DataWorker<W> {
    addr: String,
    writer: BufWriter<W>,
    metrics: Arc<dyn MetricsStore>,
    status_tx: mpsc::Sender<StatusMsg>,
    period_flush: Duration,
    failed: Option<StickyError>,
}

impl<W> DataWorker<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn run(
        mut self,
        mut data_rx: HandoffReceiver<BytesMut>,
        mut flush_rx: mpsc::Receiver<FlushReply>,
        mut shutdown_rx: HandoffReceiver<FlushReply>,
    ) {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.period_flush, self.period_flush);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                line = data_rx.recv() => {
                    let Some(line) = line else {
                        tracing::debug!("{} connection handle dropped", self.addr);
                        let _ = self.shutdown_socket().await;
                        return;
                    };
                    if let Err(e) = self.handle_line(line).await {
                        tracing::error!("{} {}", self.addr, e);
                        let _ = self.status_tx.send(StatusMsg::Down).await;
                        if let Err(e) = self.shutdown_socket().await {
                            tracing::debug!("{} socket shutdown after failure: {}", self.addr, e);
                        }
                        return;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.flush().await {
                        tracing::debug!("{} periodic flush failed: {}", self.addr, e);
                    }
                }
                Some(reply) = flush_rx.recv() => {
                    let _ = reply.send(self.flush().await);
                }
                Some(ack) = shutdown_rx.recv() => {
                    let _ = ack.send(self.shutdown_socket().await);
                    return;
                }
            }
        }
    }

    /// Write one line and record exactly one outcome counter.
    async fn handle_line(&mut self, mut line: BytesMut) -> Result<(), ConnError> {
        tracing::debug!(
            "{} conn writing {}",
            self.addr,
            String::from_utf8_lossy(&line)
        );
        line.put_u8(b'\n');

        match self.write_line(&line).await {
            Ok(()) => {
                self.metrics.record_out(&self.addr);
                Ok(())
            }
            Err(e @ ConnError::Truncated { .. }) => {
                self.metrics.record_err_truncated(&self.addr);
                Err(e)
            }
            Err(e) => {
                self.metrics.record_err_write(&self.addr);
                Err(e)
            }
        }
    }

    async fn write_line(&mut self, line: &[u8]) -> Result<(), ConnError> {
        if let Some(failed) = &self.failed {
            return Err(ConnError::Write(failed.to_io()));
        }

        let requested = line.len();
        let mut written = 0;
        while written < requested {
            match self.writer.write(&line[written..]).await {
                Ok(0) => {
                    return Err(ConnError::Truncated {
                        written,
                        requested,
                        unwritten: String::from_utf8_lossy(&line[written..]).into_owned(),
                    })
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.failed = Some(StickyError::from_io(&e));
                    return Err(ConnError::Write(e));
                }
            }
        }
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        if let Some(failed) = &self.failed {
            return Err(failed.to_io());
        }
        if let Err(e) = self.writer.flush().await {
            self.failed = Some(StickyError::from_io(&e));
            return Err(e);
        }
        Ok(())
    }

    /// Shut the socket down, discarding whatever is still buffered.
    async fn shutdown_socket(&mut self) -> io::Result<()> {
        self.writer.get_mut().shutdown().await
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::adapters::outbound::DashMapMetricsStore;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::task::{Context, Poll, Waker};
    use tokio_test::{assert_err, assert_ok};

    const PERIOD: Duration = Duration::from_secs(3600);

    /// Captures everything written; clones share the same buffer.
    #[derive(Clone, Default)]
    struct SharedWriter {
        buf: Arc<Mutex<Vec<u8>>>,
        writes: Arc<Mutex<usize>>,
    }

    impl SharedWriter {
        fn contents(&self) -> String {
            String::from_utf8(self.buf.lock().unwrap().clone()).unwrap()
        }

        fn write_calls(&self) -> usize {
            *self.writes.lock().unwrap()
        }
    }

    impl AsyncWrite for SharedWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.buf.lock().unwrap().extend_from_slice(buf);
            *self.writes.lock().unwrap() += 1;
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Every write fails with a broken pipe.
    struct FailingWriter;

    impl AsyncWrite for FailingWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Accepts nothing but never reports an error.
    struct ZeroWriter;

    impl AsyncWrite for ZeroWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Ok(0))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Buffers writes; `poll_flush` stays pending until the gate opens.
    #[derive(Clone, Default)]
    struct GatedWriter {
        inner: SharedWriter,
        open: Arc<AtomicBool>,
        flushing: Arc<AtomicBool>,
        waker: Arc<Mutex<Option<Waker>>>,
    }

    impl GatedWriter {
        fn open(&self) {
            self.open.store(true, Ordering::SeqCst);
            if let Some(waker) = self.waker.lock().unwrap().take() {
                waker.wake();
            }
        }
    }

    impl AsyncWrite for GatedWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }

        fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            self.flushing.store(true, Ordering::SeqCst);
            if self.open.load(Ordering::SeqCst) {
                return Poll::Ready(Ok(()));
            }
            *self.waker.lock().unwrap() = Some(cx.waker().clone());
            Poll::Pending
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn store() -> Arc<DashMapMetricsStore> {
        Arc::new(DashMapMetricsStore::new())
    }

    /// Larger than the write buffer, so it goes straight to the writer.
    fn oversized_line() -> String {
        "x".repeat(16 * 1024)
    }

    async fn wait_down(conn: &Connection) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while conn.is_alive().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("connection should go down");
    }

    #[tokio::test]
    async fn test_zero_flush_period_rejected() {
        let result = Connection::with_writer("d", SharedWriter::default(), store(), Duration::ZERO);
        assert!(matches!(result, Err(ConnError::InvalidFlushPeriod)));
    }

    #[tokio::test]
    async fn test_lines_written_in_order_with_newline() {
        let writer = SharedWriter::default();
        let metrics = store();
        let conn = Connection::with_writer("d", writer.clone(), metrics.clone(), PERIOD).unwrap();

        for i in 0..100 {
            assert_ok!(conn.write(format!("foo.bar {} 1000000000", i).as_str()).await);
        }
        assert_ok!(conn.flush().await);

        let expected: String = (0..100)
            .map(|i| format!("foo.bar {} 1000000000\n", i))
            .collect();
        assert_eq!(writer.contents(), expected);
        assert_eq!(metrics.counters("d").unwrap().out, 100);
        assert!(conn.is_alive().await);
    }

    #[tokio::test]
    async fn test_writes_are_buffered_until_flush() {
        let writer = SharedWriter::default();
        let conn = Connection::with_writer("d", writer.clone(), store(), PERIOD).unwrap();

        assert_ok!(conn.write("a.b 1 1").await);
        assert_ok!(conn.write("a.c 2 1").await);
        assert_eq!(writer.write_calls(), 0);

        assert_ok!(conn.flush().await);
        assert_eq!(writer.contents(), "a.b 1 1\na.c 2 1\n");
    }

    #[tokio::test]
    async fn test_flush_with_nothing_pending() {
        let conn = Connection::with_writer("d", SharedWriter::default(), store(), PERIOD).unwrap();
        assert_ok!(conn.flush().await);
    }

    #[tokio::test]
    async fn test_periodic_flush() {
        let writer = SharedWriter::default();
        let conn =
            Connection::with_writer("d", writer.clone(), store(), Duration::from_millis(20))
                .unwrap();

        assert_ok!(conn.write("periodic 1 1").await);

        tokio::time::timeout(Duration::from_secs(2), async {
            while writer.contents().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("ticker should flush the buffer");

        assert_eq!(writer.contents(), "periodic 1 1\n");
    }

    #[tokio::test]
    async fn test_hard_write_error_marks_down() {
        let metrics = store();
        let conn = Connection::with_writer("d", FailingWriter, metrics.clone(), PERIOD).unwrap();
        assert!(conn.is_alive().await);

        assert_ok!(conn.write(oversized_line().as_str()).await);
        wait_down(&conn).await;

        let counters = metrics.counters("d").unwrap();
        assert_eq!(counters.err_write, 1);
        assert_eq!(counters.err_truncated, 0);
        assert_eq!(counters.out, 0);
    }

    #[tokio::test]
    async fn test_truncated_write_counted_separately() {
        let metrics = store();
        let conn = Connection::with_writer("d", ZeroWriter, metrics.clone(), PERIOD).unwrap();

        assert_ok!(conn.write(oversized_line().as_str()).await);
        wait_down(&conn).await;

        let counters = metrics.counters("d").unwrap();
        assert_eq!(counters.err_truncated, 1);
        assert_eq!(counters.err_write, 0);
        assert_eq!(counters.out, 0);
    }

    #[tokio::test]
    async fn test_failed_flush_poisons_next_write() {
        let metrics = store();
        let conn = Connection::with_writer("d", FailingWriter, metrics.clone(), PERIOD).unwrap();

        // Small enough to sit in the buffer.
        assert_ok!(conn.write("a.b 1 1").await);
        assert_eq!(metrics.counters("d").unwrap().out, 1);

        let err = conn.flush().await.unwrap_err();
        assert!(matches!(err, ConnError::Flush(ref e) if e.kind() == io::ErrorKind::BrokenPipe));

        // The writer stays failed.
        assert_err!(conn.flush().await);
        assert!(conn.is_alive().await);

        assert_ok!(conn.write("a.b 2 1").await);
        wait_down(&conn).await;

        let counters = metrics.counters("d").unwrap();
        assert_eq!(counters.out, 1);
        assert_eq!(counters.err_write, 1);
    }

    #[tokio::test]
    async fn test_write_after_failure_is_closed() {
        let conn = Connection::with_writer("d", FailingWriter, store(), PERIOD).unwrap();

        assert_ok!(conn.write(oversized_line().as_str()).await);
        wait_down(&conn).await;

        let result = tokio::time::timeout(Duration::from_secs(1), conn.write("late 1 1"))
            .await
            .expect("write after failure must not hang");
        assert!(matches!(result, Err(ConnError::Closed)));
        assert!(matches!(conn.flush().await, Err(ConnError::Closed)));
    }

    #[tokio::test]
    async fn test_write_abandoned_while_worker_busy_is_never_sent() {
        let writer = GatedWriter::default();
        let metrics = store();
        let conn = Arc::new(
            Connection::with_writer("d", writer.clone(), metrics.clone(), PERIOD).unwrap(),
        );

        assert_ok!(conn.write("first 1 1").await);

        // Park the data worker inside a flush.
        let flusher = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.flush().await })
        };
        tokio::time::timeout(Duration::from_secs(2), async {
            while !writer.flushing.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("flush should reach the writer");

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), conn.write("abandoned 1 1")).await;
        assert!(abandoned.is_err());

        writer.open();
        assert_ok!(flusher.await.unwrap());

        assert_ok!(conn.write("second 1 1").await);
        assert_ok!(conn.flush().await);

        assert_eq!(writer.inner.contents(), "first 1 1\nsecond 1 1\n");
        assert_eq!(metrics.counters("d").unwrap().out, 2);
    }

    #[tokio::test]
    async fn test_down_visible_once_writes_are_refused() {
        let conn = Connection::with_writer("d", FailingWriter, store(), PERIOD).unwrap();

        assert_ok!(conn.write(oversized_line().as_str()).await);
        tokio::time::timeout(Duration::from_secs(2), async {
            while conn.write("retry 1 1").await.is_ok() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("data worker should exit");

        // No polling: the first query after the refusal already sees down.
        assert!(!conn.is_alive().await);
    }

    #[tokio::test]
    async fn test_status_never_flips_back_up() {
        let conn = Arc::new(Connection::with_writer("d", FailingWriter, store(), PERIOD).unwrap());

        let mut observers = Vec::new();
        for _ in 0..8 {
            let conn = conn.clone();
            observers.push(tokio::spawn(async move {
                let mut seen_down = false;
                for _ in 0..200 {
                    let alive = conn.is_alive().await;
                    if seen_down {
                        assert!(!alive, "status went back up");
                    }
                    seen_down |= !alive;
                    tokio::task::yield_now().await;
                }
                seen_down
            }));
        }

        assert_ok!(conn.write(oversized_line().as_str()).await);
        wait_down(&conn).await;

        for observer in observers {
            observer.await.unwrap();
        }
        assert!(!conn.is_alive().await);
    }

    #[tokio::test]
    async fn test_close_stops_everything() {
        let writer = SharedWriter::default();
        let conn = Connection::with_writer("d", writer.clone(), store(), PERIOD).unwrap();

        assert_ok!(conn.write("unflushed 1 1").await);
        assert_ok!(conn.close().await);

        // Close does not flush.
        assert!(writer.contents().is_empty());
        assert!(!conn.is_alive().await);

        let result = tokio::time::timeout(Duration::from_secs(1), conn.write("after 1 1"))
            .await
            .expect("write after close must not hang");
        assert!(matches!(result, Err(ConnError::Closed)));
    }

    #[tokio::test]
    async fn test_close_after_failure_is_ok() {
        let conn = Connection::with_writer("d", FailingWriter, store(), PERIOD).unwrap();

        assert_ok!(conn.write(oversized_line().as_str()).await);
        wait_down(&conn).await;

        assert_ok!(conn.close().await);
        assert!(!conn.is_alive().await);
    }

    #[tokio::test]
    async fn test_connect_resolve_error() {
        let result = Connection::connect("not an address", store(), PERIOD).await;
        assert!(matches!(result, Err(ConnError::Resolve { .. })));
    }

    #[tokio::test]
    async fn test_connect_dial_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = Connection::connect(&addr.to_string(), store(), PERIOD).await;
        assert!(matches!(result, Err(ConnError::Dial { .. })));
    }

    #[test]
    fn test_error_display() {
        let err = ConnError::Truncated {
            written: 3,
            requested: 8,
            unwritten: "bar\n".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "truncated write: wrote 3 of 8 bytes, unwritten: bar\n"
        );
        assert_eq!(ConnError::Closed.to_string(), "connection is closed");
        assert_eq!(
            ConnError::InvalidFlushPeriod.to_string(),
            "flush period must be greater than zero"
        );
    }
}
