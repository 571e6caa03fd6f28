use std::fmt::Debug;
use std::future::Future;
use std::io::Result;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::task::AtomicWaker;
use pin_project_lite::pin_project;
use tokio::io::{split, AsyncRead, AsyncWrite, ReadBuf, ReadHalf, WriteHalf};
use tokio::time::{sleep_until, Instant, Sleep};

use super::{closed_err, timeout_err};

/// Anything that can be tunneled: raw sockets, TLS streams, in-process pipes.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Connection for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

// roughly 30 years, what tokio itself uses for "never"
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + timeout`, saturating to a far-future instant instead of overflowing.
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

pub trait Deadline {
    /// Pending and later I/O fail with `TimedOut` once `deadline` has passed.
    fn set_deadline(&mut self, deadline: Instant) -> Result<()>;
    fn clear_deadline(&mut self);
}

#[derive(Debug, Default)]
struct ConnState {
    closed: AtomicBool,
    read_waker: AtomicWaker,
    write_waker: AtomicWaker,
}

impl ConnState {
    fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        if first {
            self.read_waker.wake();
            self.write_waker.wake();
        }
        first
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// A handle that closes a connection from outside the task using it.
#[derive(Debug, Clone)]
pub struct ConnCloser {
    state: Arc<ConnState>,
}

impl ConnCloser {
    /// Returns false if the connection was already closed.
    pub fn close(&self) -> bool {
        self.state.close()
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }
}

struct Timer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Timer {
    fn new() -> Self {
        Self { sleep: None }
    }

    fn set(&mut self, deadline: Instant) {
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().reset(deadline),
            None => self.sleep = Some(Box::pin(sleep_until(deadline))),
        }
    }

    fn clear(&mut self) {
        self.sleep = None;
    }

    fn poll_expired(&mut self, cx: &mut Context<'_>) -> bool {
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().poll(cx).is_ready(),
            None => false,
        }
    }
}

impl Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.sleep.as_ref() {
            Some(sleep) => write!(f, "Timer({:?})", sleep.deadline()),
            None => write!(f, "Timer(None)"),
        }
    }
}

pin_project! {
    #[derive(Debug)]
    pub struct ConnReader<R> {
        #[pin]
        inner: R,
        state: Arc<ConnState>,
        timer: Timer,
    }
}

pin_project! {
    #[derive(Debug)]
    pub struct ConnWriter<W> {
        #[pin]
        inner: W,
        state: Arc<ConnState>,
        timer: Timer,
    }
}

impl<R> ConnReader<R> {
    pub fn closer(&self) -> ConnCloser {
        ConnCloser {
            state: self.state.clone(),
        }
    }
}

impl<W> ConnWriter<W> {
    pub fn closer(&self) -> ConnCloser {
        ConnCloser {
            state: self.state.clone(),
        }
    }
}

impl<R> Deadline for ConnReader<R> {
    fn set_deadline(&mut self, deadline: Instant) -> Result<()> {
        if self.state.is_closed() {
            return Err(closed_err());
        }
        self.timer.set(deadline);
        Ok(())
    }

    fn clear_deadline(&mut self) {
        self.timer.clear();
    }
}

impl<W> Deadline for ConnWriter<W> {
    fn set_deadline(&mut self, deadline: Instant) -> Result<()> {
        if self.state.is_closed() {
            return Err(closed_err());
        }
        self.timer.set(deadline);
        Ok(())
    }

    fn clear_deadline(&mut self) {
        self.timer.clear();
    }
}

impl<R: AsyncRead> AsyncRead for ConnReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<Result<()>> {
        let me = self.project();
        me.state.read_waker.register(cx.waker());
        if me.state.is_closed() {
            return Poll::Ready(Err(closed_err()));
        }
        if me.timer.poll_expired(cx) {
            return Poll::Ready(Err(timeout_err()));
        }
        me.inner.poll_read(cx, buf)
    }
}

impl<W: AsyncWrite> AsyncWrite for ConnWriter<W> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<Result<usize>> {
        let me = self.project();
        me.state.write_waker.register(cx.waker());
        if me.state.is_closed() {
            return Poll::Ready(Err(closed_err()));
        }
        if me.timer.poll_expired(cx) {
            return Poll::Ready(Err(timeout_err()));
        }
        me.inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let me = self.project();
        me.state.write_waker.register(cx.waker());
        if me.state.is_closed() {
            return Poll::Ready(Err(closed_err()));
        }
        if me.timer.poll_expired(cx) {
            return Poll::Ready(Err(timeout_err()));
        }
        me.inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let me = self.project();
        if me.state.is_closed() {
            return Poll::Ready(Ok(()));
        }
        me.inner.poll_shutdown(cx)
    }
}

/// A connection with deadlines and an idempotent `close`.
///
/// Closing wakes any pending read or write with a `NotConnected` error. The
/// wrapped transport itself is dropped together with the last half.
#[derive(Debug)]
pub struct TunnelConn<T> {
    reader: ConnReader<ReadHalf<T>>,
    writer: ConnWriter<WriteHalf<T>>,
}

impl<T: Connection> TunnelConn<T> {
    pub fn new(inner: T) -> Self {
        let state = Arc::new(ConnState::default());
        let (r, w) = split(inner);
        Self {
            reader: ConnReader {
                inner: r,
                state: state.clone(),
                timer: Timer::new(),
            },
            writer: ConnWriter {
                inner: w,
                state,
                timer: Timer::new(),
            },
        }
    }
}

impl<T> TunnelConn<T> {
    pub fn close(&self) -> bool {
        self.reader.state.close()
    }

    pub fn is_closed(&self) -> bool {
        self.reader.state.is_closed()
    }

    pub fn closer(&self) -> ConnCloser {
        self.reader.closer()
    }

    pub fn into_split(self) -> (ConnReader<ReadHalf<T>>, ConnWriter<WriteHalf<T>>) {
        (self.reader, self.writer)
    }
}

impl<T> From<T> for TunnelConn<T>
where
    T: Connection,
{
    fn from(inner: T) -> Self {
        TunnelConn::new(inner)
    }
}

impl<T> Deadline for TunnelConn<T> {
    fn set_deadline(&mut self, deadline: Instant) -> Result<()> {
        self.reader.set_deadline(deadline)?;
        self.writer.set_deadline(deadline)
    }

    fn clear_deadline(&mut self) {
        self.reader.clear_deadline();
        self.writer.clear_deadline();
    }
}

impl<T: AsyncRead> AsyncRead for TunnelConn<T> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite> AsyncWrite for TunnelConn<T> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize>> {
        Pin::new(&mut self.writer).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Pin::new(&mut self.writer).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Pin::new(&mut self.writer).poll_shutdown(cx)
    }
}
