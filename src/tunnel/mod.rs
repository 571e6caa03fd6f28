use std::fmt;
use std::io::{Error, ErrorKind};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::utils::{
    copy_one_way, BufferPool, ConnCloser, Connection, Deadline, TunnelConn, TunnelError,
};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    AToB,
    BToA,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::AToB => write!(f, "a->b"),
            Direction::BToA => write!(f, "b->a"),
        }
    }
}

/// Close-once state shared by both directions of a tunnel.
struct Shutdown {
    a: ConnCloser,
    b: ConnCloser,
    // `None` until the first direction finishes
    outcome: Mutex<Option<(Direction, Result<(), TunnelError>)>>,
}

impl Shutdown {
    fn new(a: ConnCloser, b: ConnCloser) -> Self {
        Self {
            a,
            b,
            outcome: Mutex::new(None),
        }
    }

    fn close(&self, dir: Direction, res: Result<(), TunnelError>) {
        let mut outcome = self.outcome.lock();
        if let Some((winner, _)) = outcome.as_ref() {
            debug!("[{}] ended after [{}], dropping {:?}", dir, winner, res);
            return;
        }
        self.a.close();
        self.b.close();
        *outcome = Some((dir, res));
    }

    fn take(&self) -> Result<(), TunnelError> {
        match self.outcome.lock().take() {
            Some((dir, res)) => {
                debug!("tunnel closed by [{}]: {:?}", dir, res);
                res
            }
            None => Ok(()),
        }
    }
}

/// Relays two connections against each other under an idle timeout.
#[derive(Debug, Clone)]
pub struct Tunnel {
    timeout: Duration,
    pool: Arc<BufferPool>,
}

impl Tunnel {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pool: BufferPool::global(),
        }
    }

    pub fn with_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.pool = pool;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `a -> b` and `b -> a` until either one ends.
    ///
    /// The first direction to end closes both connections and its outcome
    /// becomes the result; the other direction's outcome is dropped. Returns
    /// once both directions are done and both connections are closed.
    pub async fn open<A, B>(&self, a: TunnelConn<A>, b: TunnelConn<B>) -> Result<(), TunnelError>
    where
        A: Connection,
        B: Connection,
    {
        let shutdown = Arc::new(Shutdown::new(a.closer(), b.closer()));
        let (a_read, a_write) = a.into_split();
        let (b_read, b_write) = b.into_split();

        let a_to_b = self.spawn_one_way(Direction::AToB, a_read, b_write, shutdown.clone());
        let b_to_a = self.spawn_one_way(Direction::BToA, b_read, a_write, shutdown.clone());

        let (a_to_b, b_to_a) = join(a_to_b, b_to_a).await;
        for (dir, joined) in [(Direction::AToB, a_to_b), (Direction::BToA, b_to_a)] {
            if let Err(e) = joined {
                let e = Error::new(ErrorKind::Other, e.to_string());
                shutdown.close(dir, Err(TunnelError::Transport(e)));
            }
        }
        shutdown.take()
    }

    fn spawn_one_way<R, W>(
        &self,
        dir: Direction,
        mut src: R,
        mut dst: W,
        shutdown: Arc<Shutdown>,
    ) -> JoinHandle<()>
    where
        R: AsyncRead + Deadline + Unpin + Send + 'static,
        W: AsyncWrite + Deadline + Unpin + Send + 'static,
    {
        let timeout = self.timeout;
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let (amt, res) = copy_one_way(&mut src, &mut dst, timeout, &pool).await;
            debug!("[{}] relaying end, {} bytes, {:?}", dir, amt, res);
            shutdown.close(dir, res);
        })
    }
}

/// Relays `a` and `b` until one side ends, fails, or idles past `timeout`.
///
/// Takes ownership of both connections; they are closed when this returns.
/// `Ok(())` means a side reached end-of-stream before any error occurred.
pub async fn open_tunnel<A, B>(
    a: TunnelConn<A>,
    b: TunnelConn<B>,
    timeout: Duration,
) -> Result<(), TunnelError>
where
    A: Connection,
    B: Connection,
{
    Tunnel::new(timeout).open(a, b).await
}
