use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use super::{deadline_after, BufferPool, Deadline, TunnelError};

/// Moves bytes from `src` to `dst` until clean end-of-stream or error.
///
/// Both deadlines are pushed to `now + timeout` before every read and every
/// write, so a side that makes no progress for `timeout` fails with
/// `TunnelError::Timeout`. Returns the number of bytes written together with
/// the terminal result, which is `Ok` only on end-of-stream.
pub async fn copy_one_way<R, W>(
    src: &mut R,
    dst: &mut W,
    timeout: Duration,
    pool: &Arc<BufferPool>,
) -> (u64, Result<(), TunnelError>)
where
    R: AsyncRead + Deadline + Unpin,
    W: AsyncWrite + Deadline + Unpin,
{
    let mut buf = pool.acquire();
    let mut amt = 0;
    let res = copy_loop(src, dst, &mut buf, timeout, &mut amt).await;
    (amt, res)
}

async fn copy_loop<R, W>(
    src: &mut R,
    dst: &mut W,
    buf: &mut [u8],
    timeout: Duration,
    amt: &mut u64,
) -> Result<(), TunnelError>
where
    R: AsyncRead + Deadline + Unpin,
    W: AsyncWrite + Deadline + Unpin,
{
    loop {
        src.set_deadline(deadline_after(timeout))
            .map_err(TunnelError::from_io)?;
        let len = src.read(buf).await.map_err(TunnelError::from_io)?;
        if len == 0 {
            return Ok(());
        }

        dst.set_deadline(deadline_after(timeout))
            .map_err(TunnelError::from_io)?;
        let mut written = 0;
        while written < len {
            let n = dst
                .write(&buf[written..len])
                .await
                .map_err(TunnelError::from_io)?;
            if n == 0 {
                return Err(TunnelError::ShortWrite);
            }
            written += n;
            *amt += n as u64;
        }
        dst.flush().await.map_err(TunnelError::from_io)?;
        trace!("copied {} bytes, {} in total", len, amt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{TunnelConn, RELAY_BUFFER_SIZE};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, ReadBuf};
    use tokio::time::Instant;

    /// Accepts nothing and never errors.
    struct ZeroWriter;

    impl AsyncRead for ZeroWriter {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for ZeroWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Ok(0))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn copies_until_eof() {
        let pool = Arc::new(BufferPool::new());
        let (mut src_peer, src) = duplex(4096);
        let (dst, mut dst_peer) = duplex(4096);
        let (mut src, _) = TunnelConn::new(src).into_split();
        let (_, mut dst) = TunnelConn::new(dst).into_split();

        let payload: Vec<u8> = (0..RELAY_BUFFER_SIZE * 3 + 17)
            .map(|i| (i % 251) as u8)
            .collect();
        let expected = payload.clone();
        tokio::spawn(async move {
            src_peer.write_all(&payload).await.unwrap();
        });
        let reader = tokio::spawn(async move {
            let mut out = Vec::new();
            dst_peer.read_to_end(&mut out).await.unwrap();
            out
        });

        let (amt, res) = copy_one_way(&mut src, &mut dst, Duration::from_secs(5), &pool).await;
        assert!(res.is_ok());
        assert_eq!(amt, expected.len() as u64);
        drop(dst);
        assert_eq!(reader.await.unwrap(), expected);
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn idle_source_times_out() {
        let pool = Arc::new(BufferPool::new());
        let (_src_peer, src) = duplex(64);
        let (dst, _dst_peer) = duplex(64);
        let (mut src, _) = TunnelConn::new(src).into_split();
        let (_, mut dst) = TunnelConn::new(dst).into_split();

        let start = Instant::now();
        let (amt, res) =
            copy_one_way(&mut src, &mut dst, Duration::from_millis(200), &pool).await;
        assert_eq!(amt, 0);
        assert!(res.unwrap_err().is_timeout());
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn zero_length_write_is_a_short_write() {
        let pool = Arc::new(BufferPool::new());
        let (mut src_peer, src) = duplex(64);
        let (mut src, _) = TunnelConn::new(src).into_split();
        let (_, mut dst) = TunnelConn::new(ZeroWriter).into_split();

        src_peer.write_all(b"hello").await.unwrap();
        let (amt, res) = copy_one_way(&mut src, &mut dst, Duration::from_secs(1), &pool).await;
        assert_eq!(amt, 0);
        assert!(matches!(res, Err(TunnelError::ShortWrite)));
    }

    #[tokio::test]
    async fn stalled_destination_times_out() {
        let pool = Arc::new(BufferPool::new());
        let (mut src_peer, src) = duplex(RELAY_BUFFER_SIZE);
        // nobody drains this pipe, so writes block once it is full
        let (dst, _dst_peer) = duplex(16);
        let (mut src, _) = TunnelConn::new(src).into_split();
        let (_, mut dst) = TunnelConn::new(dst).into_split();

        src_peer.write_all(&[7u8; 1024]).await.unwrap();
        let (amt, res) =
            copy_one_way(&mut src, &mut dst, Duration::from_millis(100), &pool).await;
        assert_eq!(amt, 16);
        assert!(res.unwrap_err().is_timeout());
    }
}
