use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

pub const RELAY_BUFFER_SIZE: usize = 32 * 1024;
const DEFAULT_MAX_IDLE: usize = 256;

lazy_static! {
    static ref IO_BUF_POOL: Arc<BufferPool> = Arc::new(BufferPool::new());
}

/// Recycles fixed-size relay buffers across copy operations.
///
/// Nothing depends on what the pool holds: an empty pool simply allocates.
#[derive(Debug)]
pub struct BufferPool {
    idle: Mutex<Vec<Box<[u8]>>>,
    buf_size: usize,
    max_idle: usize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_capacity(RELAY_BUFFER_SIZE, DEFAULT_MAX_IDLE)
    }

    pub fn with_capacity(buf_size: usize, max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            buf_size,
            max_idle,
        }
    }

    /// The process-wide pool used when a tunnel isn't given one.
    pub fn global() -> Arc<BufferPool> {
        IO_BUF_POOL.clone()
    }

    pub fn buf_size(&self) -> usize {
        self.buf_size
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn acquire(self: &Arc<Self>) -> PooledBuf {
        let buf = self
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.buf_size].into_boxed_slice());
        PooledBuf {
            buf: Some(buf),
            pool: self.clone(),
        }
    }

    fn put_back(&self, buf: Box<[u8]>) {
        if buf.len() != self.buf_size {
            return;
        }
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(buf);
        }
    }
}

/// A buffer on loan from a [`BufferPool`]; goes back to the pool when dropped.
#[derive(Debug)]
pub struct PooledBuf {
    buf: Option<Box<[u8]>>,
    pool: Arc<BufferPool>,
}

impl PooledBuf {
    pub fn release(self) {
        drop(self)
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.put_back(buf);
        }
    }
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        // `buf` is only taken in `drop`
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hands_out_full_sized_buffers() {
        let pool = Arc::new(BufferPool::new());
        let buf = pool.acquire();
        assert_eq!(buf.len(), RELAY_BUFFER_SIZE);
        assert_eq!(pool.buf_size(), RELAY_BUFFER_SIZE);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn released_buffer_is_reused() {
        let pool = Arc::new(BufferPool::new());
        let buf = pool.acquire();
        let ptr = buf.as_ptr();
        buf.release();
        assert_eq!(pool.idle_count(), 1);

        let again = pool.acquire();
        assert_eq!(again.as_ptr(), ptr);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn idle_buffers_are_capped() {
        let pool = Arc::new(BufferPool::with_capacity(16, 2));
        assert_eq!(pool.buf_size(), 16);
        let bufs: Vec<_> = (0..4).map(|_| pool.acquire()).collect();
        drop(bufs);
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn concurrent_acquire_release() {
        let pool = Arc::new(BufferPool::with_capacity(64, 8));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let mut buf = pool.acquire();
                        buf[0] = i as u8;
                        assert_eq!(buf.len(), 64);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(pool.idle_count() <= 8);
    }
}
