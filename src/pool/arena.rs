use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::buffer::PooledBuf;

/// Idle buffers kept per size class before returned buffers are dropped.
const DEFAULT_MAX_IDLE: usize = 64;

static SHARED: OnceLock<BufferPool> = OnceLock::new();

/// Counters describing pool traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers handed out by [`BufferPool::get`].
    pub checkouts: u64,
    /// Buffers returned to the pool.
    pub frees: u64,
    /// Checkouts served from a free list instead of a fresh allocation.
    pub reused: u64,
}

impl PoolStats {
    /// Buffers currently checked out.
    pub fn outstanding(&self) -> u64 {
        self.checkouts.saturating_sub(self.frees)
    }
}

struct Inner {
    free: Mutex<HashMap<usize, Vec<Vec<u8>>>>,
    max_idle: usize,
    checkouts: AtomicU64,
    frees: AtomicU64,
    reused: AtomicU64,
}

/// Reuse pool of fixed-size byte buffers.
///
/// Cheap to clone; clones share the same free lists and counters.
/// Stages take a pool handle explicitly, [`BufferPool::shared`] is only the
/// default they fall back to.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<Inner>,
}

impl BufferPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::with_max_idle(DEFAULT_MAX_IDLE)
    }

    /// Creates an empty pool keeping at most `max_idle` idle buffers per size.
    pub fn with_max_idle(max_idle: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                free: Mutex::new(HashMap::new()),
                max_idle,
                checkouts: AtomicU64::new(0),
                frees: AtomicU64::new(0),
                reused: AtomicU64::new(0),
            }),
        }
    }

    /// Process-wide default pool.
    pub fn shared() -> BufferPool {
        SHARED.get_or_init(BufferPool::new).clone()
    }

    /// Checks out a zeroed-length buffer with `size` bytes of capacity.
    ///
    /// A size of `0` is bumped to `1`.
    pub fn get(&self, size: usize) -> PooledBuf {
        let size = size.max(1);
        let recycled = self.inner.free.lock().get_mut(&size).and_then(Vec::pop);

        self.inner.checkouts.fetch_add(1, Ordering::Relaxed);
        let data = match recycled {
            Some(data) => {
                self.inner.reused.fetch_add(1, Ordering::Relaxed);
                data
            }
            None => vec![0u8; size],
        };
        PooledBuf::new(data, self.clone())
    }

    /// Returns the storage of a buffer; called from [`PooledBuf`]'s drop.
    pub(crate) fn put(&self, data: Vec<u8>) {
        self.inner.frees.fetch_add(1, Ordering::Relaxed);
        let mut free = self.inner.free.lock();
        let list = free.entry(data.len()).or_default();
        if list.len() < self.inner.max_idle {
            list.push(data);
        }
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            checkouts: self.inner.checkouts.load(Ordering::Relaxed),
            frees: self.inner.frees.load(Ordering::Relaxed),
            reused: self.inner.reused.load(Ordering::Relaxed),
        }
    }

    /// Number of idle buffers of `size` bytes.
    pub fn idle(&self, size: usize) -> usize {
        self.inner.free.lock().get(&size).map_or(0, Vec::len)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("stats", &self.stats())
            .finish()
    }
}
