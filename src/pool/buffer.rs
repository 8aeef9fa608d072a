use std::fmt;

use super::arena::BufferPool;

/// A byte buffer checked out from a [`BufferPool`].
///
/// Layout: `data[..len]` holds valid bytes, `data[off..len]` are the bytes not
/// consumed yet, `data[len..]` is free space.
///
/// The buffer goes back to its pool exactly once: [`free`](Self::free)
/// consumes the handle, and dropping an unfreed handle returns it as well.
pub struct PooledBuf {
    data: Vec<u8>,
    len: usize,
    off: usize,
    pool: BufferPool,
}

impl PooledBuf {
    pub(crate) fn new(data: Vec<u8>, pool: BufferPool) -> Self {
        Self {
            data,
            len: 0,
            off: 0,
            pool,
        }
    }

    /// Total capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no valid bytes are held.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if no free space is left.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.data.len()
    }

    /// Current read offset.
    #[inline]
    pub fn offset(&self) -> usize {
        self.off
    }

    /// Valid bytes not consumed yet.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.len - self.off
    }

    /// Free space left for appends.
    #[inline]
    pub fn available(&self) -> usize {
        self.data.len() - self.len
    }

    /// All valid bytes.
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Valid bytes from the read offset on.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.off..self.len]
    }

    /// Free space, to be filled and then [`commit`](Self::commit)ted.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.len..]
    }

    /// Marks `n` bytes of spare space as valid.
    pub fn commit(&mut self, n: usize) {
        self.len = (self.len + n).min(self.data.len());
    }

    /// Copies as much of `src` as fits; returns the number of bytes taken.
    pub fn append(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.available());
        self.data[self.len..self.len + n].copy_from_slice(&src[..n]);
        self.len += n;
        n
    }

    /// Copies unread bytes into `dst` and advances the offset.
    pub fn take_into(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.remaining());
        dst[..n].copy_from_slice(&self.data[self.off..self.off + n]);
        self.off += n;
        n
    }

    /// Advances the read offset by up to `n` bytes.
    pub fn advance(&mut self, n: usize) {
        self.off = (self.off + n).min(self.len);
    }

    /// Empties the buffer for reuse by the same owner.
    pub fn reset(&mut self) {
        self.len = 0;
        self.off = 0;
    }

    /// Returns the buffer to its pool.
    pub fn free(self) {
        drop(self);
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.pool.put(data);
    }
}

impl fmt::Debug for PooledBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuf")
            .field("capacity", &self.capacity())
            .field("len", &self.len)
            .field("off", &self.off)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_take_tracks_offsets() {
        let pool = BufferPool::new();
        let mut buf = pool.get(4);

        assert_eq!(buf.append(b"abcdef"), 4);
        assert!(buf.is_full());

        let mut out = [0u8; 3];
        assert_eq!(buf.take_into(&mut out), 3);
        assert_eq!(&out, b"abc");
        assert_eq!(buf.unread(), b"d");
        assert_eq!(buf.remaining(), 1);

        buf.reset();
        assert!(buf.is_empty());
        assert_eq!(buf.available(), 4);
    }

    #[test]
    fn spare_and_commit() {
        let pool = BufferPool::new();
        let mut buf = pool.get(8);
        buf.spare_mut()[..2].copy_from_slice(b"hi");
        buf.commit(2);
        assert_eq!(buf.filled(), b"hi");
        buf.commit(100);
        assert_eq!(buf.len(), 8);
    }
}
