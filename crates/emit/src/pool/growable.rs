use std::ops::Index;
use std::sync::Arc;

use crate::error::BufferError;

use super::BufferPool;

/// Variable-length byte sequence over pool-acquired backing storage.
///
/// Appending past the backing capacity acquires a larger buffer, copies
/// the live bytes across and releases the old backing exactly once. The
/// current backing returns to the pool when the value drops.
#[derive(Debug)]
pub struct GrowableBuffer {
    pool: Arc<BufferPool>,
    buf: Vec<u8>,
    len: usize,
}

impl GrowableBuffer {
    /// Copies `src[offset..offset + len]` into pooled backing storage.
    /// A range reaching outside `src` is refused.
    pub fn copy_from(
        pool: Arc<BufferPool>,
        src: &[u8],
        offset: usize,
        len: usize,
    ) -> Result<Self, BufferError> {
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= src.len())
            .ok_or_else(|| BufferError::out_of_range(offset, len, src.len()))?;

        let mut buf = pool.acquire(len);
        buf[..len].copy_from_slice(&src[offset..end]);
        Ok(Self { pool, buf, len })
    }

    /// Copies a whole slice into pooled backing storage.
    pub fn from_slice(pool: Arc<BufferPool>, src: &[u8]) -> Self {
        let mut buf = pool.acquire(src.len());
        buf[..src.len()].copy_from_slice(src);
        Self { pool, buf, len: src.len() }
    }

    /// Appends `data`, growing the backing store when it is too small.
    pub fn append(&mut self, data: &[u8]) {
        let new_len = self.len + data.len();
        if new_len > self.buf.len() {
            let mut bigger = self.pool.acquire(new_len);
            bigger[..self.len].copy_from_slice(&self.buf[..self.len]);
            let old = std::mem::replace(&mut self.buf, bigger);
            self.pool.release(old);
        }
        self.buf[self.len..new_len].copy_from_slice(data);
        self.len = new_len;
    }

    /// Number of live bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Length of the backing store, which may exceed [`len`](Self::len).
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// The live bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.as_slice().get(index).copied()
    }
}

impl AsRef<[u8]> for GrowableBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Index<usize> for GrowableBuffer {
    type Output = u8;

    /// Indexes the live bytes; positions at or past [`len`](Self::len)
    /// are out of bounds even when backing storage exists there.
    fn index(&self, index: usize) -> &u8 {
        &self.as_slice()[index]
    }
}

impl Drop for GrowableBuffer {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}
