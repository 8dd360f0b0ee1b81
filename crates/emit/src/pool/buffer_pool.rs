use std::io::Cursor;

use crossbeam_queue::ArrayQueue;
use tracing::trace;

/// Upper bound of requests served by the small tier.
pub const SMALL_BUFFER_SIZE: usize = 4 * 1024;
/// Upper bound of requests served by the medium tier.
pub const MEDIUM_BUFFER_SIZE: usize = 32 * 1024;
/// Upper bound of requests served by the large tier. Anything above this
/// is freshly allocated and never drawn from a tier.
pub const LARGE_BUFFER_SIZE: usize = 256 * 1024;
/// Largest buffer the pool will retain on release.
pub const MAX_POOLED_SIZE: usize = 512 * 1024;

const SMALL_POOLED_BUFFERS: usize = 512;
const MEDIUM_POOLED_BUFFERS: usize = 256;
const LARGE_POOLED_BUFFERS: usize = 64;

/// Tiered pool of byte buffers.
///
/// Three bounded lock-free tiers serve allocation requests up to 4 KiB,
/// 32 KiB and 256 KiB. A released buffer is admitted to the largest tier
/// whose lower bound its length meets, which keeps every pooled buffer
/// large enough for any request its tier serves: `acquire(len)` always
/// returns at least `len` bytes. Buffers under 4 KiB or over
/// [`MAX_POOLED_SIZE`] are never retained, and a full tier simply drops
/// the release.
///
/// Reused buffers keep their previous contents; only fresh allocations
/// are zeroed. Callers must not read bytes they did not write.
#[derive(Debug)]
pub struct BufferPool {
    small: ArrayQueue<Vec<u8>>,
    medium: ArrayQueue<Vec<u8>>,
    large: ArrayQueue<Vec<u8>>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            small: ArrayQueue::new(SMALL_POOLED_BUFFERS),
            medium: ArrayQueue::new(MEDIUM_POOLED_BUFFERS),
            large: ArrayQueue::new(LARGE_POOLED_BUFFERS),
        }
    }

    /// Hands out a buffer of at least `len` bytes, reusing a pooled one
    /// when the matching tier has stock.
    pub fn acquire(&self, len: usize) -> Vec<u8> {
        let reused = self.request_tier(len).and_then(ArrayQueue::pop);
        match reused {
            Some(buf) => buf,
            None => {
                trace!(len, "buffer pool miss, allocating fresh");
                vec![0; len]
            }
        }
    }

    /// Offers a buffer back to the pool. Returns whether it was retained;
    /// a `false` return means the buffer was dropped (too small, too
    /// large, or its tier was full) and that is never an error.
    pub fn release(&self, buf: Vec<u8>) -> bool {
        match self.release_tier(buf.len()) {
            Some(tier) => tier.push(buf).is_ok(),
            None => false,
        }
    }

    /// Releases every buffer in the iterator, dropping the unretainable.
    pub fn release_all<I>(&self, bufs: I)
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        for buf in bufs {
            self.release(buf);
        }
    }

    /// Pooled counterpart of an in-memory stream: a cursor over a buffer
    /// of at least `len` bytes, positioned at the start.
    pub fn acquire_cursor(&self, len: usize) -> Cursor<Vec<u8>> {
        Cursor::new(self.acquire(len))
    }

    /// Recovers the backing buffer of a cursor handed out by
    /// [`acquire_cursor`](Self::acquire_cursor). Returns whether the
    /// storage was retained.
    pub fn release_cursor(&self, cursor: Cursor<Vec<u8>>) -> bool {
        self.release(cursor.into_inner())
    }

    fn request_tier(&self, len: usize) -> Option<&ArrayQueue<Vec<u8>>> {
        if len <= SMALL_BUFFER_SIZE {
            Some(&self.small)
        } else if len <= MEDIUM_BUFFER_SIZE {
            Some(&self.medium)
        } else if len <= LARGE_BUFFER_SIZE {
            Some(&self.large)
        } else {
            None
        }
    }

    // Largest tier whose lower bound the buffer length meets. Admission
    // by this rule is what guarantees acquire(len).len() >= len, and it
    // keeps a buffer in the same tier across reuse cycles.
    fn release_tier(&self, len: usize) -> Option<&ArrayQueue<Vec<u8>>> {
        if len > MAX_POOLED_SIZE {
            None
        } else if len >= LARGE_BUFFER_SIZE {
            Some(&self.large)
        } else if len >= MEDIUM_BUFFER_SIZE {
            Some(&self.medium)
        } else if len >= SMALL_BUFFER_SIZE {
            Some(&self.small)
        } else {
            None
        }
    }
}
