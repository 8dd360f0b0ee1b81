//! Reusable storage for the hot paths of response emission.
//!
//! Allocation churn dominates a naive HTTP server: every response wants a
//! staging buffer, every header block wants a string to grow into. The
//! types here recycle that storage through lock-free bounded queues so the
//! steady state allocates nothing. Pools are plain values shared with
//! [`Arc`](std::sync::Arc); there is no global instance.

mod buffer_pool;
mod growable;
mod string_pool;

pub use buffer_pool::{
    BufferPool, LARGE_BUFFER_SIZE, MAX_POOLED_SIZE, MEDIUM_BUFFER_SIZE, SMALL_BUFFER_SIZE,
};
pub use growable::GrowableBuffer;
pub use string_pool::StringPool;
