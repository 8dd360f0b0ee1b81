//! The body emission pipeline.
//!
//! A response body flows through a chain of sinks, each adding one
//! concern on the way to the connection:
//!
//! ```text
//! caller bytes -> [CompressSink] -> [ChunkedSink] -> BlockSink -> Connection
//! ```
//!
//! [`BlockSink`] always sits at the bottom and owns the socket
//! disposition at close; the other two are layered on per response
//! during negotiation. Every layer exposes the same narrow capability,
//! [`BodySink`], so callers only ever talk to the outermost sink.

use async_trait::async_trait;

use crate::error::ConnError;

mod block;
mod chunked;
mod compress;

pub use block::{BlockSink, STREAM_BUFFER_SIZE};
pub use chunked::{ChunkedSink, MAX_CHUNK_SIZE};
pub use compress::{CompressSink, Encoder};

/// One stage of the body pipeline: accept bytes, flush, close.
#[async_trait]
pub trait BodySink: Send {
    /// Accepts body bytes for emission.
    async fn write(&mut self, data: &[u8]) -> Result<(), ConnError>;

    /// Pushes everything staged at this layer toward the wire.
    async fn flush(&mut self) -> Result<(), ConnError>;

    /// Finishes the body, flushes the chain and settles the connection
    /// according to keep-alive. Closing twice is harmless.
    async fn close(&mut self) -> Result<(), ConnError>;

    /// Bytes accounted so far at the block layer, framing included.
    fn written(&self) -> u64;
}
