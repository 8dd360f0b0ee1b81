use async_trait::async_trait;

use crate::error::ConnError;

use super::{BlockSink, BodySink};

/// Largest payload carried by a single chunk.
pub const MAX_CHUNK_SIZE: usize = 8 * 1024;

const EOL: &[u8] = b"\r\n";
const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// Wraps the block sink with HTTP/1.1 chunked transfer framing.
///
/// A write is split into full-size chunks plus a remainder, each framed
/// as `<uppercase hex size>\r\n<payload>\r\n`. Frames are assembled in
/// one scratch buffer sized for a full chunk, and the full-size header
/// is rendered once up front, so steady-state writes allocate nothing.
/// A zero-length write emits no frame; closing emits the terminal
/// `0\r\n\r\n` before closing the sink below.
#[derive(Debug)]
pub struct ChunkedSink {
    inner: BlockSink,
    chunk_size: usize,
    max_header: Vec<u8>,
    scratch: Vec<u8>,
}

impl ChunkedSink {
    pub fn new(inner: BlockSink) -> Self {
        Self::with_chunk_size(inner, MAX_CHUNK_SIZE)
    }

    pub fn with_chunk_size(inner: BlockSink, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        let max_header = chunk_header(chunk_size);
        let scratch = vec![0; max_header.len() + chunk_size + EOL.len()];
        Self { inner, chunk_size, max_header, scratch }
    }
}

fn chunk_header(size: usize) -> Vec<u8> {
    format!("{size:X}\r\n").into_bytes()
}

#[async_trait]
impl BodySink for ChunkedSink {
    async fn write(&mut self, data: &[u8]) -> Result<(), ConnError> {
        let blocks = data.len() / self.chunk_size;
        let overflow = data.len() % self.chunk_size;
        let mut offset = 0;

        if blocks > 0 {
            let header_len = self.max_header.len();
            let payload_end = header_len + self.chunk_size;
            self.scratch[..header_len].copy_from_slice(&self.max_header);
            self.scratch[payload_end..payload_end + EOL.len()].copy_from_slice(EOL);

            for _ in 0..blocks {
                self.scratch[header_len..payload_end]
                    .copy_from_slice(&data[offset..offset + self.chunk_size]);
                offset += self.chunk_size;
                let frame = payload_end + EOL.len();
                self.inner.write(&self.scratch[..frame]).await?;
            }
        }

        if overflow > 0 {
            let header = chunk_header(overflow);
            let mut frame = header.len();
            self.scratch[..frame].copy_from_slice(&header);
            self.scratch[frame..frame + overflow].copy_from_slice(&data[offset..]);
            frame += overflow;
            self.scratch[frame..frame + EOL.len()].copy_from_slice(EOL);
            frame += EOL.len();
            self.inner.write(&self.scratch[..frame]).await?;
        }

        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ConnError> {
        self.inner.flush().await
    }

    async fn close(&mut self) -> Result<(), ConnError> {
        self.inner.write(LAST_CHUNK).await?;
        self.inner.close().await
    }

    fn written(&self) -> u64 {
        self.inner.written()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::pool::BufferPool;
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    // A one-byte accumulator forwards every frame immediately.
    async fn sink(chunk_size: usize) -> (ChunkedSink, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let conn = Arc::new(Connection::new(server).unwrap());
        let pool = Arc::new(BufferPool::new());
        let block = BlockSink::with_buffer_size(conn, false, pool, 1);
        (ChunkedSink::with_chunk_size(block, chunk_size), client)
    }

    async fn drain(mut client: TcpStream) -> Vec<u8> {
        let mut got = Vec::new();
        client.read_to_end(&mut got).await.unwrap();
        got
    }

    #[tokio::test]
    async fn empty_write_emits_no_frame() {
        let (mut sink, client) = sink(4).await;
        sink.write(b"").await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(drain(client).await, b"0\r\n\r\n");
    }

    #[tokio::test]
    async fn single_byte_frames_as_a_remainder() {
        let (mut sink, client) = sink(4).await;
        sink.write(b"X").await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(drain(client).await, b"1\r\nX\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn exact_block_is_one_full_chunk() {
        let (mut sink, client) = sink(4).await;
        sink.write(b"abcd").await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(drain(client).await, b"4\r\nabcd\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn block_plus_one_splits_into_two_frames() {
        let (mut sink, client) = sink(4).await;
        sink.write(b"abcde").await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(drain(client).await, b"4\r\nabcd\r\n1\r\ne\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn long_write_repeats_full_frames() {
        let (mut sink, client) = sink(4).await;
        sink.write(b"abcdefgh").await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(drain(client).await, b"4\r\nabcd\r\n4\r\nefgh\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn chunk_sizes_render_as_uppercase_hex() {
        let (mut sink, client) = sink(26).await;
        sink.write(b"abcdefghijklmnopqrstuvwxyz").await.unwrap();
        sink.close().await.unwrap();
        let got = drain(client).await;
        assert!(got.starts_with(b"1A\r\n"), "got {:?}", String::from_utf8_lossy(&got));
    }

    #[tokio::test]
    async fn written_includes_framing() {
        let (mut sink, client) = sink(4).await;
        sink.write(b"abcd").await.unwrap();
        // "4\r\nabcd\r\n" is nine bytes at the block layer.
        assert_eq!(sink.written(), 9);
        sink.close().await.unwrap();
        drop(client);
    }
}
