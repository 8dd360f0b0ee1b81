use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::connection::Connection;
use crate::error::ConnError;
use crate::pool::BufferPool;

use super::BodySink;

/// Default accumulator size for a response stream.
pub const STREAM_BUFFER_SIZE: usize = 32 * 1024;

/// Innermost body sink: batches small writes through a pool-acquired
/// accumulator in front of the connection.
///
/// A write that would reach or exceed the accumulator's capacity first
/// sends the accumulated bytes, then sends the new data directly, so a
/// large payload never passes through the copy. [`written`] counts
/// logical bytes, including those still sitting in the accumulator, and
/// each byte exactly once.
///
/// [`written`]: BodySink::written
pub struct BlockSink {
    conn: Arc<Connection>,
    pool: Arc<BufferPool>,
    buf: Vec<u8>,
    pos: usize,
    written: u64,
    keep_alive: bool,
    open: bool,
}

impl BlockSink {
    pub fn new(conn: Arc<Connection>, keep_alive: bool, pool: Arc<BufferPool>) -> Self {
        Self::with_buffer_size(conn, keep_alive, pool, STREAM_BUFFER_SIZE)
    }

    pub fn with_buffer_size(
        conn: Arc<Connection>,
        keep_alive: bool,
        pool: Arc<BufferPool>,
        size: usize,
    ) -> Self {
        let buf = pool.acquire(size);
        Self { conn, pool, buf, pos: 0, written: 0, keep_alive, open: true }
    }
}

#[async_trait]
impl BodySink for BlockSink {
    async fn write(&mut self, data: &[u8]) -> Result<(), ConnError> {
        if !self.open {
            return Ok(());
        }

        if self.pos + data.len() >= self.buf.len() {
            if self.pos > 0 {
                self.conn.send_all(&self.buf[..self.pos]).await?;
            }
            self.conn.send_all(data).await?;
            self.pos = 0;
        } else {
            self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
            self.pos += data.len();
        }

        self.written += data.len() as u64;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ConnError> {
        if !self.open {
            return Ok(());
        }
        if self.pos > 0 {
            self.conn.send_all(&self.buf[..self.pos]).await?;
            self.pos = 0;
        }
        self.conn.flush()?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnError> {
        if !self.open {
            return Ok(());
        }
        if self.pos > 0 {
            self.conn.send_all(&self.buf[..self.pos]).await?;
            self.pos = 0;
        }
        self.conn.flush()?;
        if !self.keep_alive {
            self.conn.close()?;
        }
        self.open = false;
        self.pool.release(std::mem::take(&mut self.buf));
        Ok(())
    }

    fn written(&self) -> u64 {
        self.written
    }
}

impl Drop for BlockSink {
    fn drop(&mut self) {
        if self.open {
            if self.pos > 0 {
                warn!(
                    abandoned = self.pos,
                    peer = %self.conn.peer_addr(),
                    "body sink dropped with unflushed bytes"
                );
            }
            self.pool.release(std::mem::take(&mut self.buf));
        }
    }
}

impl std::fmt::Debug for BlockSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockSink")
            .field("pos", &self.pos)
            .field("written", &self.written)
            .field("keep_alive", &self.keep_alive)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;

    async fn sink(
        keep_alive: bool,
        size: usize,
    ) -> (BlockSink, TcpStream, Arc<BufferPool>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let conn = Arc::new(Connection::new(server).unwrap());
        let pool = Arc::new(BufferPool::new());
        let sink = BlockSink::with_buffer_size(conn, keep_alive, Arc::clone(&pool), size);
        (sink, client, pool)
    }

    #[tokio::test]
    async fn small_writes_stay_in_the_accumulator() {
        let (mut sink, client, _pool) = sink(false, 16).await;
        sink.write(b"abc").await.unwrap();
        assert_eq!(sink.written(), 3);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut buf = [0u8; 16];
        client
            .try_read(&mut buf)
            .expect_err("bytes leaked before any flush");
    }

    #[tokio::test]
    async fn reaching_the_boundary_flushes_then_forwards() {
        let (mut sink, mut client, _pool) = sink(false, 8).await;
        sink.write(b"abc").await.unwrap();
        // 3 + 5 reaches the 8 byte capacity, so both pieces go out now.
        sink.write(b"defgh").await.unwrap();

        let mut got = [0u8; 8];
        client.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"abcdefgh");

        // Position reset: the next small write buffers again.
        sink.write(b"xy").await.unwrap();
        sink.close().await.unwrap();
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"xy");
        assert_eq!(sink.written(), 10);
    }

    #[tokio::test]
    async fn oversized_write_bypasses_the_accumulator() {
        let (mut sink, mut client, _pool) = sink(false, 8).await;
        let data = [7u8; 100];
        sink.write(&data).await.unwrap();

        let mut got = [0u8; 100];
        client.read_exact(&mut got).await.unwrap();
        assert_eq!(got, data);
    }

    #[tokio::test]
    async fn close_flushes_and_closes_without_keep_alive() {
        let (mut sink, mut client, pool) = sink(false, 8192).await;
        sink.write(b"tail").await.unwrap();
        sink.close().await.unwrap();

        let mut got = Vec::new();
        client.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, b"tail");
        assert_eq!(sink.written(), 4, "close must not recount buffered bytes");

        // The 8 KiB accumulator went back to the pool.
        assert_eq!(pool.acquire(4096).len(), 8192);
    }

    #[tokio::test]
    async fn close_keeps_the_socket_open_with_keep_alive() {
        let (mut sink, mut client, _pool) = sink(true, 8192).await;
        sink.write(b"body").await.unwrap();
        sink.close().await.unwrap();

        let mut got = [0u8; 4];
        client.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"body");

        // No EOF: the read just waits.
        let mut buf = [0u8; 1];
        timeout(Duration::from_millis(100), client.read(&mut buf))
            .await
            .expect_err("socket closed despite keep-alive");
    }

    #[tokio::test]
    async fn writes_after_close_are_ignored() {
        let (mut sink, _client, _pool) = sink(true, 8192).await;
        sink.write(b"body").await.unwrap();
        sink.close().await.unwrap();
        sink.close().await.unwrap();

        sink.write(b"more").await.unwrap();
        assert_eq!(sink.written(), 4);
    }
}
