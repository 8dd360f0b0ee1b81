use std::fmt;
use std::io::{self, Write};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use tracing::trace;

use crate::error::ConnError;

use super::BodySink;

const DEFLATE: &str = "deflate";
const GZIP: &str = "gzip";

/// Staging target for encoder output.
struct Writer {
    buf: BytesMut,
}

impl Writer {
    fn new() -> Self {
        Self { buf: BytesMut::with_capacity(4096) }
    }

    fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A negotiated body encoder, deflate (zlib) or gzip.
pub struct Encoder {
    kind: Kind,
}

enum Kind {
    Gzip(GzEncoder<Writer>),
    Deflate(ZlibEncoder<Writer>),
}

impl Encoder {
    /// Picks the preferred encoding the client offered: deflate over
    /// gzip, `None` when neither appears.
    pub fn select(accept_encoding: &str) -> Option<Self> {
        let kind = if accept_encoding.contains(DEFLATE) {
            Kind::Deflate(ZlibEncoder::new(Writer::new(), Compression::default()))
        } else if accept_encoding.contains(GZIP) {
            Kind::Gzip(GzEncoder::new(Writer::new(), Compression::default()))
        } else {
            return None;
        };
        Some(Self { kind })
    }

    /// The token this encoder answers to in `Content-Encoding`.
    pub fn name(&self) -> &'static str {
        match &self.kind {
            Kind::Gzip(_) => GZIP,
            Kind::Deflate(_) => DEFLATE,
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match &mut self.kind {
            Kind::Gzip(e) => e.write_all(data),
            Kind::Deflate(e) => e.write_all(data),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.kind {
            Kind::Gzip(e) => e.flush(),
            Kind::Deflate(e) => e.flush(),
        }
    }

    fn take(&mut self) -> Bytes {
        match &mut self.kind {
            Kind::Gzip(e) => e.get_mut().take(),
            Kind::Deflate(e) => e.get_mut().take(),
        }
    }

    fn finish(self) -> io::Result<Bytes> {
        let mut writer = match self.kind {
            Kind::Gzip(e) => e.finish()?,
            Kind::Deflate(e) => e.finish()?,
        };
        Ok(writer.take())
    }
}

impl fmt::Debug for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Encoder").field(&self.name()).finish()
    }
}

/// Outermost body sink: compresses caller bytes and forwards whatever
/// the encoder has produced so far. Encoders buffer, so a write may
/// forward nothing; closing finishes the encoder, which emits valid
/// framing even for an empty body.
pub struct CompressSink {
    encoder: Option<Encoder>,
    inner: Box<dyn BodySink + Send>,
}

impl CompressSink {
    pub fn new(encoder: Encoder, inner: Box<dyn BodySink + Send>) -> Self {
        trace!(encoding = encoder.name(), "compressing response body");
        Self { encoder: Some(encoder), inner }
    }
}

#[async_trait]
impl BodySink for CompressSink {
    async fn write(&mut self, data: &[u8]) -> Result<(), ConnError> {
        let Some(encoder) = self.encoder.as_mut() else {
            return Ok(());
        };
        encoder.write(data)?;
        let staged = encoder.take();
        if !staged.is_empty() {
            self.inner.write(&staged).await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ConnError> {
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.flush()?;
            let staged = encoder.take();
            if !staged.is_empty() {
                self.inner.write(&staged).await?;
            }
        }
        self.inner.flush().await
    }

    async fn close(&mut self) -> Result<(), ConnError> {
        if let Some(encoder) = self.encoder.take() {
            let tail = encoder.finish()?;
            if !tail.is_empty() {
                self.inner.write(&tail).await?;
            }
        }
        self.inner.close().await
    }

    fn written(&self) -> u64 {
        self.inner.written()
    }
}

impl fmt::Debug for CompressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressSink")
            .field("encoder", &self.encoder)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::pool::BufferPool;
    use crate::sink::BlockSink;
    use flate2::read::{GzDecoder, ZlibDecoder};
    use std::io::Read;
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    async fn sink(accept_encoding: &str) -> (CompressSink, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let conn = Arc::new(Connection::new(server).unwrap());
        let pool = Arc::new(BufferPool::new());
        let block = BlockSink::with_buffer_size(conn, false, pool, 1);
        let encoder = Encoder::select(accept_encoding).unwrap();
        (CompressSink::new(encoder, Box::new(block)), client)
    }

    async fn drain(mut client: TcpStream) -> Vec<u8> {
        let mut got = Vec::new();
        client.read_to_end(&mut got).await.unwrap();
        got
    }

    #[test]
    fn selection_prefers_deflate() {
        assert_eq!(Encoder::select("gzip, deflate").unwrap().name(), "deflate");
        assert_eq!(Encoder::select("gzip").unwrap().name(), "gzip");
        assert!(Encoder::select("br").is_none());
        assert!(Encoder::select("").is_none());
    }

    #[tokio::test]
    async fn deflate_round_trips() {
        let (mut sink, client) = sink("deflate").await;
        let body = b"the quick brown fox jumps over the lazy dog".repeat(100);
        for piece in body.chunks(97) {
            sink.write(piece).await.unwrap();
        }
        sink.close().await.unwrap();

        let wire = drain(client).await;
        let mut plain = Vec::new();
        ZlibDecoder::new(&wire[..]).read_to_end(&mut plain).unwrap();
        assert_eq!(plain, body);
        assert!(wire.len() < body.len());
    }

    #[tokio::test]
    async fn gzip_round_trips() {
        let (mut sink, client) = sink("gzip").await;
        let body = b"hello hello hello hello hello".to_vec();
        sink.write(&body).await.unwrap();
        sink.close().await.unwrap();

        let wire = drain(client).await;
        let mut plain = Vec::new();
        GzDecoder::new(&wire[..]).read_to_end(&mut plain).unwrap();
        assert_eq!(plain, body);
    }

    #[tokio::test]
    async fn empty_body_still_frames_validly() {
        let (mut sink, client) = sink("gzip").await;
        sink.close().await.unwrap();

        let wire = drain(client).await;
        assert!(!wire.is_empty());
        let mut plain = Vec::new();
        GzDecoder::new(&wire[..]).read_to_end(&mut plain).unwrap();
        assert!(plain.is_empty());
    }

    #[tokio::test]
    async fn flush_pushes_compressed_bytes_through() {
        let (mut sink, mut client) = sink("deflate").await;
        sink.write(b"flush me please, there is data here").await.unwrap();
        sink.flush().await.unwrap();

        let mut buf = [0u8; 256];
        let n = client.read(&mut buf).await.unwrap();
        assert!(n > 0, "flush produced nothing on the wire");
        sink.close().await.unwrap();
    }
}
