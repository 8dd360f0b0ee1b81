use std::io;
use std::net::{Shutdown, SocketAddr};
use std::time::Duration;

use socket2::SockRef;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout};
use tracing::trace;

use crate::error::ConnError;

/// TCP connection wrapper for response emission.
///
/// The stream is never split; all I/O goes through the readiness API on
/// a shared reference, so the wrapper can sit behind an `Arc` for the
/// whole connection lifetime. Sends serialize through an async mutex:
/// concurrent senders interleave at call granularity, never mid-buffer.
///
/// Timeout semantics: a bounded send that misses its deadline is an
/// error, a bounded receive that misses its deadline reads as "no data
/// yet" (`Ok(0)`).
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    send_lock: Mutex<()>,
    local: SocketAddr,
    peer: SocketAddr,
}

impl Connection {
    /// Wraps an accepted stream, caching both endpoint addresses so they
    /// stay readable after shutdown.
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        let local = stream.local_addr()?;
        let peer = stream.peer_addr()?;
        Ok(Self { stream, send_lock: Mutex::new(()), local, peer })
    }

    /// Sends the whole buffer, waiting for writability as often as
    /// needed. Returns the number of bytes sent, always `data.len()`.
    pub async fn send_all(&self, data: &[u8]) -> Result<usize, ConnError> {
        let _guard = self.send_lock.lock().await;
        let mut sent = 0;
        self.send_loop(data, &mut sent).await?;
        Ok(data.len())
    }

    /// Sends the whole buffer within `limit`. An expired deadline yields
    /// [`ConnError::SendTimeout`] carrying how many bytes were already
    /// handed to the kernel; those bytes are not recalled, the error
    /// means completion was not confirmed in time.
    pub async fn send_within(&self, limit: Duration, data: &[u8]) -> Result<usize, ConnError> {
        let _guard = self.send_lock.lock().await;
        let started = Instant::now();
        let mut sent = 0;
        match timeout(limit, self.send_loop(data, &mut sent)).await {
            Ok(res) => {
                res?;
                Ok(data.len())
            }
            Err(_) => Err(ConnError::send_timeout(started.elapsed(), sent)),
        }
    }

    async fn send_loop(&self, data: &[u8], sent: &mut usize) -> Result<(), ConnError> {
        while *sent < data.len() {
            self.stream.writable().await?;
            match self.stream.try_write(&data[*sent..]) {
                Ok(n) => *sent += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Waits for data and reads once. `Ok(0)` means the peer closed.
    pub async fn recv(&self, buf: &mut [u8]) -> Result<usize, ConnError> {
        loop {
            self.stream.readable().await?;
            match self.stream.try_read(buf) {
                Ok(n) => return Ok(n),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Reads only data already buffered locally; never waits. `Ok(0)`
    /// when nothing is available.
    pub fn try_recv(&self, buf: &mut [u8]) -> Result<usize, ConnError> {
        match self.stream.try_read(buf) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads once within `limit`; an expired deadline yields `Ok(0)`.
    pub async fn recv_within(&self, limit: Duration, buf: &mut [u8]) -> Result<usize, ConnError> {
        match timeout(limit, self.recv(buf)).await {
            Ok(res) => res,
            Err(_) => Ok(0),
        }
    }

    /// Pushes coalesced bytes onto the wire by enabling `TCP_NODELAY`
    /// and turning it back off. A no-op when no-delay is already on.
    pub fn flush(&self) -> io::Result<()> {
        if !self.stream.nodelay()? {
            self.stream.set_nodelay(true)?;
            self.stream.set_nodelay(false)?;
        }
        Ok(())
    }

    /// Shuts the connection down in both directions. Closing an already
    /// closed connection is not an error.
    pub fn close(&self) -> io::Result<()> {
        trace!(peer = %self.peer, "shutting down connection");
        let sock = SockRef::from(&self.stream);
        match sock.shutdown(Shutdown::Both) {
            Err(ref e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn nodelay(&self) -> io::Result<bool> {
        self.stream.nodelay()
    }

    pub fn set_nodelay(&self, on: bool) -> io::Result<()> {
        self.stream.set_nodelay(on)
    }
}
