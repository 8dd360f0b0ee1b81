use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnError {
    #[error("send timed out after {elapsed:?} with {sent} bytes handed to the kernel")]
    SendTimeout { elapsed: Duration, sent: usize },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ConnError {
    pub fn send_timeout(elapsed: Duration, sent: usize) -> Self {
        Self::SendTimeout { elapsed, sent }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Whether the error is the send deadline expiring rather than a
    /// broken transport.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::SendTimeout { .. })
    }
}

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("offset {offset} + length {len} exceeds source of {size} bytes")]
    OutOfRange { offset: usize, len: usize, size: usize },
}

impl BufferError {
    pub fn out_of_range(offset: usize, len: usize, size: usize) -> Self {
        Self::OutOfRange { offset, len, size }
    }
}

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response body sink already taken")]
    AlreadyActive,

    #[error("invalid http version: {0:?}")]
    InvalidVersion(String),

    #[error("connection error: {source}")]
    Conn {
        #[from]
        source: ConnError,
    },
}

impl ResponseError {
    pub fn invalid_version<S: ToString>(token: S) -> Self {
        Self::InvalidVersion(token.to_string())
    }

    /// Whether the error is a misuse of the response state machine as
    /// opposed to a transport failure.
    pub fn is_state_error(&self) -> bool {
        matches!(self, Self::AlreadyActive | Self::InvalidVersion(_))
    }
}
