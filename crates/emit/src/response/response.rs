use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, trace};

use crate::connection::Connection;
use crate::error::{ConnError, ResponseError};
use crate::pool::{BufferPool, StringPool};
use crate::sink::{BlockSink, BodySink, ChunkedSink, CompressSink, Encoder};

use super::{Headers, MimeTable};

const EOL: &str = "\r\n";

/// HTTP protocol version carried on the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http10 => "1.0",
            Self::Http11 => "1.1",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controller for one HTTP response.
///
/// Owns the status line, header map and version until the body sink is
/// taken, then drives the sink chain it negotiated. A fresh response is
/// `200`, version 1.1, with the keep-alive default that version implies.
///
/// The body sink may be taken at most once per response. The controller
/// keeps ownership of the chain so [`close`](Self::close) can finish the
/// exchange whether or not a body was ever written.
pub struct Response {
    conn: Arc<Connection>,
    pool: Arc<BufferPool>,
    strings: Arc<StringPool>,
    mime: Arc<dyn MimeTable>,
    keep_alive_timeout: Duration,
    status: u16,
    description: Option<String>,
    version: Version,
    headers: Headers,
    sink: Option<Box<dyn BodySink + Send>>,
    active: bool,
}

impl Response {
    pub fn new(
        conn: Arc<Connection>,
        keep_alive_timeout: Duration,
        pool: Arc<BufferPool>,
        strings: Arc<StringPool>,
        mime: Arc<dyn MimeTable>,
    ) -> Self {
        let mut headers = Headers::new();
        // The 1.1 default, applied exactly as a later set_version would.
        headers.set_keep_alive(true);
        Self {
            conn,
            pool,
            strings,
            mime,
            keep_alive_timeout,
            status: 200,
            description: None,
            version: Version::Http11,
            headers,
            sink: None,
            active: false,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, code: u16) {
        self.status = code;
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, text: impl Into<String>) {
        self.description = Some(text.into());
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Accepts `"1.0"` or `"1.1"`, with or without an `HTTP/` prefix.
    /// Each version carries a connection-disposition default, applied
    /// only while no `Connection` header is set.
    pub fn set_version(&mut self, token: &str) -> Result<(), ResponseError> {
        let bare = token.strip_prefix("HTTP/").unwrap_or(token);
        let version = match bare {
            "1.0" => Version::Http10,
            "1.1" => Version::Http11,
            _ => {
                error!(token, "unsupported http version");
                return Err(ResponseError::invalid_version(token));
            }
        };

        if self.headers.connection().is_none_or(str::is_empty) {
            self.headers.set_keep_alive(version == Version::Http11);
        }
        self.version = version;
        Ok(())
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn keep_alive(&self) -> bool {
        self.headers.keep_alive()
    }

    pub fn set_keep_alive(&mut self, on: bool) {
        self.headers.set_keep_alive(on);
    }

    pub fn is_chunked(&self) -> bool {
        self.headers.is_chunked()
    }

    /// Whether the body sink was taken. Stays true after close.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Negotiates and returns the body sink. Callable at most once.
    ///
    /// Compression happens when the client offered an encoding, a
    /// compressible `Content-Type` is set and no `Content-Encoding` was
    /// chosen by hand; deflate wins over gzip. A compressed body always
    /// streams chunked with no `Content-Length`, and a keep-alive
    /// response without an explicit length falls back to chunked too.
    /// The rendered head is written through the new sink before it is
    /// handed out.
    pub async fn body_sink(
        &mut self,
        accept_encoding: Option<&str>,
    ) -> Result<&mut (dyn BodySink + Send), ResponseError> {
        if self.active {
            error!(status = self.status, "body sink requested twice");
            return Err(ResponseError::AlreadyActive);
        }

        let accept = accept_encoding.filter(|a| !a.is_empty());
        let negotiable = match (accept, self.headers.content_type()) {
            (Some(_), Some(content_type)) => {
                self.mime.is_compressible(content_type)
                    && self.headers.content_encoding().is_none_or(str::is_empty)
            }
            _ => false,
        };
        let encoder = if negotiable {
            accept.and_then(Encoder::select)
        } else {
            None
        };
        if let Some(encoder) = &encoder {
            trace!(encoding = encoder.name(), "negotiated content encoding");
            self.headers.set("Content-Encoding", encoder.name());
            self.headers.set_content_length(None);
            self.headers.set("Transfer-Encoding", "chunked");
        }

        // A reusable connection needs a delimited body.
        if self.headers.keep_alive()
            && !self.headers.is_chunked()
            && self.headers.content_length().is_none()
        {
            self.headers.set("Transfer-Encoding", "chunked");
        }

        let head = self.render_head();
        let keep_alive = self.headers.keep_alive();
        let mut block = BlockSink::new(Arc::clone(&self.conn), keep_alive, Arc::clone(&self.pool));
        block.write(&head).await?;

        let sink: Box<dyn BodySink + Send> = if self.headers.is_chunked() {
            Box::new(ChunkedSink::new(block))
        } else {
            Box::new(block)
        };
        let sink = match encoder {
            Some(encoder) => Box::new(CompressSink::new(encoder, sink)) as Box<dyn BodySink + Send>,
            None => sink,
        };

        self.active = true;
        Ok(self.sink.insert(sink).as_mut())
    }

    /// Finishes the exchange. When no body sink was ever taken, an empty
    /// response goes out first: keep-alive advertises `Content-Length:
    /// 0`, otherwise the length is dropped with the connection. Socket
    /// teardown happens at most once; closing again is a no-op.
    pub async fn close(&mut self) -> Result<(), ResponseError> {
        if self.sink.is_none() && !self.active {
            self.headers
                .set_content_length(self.headers.keep_alive().then_some(0));
            self.headers.remove("Transfer-Encoding");
            self.body_sink(None).await?;
        }

        if let Some(mut sink) = self.sink.take() {
            sink.close().await?;
        }
        Ok(())
    }

    /// Answers with `307 Moved` at `url` and finishes the exchange.
    /// Refused once a body sink exists.
    pub async fn redirect(&mut self, url: &str) -> Result<(), ResponseError> {
        if self.active {
            error!(url, "redirect refused, response already active");
            return Err(ResponseError::AlreadyActive);
        }

        self.status = 307;
        self.description = Some("Moved".to_string());
        self.headers.set("Location", url);
        self.close().await
    }

    /// Sends bytes straight to the connection, outside the header/body
    /// pipeline, optionally bounded by a deadline and followed by a
    /// flush. The escape hatch for handshake-style exchanges.
    pub async fn raw_send(
        &self,
        timeout: Option<Duration>,
        data: &[u8],
        flush: bool,
    ) -> Result<usize, ResponseError> {
        let sent = match timeout {
            Some(limit) => self.conn.send_within(limit, data).await?,
            None => self.conn.send_all(data).await?,
        };
        if flush {
            self.conn.flush().map_err(ConnError::io)?;
        }
        Ok(sent)
    }

    fn render_head(&mut self) -> Vec<u8> {
        if self.headers.keep_alive() {
            let timeout = format!("timeout={}", self.keep_alive_timeout.as_secs());
            self.headers.set("Keep-Alive", timeout);
        } else {
            self.headers.remove("Keep-Alive");
        }

        let mut text = self.strings.acquire();
        text.push_str("HTTP/");
        text.push_str(self.version.as_str());
        text.push(' ');
        text.push_str(&self.status.to_string());
        match &self.description {
            Some(desc) if !desc.is_empty() => {
                text.push(' ');
                text.push_str(desc);
            }
            _ if self.status == 200 => text.push_str(" OK"),
            _ => {}
        }
        text.push_str(EOL);

        for (name, value) in &self.headers {
            text.push_str(name);
            text.push_str(": ");
            text.push_str(value);
            text.push_str(EOL);
        }
        text.push_str(EOL);

        let head = text.as_bytes().to_vec();
        self.strings.release(text);
        head
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("version", &self.version)
            .field("active", &self.active)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
