//! A static file server built on the emission pipeline.
//!
//! Serves `GET` requests out of a `www/` directory under the working
//! directory, redirecting directories to their `index.html`, negotiating
//! compression from the content-type table, revalidating cached copies
//! with `If-Modified-Since`/`304` and reusing keep-alive connections:
//!
//! ```sh
//! cargo run --example static_server
//! curl -v --compressed http://127.0.0.1:3010/index.html
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use httpdate::{fmt_http_date, parse_http_date};
use tokio::net::TcpListener;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use micro_emit::connection::Connection;
use micro_emit::error::{ConnError, ResponseError};
use micro_emit::pool::{BufferPool, GrowableBuffer, StringPool};
use micro_emit::response::{MimeTable, Response};
use micro_emit::sink::{BodySink, STREAM_BUFFER_SIZE};

const PORT: u16 = 3010;
const WEB_ROOT: &str = "www";
const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_HEAD_SIZE: usize = 8 * 1024;

struct ContentTypeInfo {
    content_type: &'static str,
    compressible: bool,
}

struct ContentTypes {
    by_extension: HashMap<&'static str, ContentTypeInfo>,
}

impl ContentTypes {
    fn new() -> Self {
        let table = [
            ("jpg", "image/jpg", false),
            ("png", "image/png", false),
            ("gif", "image/gif", false),
            ("ico", "image/ico", true),
            ("bmp", "image/x-ms-bmp", true),
            ("html", "text/html", true),
            ("htm", "text/html", true),
            ("css", "text/css", true),
            ("js", "text/javascript", true),
            ("txt", "text/plain", true),
            ("xml", "text/xml", true),
            ("woff", "application/font-woff", false),
            ("svg", "image/svg+xml", true),
        ];
        let by_extension = table
            .into_iter()
            .map(|(extension, content_type, compressible)| {
                (extension, ContentTypeInfo { content_type, compressible })
            })
            .collect();
        Self { by_extension }
    }

    fn lookup(&self, path: &Path) -> Option<&ContentTypeInfo> {
        let extension = path.extension()?.to_str()?;
        self.by_extension.get(extension)
    }
}

impl MimeTable for ContentTypes {
    fn is_compressible(&self, content_type: &str) -> bool {
        self.by_extension
            .values()
            .any(|info| info.content_type == content_type && info.compressible)
    }
}

struct Request {
    method: String,
    uri: String,
    accept_encoding: Option<String>,
    if_modified_since: Option<String>,
    keep_alive: bool,
}

impl Request {
    fn parse(head: &str) -> Option<Self> {
        let mut lines = head.split("\r\n");
        let mut request_line = lines.next()?.split(' ');
        let method = request_line.next()?.to_string();
        let uri = request_line.next()?.to_string();
        let version = request_line.next()?;
        if method.is_empty() || uri.is_empty() {
            return None;
        }

        let mut accept_encoding = None;
        let mut if_modified_since = None;
        let mut connection = None;
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                let value = value.trim().to_string();
                if name.eq_ignore_ascii_case("accept-encoding") {
                    accept_encoding = Some(value);
                } else if name.eq_ignore_ascii_case("if-modified-since") {
                    if_modified_since = Some(value);
                } else if name.eq_ignore_ascii_case("connection") {
                    connection = Some(value);
                }
            }
        }

        let keep_alive = match &connection {
            Some(disposition) => disposition.eq_ignore_ascii_case("keep-alive"),
            None => version == "HTTP/1.1",
        };

        Some(Self { method, uri, accept_encoding, if_modified_since, keep_alive })
    }
}

struct ServerState {
    pool: Arc<BufferPool>,
    strings: Arc<StringPool>,
    content_types: Arc<ContentTypes>,
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let state = Arc::new(ServerState {
        pool: Arc::new(BufferPool::new()),
        strings: Arc::new(StringPool::for_headers()),
        content_types: Arc::new(ContentTypes::new()),
    });

    info!(port = PORT, root = WEB_ROOT, "start listening");
    let listener = match TcpListener::bind(("127.0.0.1", PORT)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(stream_and_addr) => stream_and_addr,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };

        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let conn = match Connection::new(stream) {
                Ok(conn) => Arc::new(conn),
                Err(e) => {
                    warn!(cause = %e, "failed to adopt stream");
                    return;
                }
            };
            if let Err(e) = serve_connection(conn, state).await {
                warn!(peer = %remote_addr, cause = %e, "connection ended with error");
            }
        });
    }
}

async fn serve_connection(conn: Arc<Connection>, state: Arc<ServerState>) -> Result<(), ConnError> {
    loop {
        let head = match read_head(&conn, &state.pool).await? {
            Some(head) => head,
            None => return Ok(()),
        };
        let request = match Request::parse(&head) {
            Some(request) => request,
            None => {
                warn!(peer = %conn.peer_addr(), "malformed request head");
                return conn.close().map_err(ConnError::io);
            }
        };

        let mut response = Response::new(
            Arc::clone(&conn),
            KEEP_ALIVE_TIMEOUT,
            Arc::clone(&state.pool),
            Arc::clone(&state.strings),
            Arc::clone(&state.content_types) as Arc<dyn MimeTable>,
        );
        response.set_keep_alive(request.keep_alive);

        if let Err(e) = handle_request(&request, &mut response, &state).await {
            error!(uri = %request.uri, cause = %e, "request failed");
            return Ok(());
        }
        info!(
            method = %request.method,
            uri = %request.uri,
            status = response.status(),
            "served"
        );

        if !response.keep_alive() {
            return Ok(());
        }
    }
}

/// Accumulates bytes until the blank line ends the head. `None` means
/// the peer closed or idled past the keep-alive window.
async fn read_head(
    conn: &Connection,
    pool: &Arc<BufferPool>,
) -> Result<Option<String>, ConnError> {
    let mut head = GrowableBuffer::from_slice(Arc::clone(pool), b"");
    let mut buf = [0u8; 2048];
    loop {
        let n = conn.recv_within(KEEP_ALIVE_TIMEOUT, &mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        head.append(&buf[..n]);

        if let Some(end) = find_head_end(head.as_slice()) {
            // Anything past the head is dropped; the demo answers one
            // request at a time.
            let text = String::from_utf8_lossy(&head.as_slice()[..end]).into_owned();
            return Ok(Some(text));
        }
        if head.len() > MAX_HEAD_SIZE {
            warn!("request head exceeds {MAX_HEAD_SIZE} bytes");
            return Ok(None);
        }
    }
}

fn find_head_end(bytes: &[u8]) -> Option<usize> {
    bytes.windows(4).position(|window| window == b"\r\n\r\n")
}

async fn handle_request(
    request: &Request,
    response: &mut Response,
    state: &ServerState,
) -> Result<(), ResponseError> {
    if request.method != "GET" || !validate_uri_path(&request.uri) {
        response.set_status(404);
        return response.close().await;
    }

    let path = PathBuf::from(WEB_ROOT).join(request.uri.trim_start_matches('/'));
    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) => metadata,
        Err(_) => {
            response.set_status(404);
            return response.close().await;
        }
    };

    if metadata.is_dir() {
        let target = url_append_path(&request.uri, "index.html");
        return response.redirect(&target).await;
    }

    let Some(info) = state.content_types.lookup(&path) else {
        response.set_status(404);
        return response.close().await;
    };

    let modified = metadata.modified().ok().map(truncate_to_seconds);
    if client_copy_is_current(request.if_modified_since.as_deref(), modified) {
        response.set_status(304);
        response.headers_mut().set("Content-Type", info.content_type);
        return response.close().await;
    }

    let contents = match tokio::fs::read(&path).await {
        Ok(contents) => contents,
        Err(e) => {
            warn!(path = %path.display(), cause = %e, "read failed");
            response.set_status(500);
            return response.close().await;
        }
    };

    if let Some(modified) = modified {
        response.headers_mut().set("Last-Modified", fmt_http_date(modified));
    }
    response.headers_mut().set("Content-Type", info.content_type);
    let sink = response
        .body_sink(request.accept_encoding.as_deref())
        .await?;
    for block in contents.chunks(STREAM_BUFFER_SIZE) {
        sink.write(block).await?;
    }
    response.close().await
}

fn url_append_path(url: &str, path: &str) -> String {
    let terminated = url.ends_with('/');
    let prefixed = path.starts_with('/');
    match (terminated, prefixed) {
        (true, true) => format!("{url}{}", &path[1..]),
        (false, false) => format!("{url}/{path}"),
        _ => format!("{url}{path}"),
    }
}

/// Whether the client's cached copy is at least as new as the file.
/// An unparseable header counts as no header.
fn client_copy_is_current(if_modified_since: Option<&str>, modified: Option<SystemTime>) -> bool {
    match (if_modified_since, modified) {
        (Some(header), Some(modified)) => {
            parse_http_date(header).is_ok_and(|cached| modified <= cached)
        }
        _ => false,
    }
}

/// HTTP dates resolve to whole seconds, so the sub-second part of an
/// mtime stays out of the comparison.
fn truncate_to_seconds(time: SystemTime) -> SystemTime {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(since_epoch) => SystemTime::UNIX_EPOCH + Duration::from_secs(since_epoch.as_secs()),
        Err(_) => time,
    }
}

/// Refuses escaped or relative paths that would walk above the web root.
fn validate_uri_path(uri: &str) -> bool {
    let decoded = uri
        .replace("%2e", ".")
        .replace("%2E", ".")
        .replace("%2f", "/")
        .replace("%2F", "/");
    if !decoded.contains("..") {
        return true;
    }

    let mut depth = 0i32;
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => depth += 1,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_time(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn stale_copy_is_served_again() {
        let modified = http_time(1_700_000_000);
        let cached = fmt_http_date(http_time(1_699_999_940));
        assert!(!client_copy_is_current(Some(&cached), Some(modified)));
    }

    #[test]
    fn echoed_last_modified_revalidates() {
        let modified = http_time(1_700_000_000);
        let echoed = fmt_http_date(modified);
        assert!(client_copy_is_current(Some(&echoed), Some(modified)));

        let newer = fmt_http_date(http_time(1_700_000_060));
        assert!(client_copy_is_current(Some(&newer), Some(modified)));
    }

    #[test]
    fn sub_second_mtime_revalidates_after_truncation() {
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        let modified = truncate_to_seconds(mtime);
        assert_eq!(modified, http_time(1_700_000_000));

        let echoed = fmt_http_date(modified);
        assert!(client_copy_is_current(Some(&echoed), Some(modified)));
    }

    #[test]
    fn unparseable_or_missing_header_is_ignored() {
        let modified = http_time(1_700_000_000);
        assert!(!client_copy_is_current(Some("last tuesday"), Some(modified)));
        assert!(!client_copy_is_current(None, Some(modified)));
        let header = "Thu, 01 Jan 1970 00:00:00 GMT";
        assert!(!client_copy_is_current(Some(header), None));
    }

    #[test]
    fn request_parse_captures_the_revalidation_header() {
        let head = "GET /a.html HTTP/1.1\r\n\
                    If-Modified-Since: Tue, 14 Nov 2023 22:13:20 GMT\r\n\
                    Connection: close\r\n";
        let request = Request::parse(head).unwrap();
        assert_eq!(
            request.if_modified_since.as_deref(),
            Some("Tue, 14 Nov 2023 22:13:20 GMT")
        );
        assert!(!request.keep_alive);
    }
}
