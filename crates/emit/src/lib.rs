//! Pooled buffers and HTTP/1.x response emission over raw TCP
//!
//! This crate provides the sending half of a small HTTP/1.x server: a tiered
//! buffer pool that recycles allocations across requests, a readiness-based
//! socket wrapper, and a response controller that renders heads and streams
//! bodies through a composable sink chain (block buffering, chunked framing,
//! and negotiated compression).
//!
//! # Features
//!
//! - Tiered buffer recycling with bounded per-tier capacity
//! - Asynchronous socket I/O using tokio readiness APIs
//! - Deadline-bounded sends with partial-progress reporting
//! - Chunked transfer encoding with uppercase hex framing
//! - gzip/deflate content negotiation driven by `Accept-Encoding`
//! - Keep-alive aware connection teardown
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use micro_emit::connection::Connection;
//! use micro_emit::pool::{BufferPool, StringPool};
//! use micro_emit::response::{MimeTable, Response};
//! use micro_emit::sink::BodySink;
//! use tokio::net::TcpListener;
//! use tracing::{error, info, Level};
//! use tracing_subscriber::FmtSubscriber;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Initialize logging
//!     let subscriber = FmtSubscriber::builder()
//!         .with_max_level(Level::INFO)
//!         .finish();
//!     tracing::subscriber::set_global_default(subscriber)
//!         .expect("setting default subscriber failed");
//!
//!     let pool = Arc::new(BufferPool::new());
//!     let strings = Arc::new(StringPool::for_headers());
//!     let mime: Arc<dyn MimeTable> =
//!         Arc::new(|content_type: &str| content_type.starts_with("text/"));
//!
//!     info!(port = 8080, "start listening");
//!     let listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(listener) => listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     loop {
//!         let (stream, _remote_addr) = match listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 error!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let (pool, strings, mime) = (pool.clone(), strings.clone(), mime.clone());
//!         tokio::spawn(async move {
//!             let conn = match Connection::new(stream) {
//!                 Ok(conn) => Arc::new(conn),
//!                 Err(e) => {
//!                     error!(cause = %e, "failed to adopt stream");
//!                     return;
//!                 }
//!             };
//!
//!             let mut response =
//!                 Response::new(conn, Duration::from_secs(15), pool, strings, mime);
//!             response.headers_mut().set("Content-Type", "text/plain");
//!             response.set_keep_alive(false);
//!             match response.body_sink(None).await {
//!                 Ok(sink) => {
//!                     if let Err(e) = sink.write(b"Hello World!\r\n").await {
//!                         error!(cause = %e, "failed to write body");
//!                     }
//!                 }
//!                 Err(e) => error!(cause = %e, "failed to take body sink"),
//!             }
//!             if let Err(e) = response.close().await {
//!                 error!(cause = %e, "failed to close response");
//!             }
//!         });
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`pool`]: Buffer, string and cursor recycling
//! - [`connection`]: Socket wrapper with send serialization and deadlines
//! - [`sink`]: The body sink chain (block buffering, chunking, compression)
//! - [`response`]: Header map and the response controller
//! - [`error`]: Error types shared across the layers
//!
//! # Buffer Reuse
//!
//! [`pool::BufferPool`] hands out buffers from three size tiers and takes
//! them back when a sink or [`pool::GrowableBuffer`] is done with them.
//! Reused buffers keep their previous contents; callers track how much of a
//! buffer they filled. Requests larger than the biggest tier fall through to
//! plain allocation so a single oversized response cannot poison the pool.
//!
//! # Limitations
//!
//! - Response side only; request parsing is out of scope
//! - HTTP/1.0 and 1.1 only
//! - No TLS support (use a reverse proxy for HTTPS)
//! - Compression negotiation covers gzip and deflate, not br or zstd

pub mod connection;
pub mod error;
pub mod pool;
pub mod response;
pub mod sink;
