//! An asynchronous HTTP/1.1 connection engine
//!
//! This crate implements both sides of HTTP/1.1 message exchange over
//! non-blocking transports: per-connection state machines for reading and
//! writing framed messages, a server accept loop, and a sequential client.
//! It is a connection engine rather than a framework: no routing, no content
//! negotiation, no TLS. Handlers receive `http::Request` values with a
//! streaming body and return any `http_body::Body` response.
//!
//! # Features
//!
//! - Full HTTP/1.1 framing: fixed-length, chunked (with trailers) and
//!   close-delimited entities
//! - Restartable parsing across arbitrary read boundaries
//! - Pipelined requests with responses written strictly in request order
//! - Keep-alive and `Connection: close` persistence semantics, HTTP/1.0
//!   opt-in keep-alive
//! - Expect-continue mechanism
//! - Response header normalization (HEAD/204/205/304/1xx entity suppression)
//! - Truncated-entity detection on early EOF
//! - Zero-copy header parsing
//!
//! # Server example
//!
//! ```no_run
//! use http::{Request, Response};
//! use http_body_util::Full;
//! use bytes::Bytes;
//! use std::convert::Infallible;
//! use httpway::connector::ServerConnector;
//! use httpway::handler::handler_fn;
//! use httpway::protocol::body::ReqBody;
//!
//! async fn hello(_req: Request<ReqBody>) -> Result<Response<Full<Bytes>>, Infallible> {
//!     Ok(Response::new(Full::new(Bytes::from_static(b"hello world"))))
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     tracing_subscriber::fmt().init();
//!
//!     let server = ServerConnector::bind("127.0.0.1:8080", handler_fn(hello)).await?;
//!     server.run().await
//! }
//! ```
//!
//! # Client example
//!
//! ```no_run
//! use bytes::Bytes;
//! use http::Request;
//! use http_body_util::Empty;
//! use httpway::connector::ClientConnector;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut connection = ClientConnector::new().connect("127.0.0.1:8080").await?;
//!
//!     let request = Request::builder()
//!         .uri("http://127.0.0.1:8080/")
//!         .body(Empty::<Bytes>::new())?;
//!     let response = connection.send(request).await?;
//!
//!     println!("{}", response.status());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: message vocabulary ([`protocol::Message`],
//!   [`protocol::PayloadItem`], [`protocol::PayloadSize`]), head types and
//!   the error taxonomy
//! - [`codec`]: `tokio-util` codecs for heads and entities, composed into
//!   message codecs for each role and direction
//! - [`connection`]: the inbound/outbound ways and the connection that pairs
//!   them
//! - [`connector`]: server accept loop, client dialer and shared [`connector::Config`]
//! - [`handler`]: the application trait and `handler_fn` adapter
//!
//! # Limitations
//!
//! - HTTP/1.0 and HTTP/1.1 only
//! - No TLS (terminate it in front of the engine)
//! - Maximum header block size: 8 KiB (configurable)
//! - Maximum number of headers: 64

pub mod codec;
pub mod connection;
pub mod connector;
pub mod handler;
pub mod protocol;

mod utils;
