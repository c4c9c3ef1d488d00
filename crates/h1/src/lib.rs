//! A blocking HTTP/1.x message engine
//!
//! This crate frames and streams HTTP/1.x messages over plain blocking byte streams, for
//! both the client and the server role. Its core is the body pipeline: working out how
//! many body bytes follow a head, removing chunked framing, detecting and removing
//! content codings, and handing out a body that leaves the connection ready for the next
//! message once it is consumed or drained.
//!
//! # Features
//!
//! - Content-length, chunked and read-until-close framing
//! - gzip, zlib wrapped and raw deflate decoding, with magic byte sniffing of mislabeled
//!   bodies
//! - Pluggable decoders for further content codings, zstd and brotli included
//! - Keep-alive with automatic skipping of unread bodies
//! - `Expect: 100-continue`
//! - Splitting of `multipart/*` bodies
//!
//! # Example
//!
//! ```no_run
//! use std::net::TcpListener;
//! use std::thread;
//!
//! use http::{Request, Response};
//! use micro_h1::body::{BodyConfig, BodyStream};
//! use micro_h1::connection::HttpConnection;
//! use micro_h1::handler::make_handler;
//! use micro_h1::protocol::{BodyError, ConnectionContext};
//!
//! fn echo(_context: &ConnectionContext, request: Request<BodyStream<'_>>) -> Result<Response<String>, BodyError> {
//!     let body = request.into_body().read_as_string()?;
//!     Ok(Response::new(body))
//! }
//!
//! let listener = TcpListener::bind("127.0.0.1:8080").unwrap();
//! for stream in listener.incoming() {
//!     let stream = stream.unwrap();
//!     thread::spawn(move || {
//!         let context = ConnectionContext::new(stream.peer_addr().ok());
//!         let reader = stream.try_clone().unwrap();
//!         let mut connection = HttpConnection::new(reader, stream, context, BodyConfig::server());
//!         let _ = connection.process(&make_handler(echo));
//!     });
//! }
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: message types, framing rules, connection facts and errors
//! - [`codec`]: sans-IO decoders and encoders for heads and framed payloads
//! - [`body`]: the blocking body pipeline and [`body::BodyStream`]
//! - [`connection`]: server and client connections
//! - [`handler`]: the request handler trait
//!
//! # Limitations
//!
//! - HTTP/1.x only
//! - No TLS, callers wrap their own streams
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64

pub mod body;
pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
