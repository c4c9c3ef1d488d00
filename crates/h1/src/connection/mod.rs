//! Blocking HTTP/1.x connections.
//!
//! - [`HttpConnection`]: the server side, serving requests with a
//!   [`Handler`](crate::handler::Handler) until keep-alive ends or a reply closes the
//!   connection
//! - [`ClientConnection`]: the client side, sending requests and streaming back responses
//! - [`read_response`]: parses a response from any byte source
//!
//! Both sides run on the calling thread. Accepting sockets, spawning threads and TLS are
//! left to the caller.

mod client_connection;
mod http_connection;
mod message_writer;

pub use client_connection::{ClientConnection, read_response};
pub use http_connection::HttpConnection;
pub use message_writer::MessageWriter;
