//! Sans-IO codecs for HTTP/1.x messages.
//!
//! Everything in here works on `BytesMut` buffers through the `tokio_util::codec`
//! [`Decoder`](tokio_util::codec::Decoder) and [`Encoder`](tokio_util::codec::Encoder)
//! traits and never touches a socket. The blocking readers in [`crate::body`] and the
//! connections in [`crate::connection`] feed them.
//!
//! - [`header`]: request and response heads
//! - [`body`]: payload framing (content-length, chunked, until-close)
//! - [`MessageEncoder`]: a head followed by its framed payload

pub mod body;
pub mod header;
mod message_encoder;

pub use body::{ChunkedDecoder, ChunkedEncoder, LengthDecoder, PayloadDecoder, PayloadEncoder};
pub use header::{RequestHeadDecoder, RequestHeadEncoder, ResponseHeadDecoder, ResponseHeadEncoder};
pub use message_encoder::{MessageEncoder, RequestEncoder, ResponseEncoder};
