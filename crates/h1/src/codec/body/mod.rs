//! Payload framing codecs.
//!
//! ## Decoders
//! - [`ChunkedDecoder`]: chunked transfer encoded payloads
//! - [`LengthDecoder`]: fixed-length payloads
//! - `UntilCloseDecoder`: payloads ending with the connection
//! - [`PayloadDecoder`]: picks one of the above from a [`Framing`](crate::protocol::Framing)
//!
//! ## Encoders
//! - `ChunkedEncoder`, `LengthEncoder` and the coordinating [`PayloadEncoder`]

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;
mod until_close_decoder;

pub use chunked_decoder::ChunkedDecoder;
pub use chunked_encoder::ChunkedEncoder;
pub use length_decoder::LengthDecoder;
pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
