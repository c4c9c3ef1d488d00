//! Head parsing and serialization.
//!
//! - [`RequestHeadDecoder`] / [`ResponseHeadDecoder`]: parse a start line and header block
//!   with `httparse`, enforcing [`MAX_HEADER_NUM`] and [`MAX_HEADER_BYTES`]
//! - [`RequestHeadEncoder`] / [`ResponseHeadEncoder`]: write a head together with the
//!   framing headers of the body that follows

mod header_decoder;
mod header_encoder;

pub use header_decoder::{MAX_HEADER_BYTES, MAX_HEADER_NUM, RequestHeadDecoder, ResponseHeadDecoder};
pub use header_encoder::{RequestHeadEncoder, ResponseHeadEncoder};
