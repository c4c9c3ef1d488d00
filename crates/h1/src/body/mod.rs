//! Blocking body pipeline.
//!
//! A body travels through a fixed chain of readers:
//!
//! 1. [`MessageReader`] owns the connection's read buffer and hands out framed payload
//!    bytes through [`PayloadSource`]
//! 2. [`FramedReader`] removes the transfer framing of one message
//! 3. [`Peekable`] lets the [`CompressionResolver`] sniff magic bytes without losing them
//! 4. [`ContentDecoder`] removes the content coding
//!
//! [`BodyStream`] ties the chain together and is what handlers and clients see.
//! [`MultipartParser`] splits a decoded body into its parts.

mod body_stream;
pub mod compression;
mod config;
mod multipart;
mod peek;
mod source;

pub use body_stream::BodyStream;
pub use compression::{
    BodyDecoder, BrotliDecoderFactory, Compression, CompressionResolver, ContentDecoder, DecoderFactory,
    DecoderRegistry, ZstdDecoderFactory,
};
pub use config::{BodyConfig, DEFAULT_READ_BUFFER_SIZE};
pub use multipart::{BodyPart, MultipartParser, boundary_from_content_type};
pub use peek::Peekable;
pub use source::{FramedReader, MessageReader, PayloadSource};
