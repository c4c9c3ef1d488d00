//! Framing decoder for message payloads.
//!
//! Picks the decoding strategy from the resolved [`Framing`] of a message:
//! content-length, chunked, until-close or no body at all.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::codec::body::until_close_decoder::UntilCloseDecoder;
use crate::protocol::{Framing, ParseError, PayloadItem};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthDecoder),
    Chunked(ChunkedDecoder),
    UntilClose(UntilCloseDecoder),
    NoBody,
}

impl PayloadDecoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(size)) }
    }

    pub fn until_close() -> Self {
        Self { kind: Kind::UntilClose(UntilCloseDecoder::new()) }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::NoBody)
    }

    /// Whether the end of this body can only be learnt from the peer closing the connection.
    pub fn is_until_close(&self) -> bool {
        matches!(self.kind, Kind::UntilClose(_))
    }
}

impl From<Framing> for PayloadDecoder {
    fn from(framing: Framing) -> Self {
        match framing {
            Framing::NoBody => PayloadDecoder::empty(),
            Framing::Length(length) => PayloadDecoder::fix_length(length),
            Framing::Chunked => PayloadDecoder::chunked(),
            Framing::UntilClose => PayloadDecoder::until_close(),
        }
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(length_decoder) => length_decoder.decode(src),
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode(src),
            Kind::UntilClose(until_close_decoder) => until_close_decoder.decode(src),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(length_decoder) => length_decoder.decode_eof(src),
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode_eof(src),
            Kind::UntilClose(until_close_decoder) => until_close_decoder.decode_eof(src),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }
}
