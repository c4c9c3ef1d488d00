//! Decoder for bodies that run until the peer closes the connection.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::protocol::{ParseError, PayloadItem};

/// Passes every byte through; the end of the source is the end of the body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UntilCloseDecoder {
    finished: bool,
}

impl UntilCloseDecoder {
    pub fn new() -> Self {
        Self { finished: false }
    }
}

impl Decoder for UntilCloseDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.finished {
            return Ok(Some(PayloadItem::Eof));
        }

        if src.is_empty() {
            return Ok(None);
        }

        Ok(Some(PayloadItem::Chunk(src.split().freeze())))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }

        self.finished = true;
        Ok(Some(PayloadItem::Eof))
    }
}
