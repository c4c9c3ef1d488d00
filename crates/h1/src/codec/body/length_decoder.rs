//! Decoder for bodies delimited by `Content-Length`.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::protocol::{ParseError, PayloadItem};

/// Yields exactly `length` bytes and then [`PayloadItem::Eof`].
///
/// Bytes past the declared length are left untouched in the source buffer,
/// they belong to the next message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    /// bytes still to be read
    length: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { length }
    }

    pub fn remaining(&self) -> u64 {
        self.length
    }
}

impl Decoder for LengthDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.length == 0 {
            return Ok(Some(PayloadItem::Eof));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let len = usize::try_from(self.length).map_or(src.len(), |length| length.min(src.len()));
        let bytes = src.split_to(len).freeze();

        self.length -= bytes.len() as u64;
        Ok(Some(PayloadItem::Chunk(bytes)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => Err(ParseError::unexpected_eof(format!(
                "connection closed with {} body bytes outstanding",
                self.length
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic() {
        let mut buffer = BytesMut::from(&b"101234567890abcdef\r\n\r\n"[..]);

        let mut length_decoder = LengthDecoder::new(10);
        let payload = length_decoder.decode(&mut buffer).unwrap().unwrap();

        assert_eq!(&payload.as_bytes().unwrap()[..], b"1012345678");
        assert_eq!(&buffer[..], b"90abcdef\r\n\r\n");
        assert!(length_decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert_eq!(&buffer[..], b"90abcdef\r\n\r\n");
    }

    #[test]
    fn test_zero_length() {
        let mut buffer = BytesMut::from(&b"next"[..]);
        let mut length_decoder = LengthDecoder::new(0);

        assert!(length_decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert_eq!(&buffer[..], b"next");
    }

    #[test]
    fn test_premature_eof() {
        let mut buffer = BytesMut::from(&b"abc"[..]);
        let mut length_decoder = LengthDecoder::new(5);

        assert!(length_decoder.decode_eof(&mut buffer).unwrap().unwrap().is_chunk());
        assert_eq!(length_decoder.remaining(), 2);

        let error = length_decoder.decode_eof(&mut buffer).unwrap_err();
        assert!(error.is_transport());
    }
}
