//! Decoder for chunked transfer encoding.
//!
//! Implements the chunked body format of
//! [RFC 9112 Section 7.1](https://www.rfc-editor.org/rfc/rfc9112.html#name-chunked-transfer-coding):
//! a hex size line with optional extensions, the chunk data, CRLF, repeated until a
//! zero sized chunk, optional trailer fields and a final blank line.

use std::task::Poll;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{ParseError, PayloadItem};
use ChunkedState::{
    Body, BodyCr, BodyLf, End, EndCr, EndLf, Extension, Size, SizeLf, SizeLws, SizeStart, Trailer, TrailerLf,
};

/// Byte level state machine for chunked bodies.
///
/// Every yielded chunk stays inside the current chunk boundary, and
/// [`PayloadItem::Eof`] is only produced after the terminating blank line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: SizeStart, remaining_size: 0 }
    }

    /// Whether the terminating chunk and trailers have been consumed.
    pub fn is_finished(&self) -> bool {
        self.state == End
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// First hex digit of the size, at least one is required
    SizeStart,
    /// Remaining hex digits of the size
    Size,
    /// Whitespace after the size
    SizeLws,
    /// Chunk extension, ignored
    Extension,
    SizeLf,
    Body,
    BodyCr,
    BodyLf,
    Trailer,
    TrailerLf,
    EndCr,
    EndLf,
    End,
}

type StepResult = Poll<Result<ChunkedState, ParseError>>;

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                trace!("finished reading chunked data");
                return Ok(Some(PayloadItem::Eof));
            }

            if src.is_empty() {
                return Ok(None);
            }

            let mut buf = None;

            self.state = match self.state.step(src, &mut self.remaining_size, &mut buf) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(new_state)) => new_state,
                Poll::Ready(Err(e)) => return Err(e),
            };

            if let Some(bytes) = buf {
                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => Err(ParseError::unexpected_eof(format!(
                "connection closed inside chunked body, {} bytes of the current chunk missing",
                self.remaining_size
            ))),
        }
    }
}

macro_rules! try_next_byte {
    ($src:ident) => {{
        if $src.is_empty() {
            return Poll::Pending;
        }
        $src.get_u8()
    }};
}

macro_rules! invalid {
    ($reason:expr) => {
        Poll::Ready(Err(ParseError::invalid_chunk($reason)))
    };
}

impl ChunkedState {
    fn step(&self, src: &mut BytesMut, remaining_size: &mut u64, buf: &mut Option<Bytes>) -> StepResult {
        match self {
            SizeStart => ChunkedState::read_size_start(src, remaining_size),
            Size => ChunkedState::read_size(src, remaining_size),
            SizeLws => ChunkedState::read_size_lws(src),
            Extension => ChunkedState::read_extension(src),
            SizeLf => ChunkedState::read_size_lf(src, *remaining_size),
            Body => ChunkedState::read_body(src, remaining_size, buf),
            BodyCr => ChunkedState::expect(src, b'\r', BodyLf, "missing CR after chunk data"),
            BodyLf => ChunkedState::expect(src, b'\n', SizeStart, "missing LF after chunk data"),
            Trailer => ChunkedState::read_trailer(src),
            TrailerLf => ChunkedState::expect(src, b'\n', EndCr, "missing LF after trailer field"),
            EndCr => ChunkedState::read_end_cr(src),
            EndLf => ChunkedState::expect(src, b'\n', End, "missing LF after last chunk"),
            End => Poll::Ready(Ok(End)),
        }
    }

    fn hex_value(b: u8) -> Option<u64> {
        match b {
            b'0'..=b'9' => Some(u64::from(b - b'0')),
            b'a'..=b'f' => Some(u64::from(b + 10 - b'a')),
            b'A'..=b'F' => Some(u64::from(b + 10 - b'A')),
            _ => None,
        }
    }

    fn push_digit(size: &mut u64, digit: u64) -> Result<(), ParseError> {
        *size = size
            .checked_mul(16)
            .and_then(|size| size.checked_add(digit))
            .ok_or_else(|| ParseError::invalid_chunk("chunk size overflows u64"))?;
        Ok(())
    }

    fn read_size_start(src: &mut BytesMut, size: &mut u64) -> StepResult {
        let b = try_next_byte!(src);
        let Some(digit) = ChunkedState::hex_value(b) else {
            return invalid!(format!("chunk size line starts with {:?}", char::from(b)));
        };

        *size = 0;
        match ChunkedState::push_digit(size, digit) {
            Ok(()) => Poll::Ready(Ok(Size)),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn read_size(src: &mut BytesMut, size: &mut u64) -> StepResult {
        let b = try_next_byte!(src);
        if let Some(digit) = ChunkedState::hex_value(b) {
            return match ChunkedState::push_digit(size, digit) {
                Ok(()) => Poll::Ready(Ok(Size)),
                Err(e) => Poll::Ready(Err(e)),
            };
        }

        match b {
            b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
            b';' => Poll::Ready(Ok(Extension)),
            b'\r' => Poll::Ready(Ok(SizeLf)),
            _ => invalid!(format!("invalid byte {:?} in chunk size", char::from(b))),
        }
    }

    fn read_size_lws(src: &mut BytesMut) -> StepResult {
        // no more digits after whitespace
        match try_next_byte!(src) {
            b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
            b';' => Poll::Ready(Ok(Extension)),
            b'\r' => Poll::Ready(Ok(SizeLf)),
            _ => invalid!("invalid chunk size linear white space"),
        }
    }

    fn read_extension(src: &mut BytesMut) -> StepResult {
        // extensions end at CRLF, a bare LF is rejected
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b'\n' => invalid!("chunk extension contains newline"),
            _ => Poll::Ready(Ok(Extension)),
        }
    }

    fn read_size_lf(src: &mut BytesMut, size: u64) -> StepResult {
        match try_next_byte!(src) {
            b'\n' if size == 0 => Poll::Ready(Ok(EndCr)),
            b'\n' => Poll::Ready(Ok(Body)),
            _ => invalid!("missing LF after chunk size"),
        }
    }

    fn read_body(src: &mut BytesMut, remaining_size: &mut u64, buf: &mut Option<Bytes>) -> StepResult {
        if src.is_empty() {
            return Poll::Pending;
        }

        let read_size = usize::try_from(*remaining_size).map_or(src.len(), |remaining| remaining.min(src.len()));

        *remaining_size -= read_size as u64;
        *buf = Some(src.split_to(read_size).freeze());

        if *remaining_size > 0 { Poll::Ready(Ok(Body)) } else { Poll::Ready(Ok(BodyCr)) }
    }

    fn read_trailer(src: &mut BytesMut) -> StepResult {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(TrailerLf)),
            _ => Poll::Ready(Ok(Trailer)),
        }
    }

    fn read_end_cr(src: &mut BytesMut) -> StepResult {
        // anything but CR starts a trailer field
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(EndLf)),
            _ => Poll::Ready(Ok(Trailer)),
        }
    }

    fn expect(src: &mut BytesMut, expected: u8, next: ChunkedState, reason: &'static str) -> StepResult {
        if try_next_byte!(src) == expected { Poll::Ready(Ok(next)) } else { invalid!(reason) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(decoder: &mut ChunkedDecoder, buffer: &mut BytesMut) -> Bytes {
        decoder.decode(buffer).unwrap().unwrap().into_bytes().unwrap()
    }

    #[test]
    fn test_basic() {
        let mut buffer = BytesMut::from(&b"10\r\n1234567890abcdef\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert_eq!(&chunk(&mut decoder, &mut buffer)[..], b"1234567890abcdef");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_multiple_chunks() {
        let mut buffer = BytesMut::from(&b"5\r\nhello\r\n7\r\n, world\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert_eq!(&chunk(&mut decoder, &mut buffer)[..], b"hello");
        assert_eq!(&chunk(&mut decoder, &mut buffer)[..], b", world");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_chunks_with_extensions() {
        let mut buffer = BytesMut::from(&b"5;chunk-ext=value\r\nhello\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert_eq!(&chunk(&mut decoder, &mut buffer)[..], b"hello");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_chunks_with_trailers() {
        let mut buffer = BytesMut::from(&b"5\r\nhello\r\n0\r\nTrailer: value\r\n\r\nGET /next"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert_eq!(&chunk(&mut decoder, &mut buffer)[..], b"hello");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert_eq!(&buffer[..], b"GET /next");
    }

    #[test]
    fn test_incomplete_chunk() {
        let mut buffer = BytesMut::from(&b"5\r\nhel"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert_eq!(&chunk(&mut decoder, &mut buffer)[..], b"hel");
        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"lo\r\n0\r\n\r\n");

        assert_eq!(&chunk(&mut decoder, &mut buffer)[..], b"lo");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_invalid_chunk_size() {
        let mut buffer = BytesMut::from(&b"zz\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let error = decoder.decode(&mut buffer).unwrap_err();
        assert!(error.is_framing());
    }

    #[test]
    fn test_empty_size_line() {
        let mut buffer = BytesMut::from(&b"\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert!(matches!(decoder.decode(&mut buffer), Err(ParseError::InvalidChunk { .. })));
    }

    #[test]
    fn test_size_overflow() {
        let mut buffer = BytesMut::from(&b"fffffffffffffffff\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert!(matches!(decoder.decode(&mut buffer), Err(ParseError::InvalidChunk { .. })));
    }

    #[test]
    fn test_missing_crlf() {
        let mut buffer = BytesMut::from(&b"5\r\nhelloBad"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert_eq!(&chunk(&mut decoder, &mut buffer)[..], b"hello");
        assert!(decoder.decode(&mut buffer).is_err());
    }

    #[test]
    fn test_eof_inside_chunk() {
        let mut buffer = BytesMut::from(&b"a\r\nhello"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert_eq!(&chunk(&mut decoder, &mut buffer)[..], b"hello");
        let error = decoder.decode_eof(&mut buffer).unwrap_err();
        assert!(error.is_transport());
    }

    #[test]
    fn test_large_chunk() {
        let size = 1024 * 1024;
        let mut data = Vec::with_capacity(size + 16);
        data.extend(format!("{size:x}\r\n").into_bytes());
        data.extend(vec![b'A'; size]);
        data.extend(b"\r\n0\r\n\r\n");

        let mut buffer = BytesMut::from(&data[..]);
        let mut decoder = ChunkedDecoder::new();

        let bytes = chunk(&mut decoder, &mut buffer);
        assert_eq!(bytes.len(), size);
        assert!(bytes.iter().all(|&b| b == b'A'));
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_zero_size_chunk() {
        let mut buffer = BytesMut::from(&b"0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }
}
