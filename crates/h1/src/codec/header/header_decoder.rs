//! Request and response head decoders.
//!
//! Both decoders parse with `httparse`, record where every header name and value lives
//! inside the buffer and then split the head off in one piece, so header values share
//! the head's allocation instead of being copied one by one.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum head size: 8KB
//! - Only HTTP/1.0 and HTTP/1.1

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode};
use httparse::Status;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, RequestHeader, ResponseHead, parse_version};

/// Maximum number of headers allowed in a head
pub const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire head section
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decodes a request line and header block into a [`RequestHeader`].
///
/// Framing is not decided here, the caller resolves it with its own body configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestHeadDecoder;

/// Decodes a status line and header block into a [`ResponseHead`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseHeadDecoder;

impl Decoder for RequestHeadDecoder {
    type Item = RequestHeader;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // shortest request line is "GET / HTTP/1.1\r\n\r\n"
        if src.len() < 14 {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut req = httparse::Request::new(&mut headers);

        let Status::Complete(body_offset) = req.parse(src).map_err(map_httparse_error)? else {
            return partial(src);
        };
        trace!(head_size = body_offset, "parsed request head");
        ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

        let mut builder = Request::builder()
            .method(req.method.ok_or(ParseError::InvalidMethod)?)
            .uri(req.path.ok_or(ParseError::InvalidUri)?)
            .version(parse_version(req.version)?);

        let indices = HeaderIndex::record(src, req.headers);
        let head_bytes = src.split_to(body_offset).freeze();

        if let Some(headers) = builder.headers_mut() {
            *headers = HeaderIndex::build(&head_bytes, &indices)?;
        }

        let request = builder.body(()).map_err(|e| match e {
            e if e.is::<http::method::InvalidMethod>() => ParseError::InvalidMethod,
            e if e.is::<http::uri::InvalidUri>() => ParseError::InvalidUri,
            e => ParseError::invalid_header(e),
        })?;

        Ok(Some(RequestHeader::from(request)))
    }
}

impl Decoder for ResponseHeadDecoder {
    type Item = ResponseHead;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // shortest status line is "HTTP/1.1 200\r\n\r\n"
        if src.len() < 16 {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut res = httparse::Response::new(&mut headers);

        let Status::Complete(body_offset) = res.parse(src).map_err(map_httparse_error)? else {
            return partial(src);
        };
        trace!(head_size = body_offset, "parsed response head");
        ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

        let status = res
            .code
            .and_then(|code| StatusCode::from_u16(code).ok())
            .ok_or(ParseError::InvalidStatus)?;
        let version = parse_version(res.version)?;

        let indices = HeaderIndex::record(src, res.headers);
        let head_bytes = src.split_to(body_offset).freeze();

        let mut response = Response::new(());
        *response.status_mut() = status;
        *response.version_mut() = version;
        *response.headers_mut() = HeaderIndex::build(&head_bytes, &indices)?;

        Ok(Some(response))
    }
}

fn map_httparse_error(e: httparse::Error) -> ParseError {
    match e {
        httparse::Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
        httparse::Error::Version => ParseError::InvalidVersion(None),
        httparse::Error::Status => ParseError::InvalidStatus,
        e => ParseError::invalid_header(e),
    }
}

/// Incomplete head: wait for more bytes unless the limit is already exceeded.
fn partial<T>(src: &BytesMut) -> Result<Option<T>, ParseError> {
    ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
    Ok(None)
}

/// Byte ranges of a header's name and value within the head buffer.
#[derive(Debug, Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

impl HeaderIndex {
    fn record(bytes: &[u8], headers: &[httparse::Header<'_>]) -> Vec<HeaderIndex> {
        let bytes_ptr = bytes.as_ptr() as usize;
        headers
            .iter()
            .map(|header| {
                let name_start = header.name.as_ptr() as usize - bytes_ptr;
                let value_start = header.value.as_ptr() as usize - bytes_ptr;
                HeaderIndex {
                    name: (name_start, name_start + header.name.len()),
                    value: (value_start, value_start + header.value.len()),
                }
            })
            .collect()
    }

    fn build(head_bytes: &Bytes, indices: &[HeaderIndex]) -> Result<HeaderMap, ParseError> {
        let mut headers = HeaderMap::with_capacity(indices.len());
        for index in indices {
            let name =
                HeaderName::from_bytes(&head_bytes[index.name.0..index.name.1]).map_err(ParseError::invalid_header)?;
            let value = HeaderValue::from_maybe_shared(head_bytes.slice(index.value.0..index.value.1))
                .map_err(ParseError::invalid_header)?;
            headers.append(name, value);
        }
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, Version, header};
    use indoc::indoc;

    #[test]
    fn test_bytes_mut_lens() {
        let str = indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        123"##};

        let mut bytes = BytesMut::from(str);
        let result = RequestHeadDecoder.decode(&mut bytes).unwrap();

        assert!(result.is_some());
        assert_eq!(&bytes[..], &b"123"[..]);
    }

    #[test]
    fn from_curl() {
        let str = indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "##};

        let mut buf = BytesMut::from(str);
        let header = RequestHeadDecoder.decode(&mut buf).unwrap().unwrap();

        assert_eq!(header.method(), &Method::GET);
        assert_eq!(header.version(), Version::HTTP_11);
        assert_eq!(header.uri().path(), "/index.html");
        assert_eq!(header.headers().len(), 3);
        assert_eq!(header.headers().get(header::HOST), Some(&HeaderValue::from_static("127.0.0.1:8080")));
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_head_needs_more() {
        let mut buf = BytesMut::from("POST /upload HTTP/1.1\r\nContent-Le");
        assert!(RequestHeadDecoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 33);
    }

    #[test]
    fn oversized_head() {
        let mut buf = BytesMut::from("GET / HTTP/1.1\r\n");
        buf.extend_from_slice(format!("X-Long: {}\r\n", "a".repeat(MAX_HEADER_BYTES)).as_bytes());

        assert!(matches!(RequestHeadDecoder.decode(&mut buf), Err(ParseError::TooLargeHeader { .. })));
    }

    #[test]
    fn http2_preface_is_rejected() {
        let mut buf = BytesMut::from("PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n");
        assert!(RequestHeadDecoder.decode(&mut buf).is_err());
    }

    #[test]
    fn response_head() {
        let str = indoc! {r##"
        HTTP/1.1 404 Not Found
        Content-Length: 5
        Set-Cookie: a=1
        Set-Cookie: b=2

        hello"##};

        let mut buf = BytesMut::from(str);
        let head = ResponseHeadDecoder.decode(&mut buf).unwrap().unwrap();

        assert_eq!(head.status(), StatusCode::NOT_FOUND);
        assert_eq!(head.version(), Version::HTTP_11);
        assert_eq!(head.headers().get_all(header::SET_COOKIE).iter().count(), 2);
        assert_eq!(&buf[..], b"hello");
    }

    #[test]
    fn response_without_reason() {
        let mut buf = BytesMut::from("HTTP/1.0 204\r\n\r\n");
        let head = ResponseHeadDecoder.decode(&mut buf).unwrap().unwrap();

        assert_eq!(head.status(), StatusCode::NO_CONTENT);
        assert_eq!(head.version(), Version::HTTP_10);
    }
}
