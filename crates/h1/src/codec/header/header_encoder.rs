//! Request and response head encoders.
//!
//! Both encoders write the start line and every header, replacing the framing headers
//! with the ones matching the [`Framing`] the body is going to be written with.

use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::{HeaderMap, HeaderValue, StatusCode, Version, header};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::{Framing, RequestHeader, ResponseHead, SendError};

/// Initial buffer size allocated for head serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseHeadEncoder;

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestHeadEncoder;

impl Encoder<(ResponseHead, Framing)> for ResponseHeadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, Framing), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, framing) = item;

        dst.reserve(INIT_HEADER_SIZE);
        let version = version_str(head.version())?;
        let status = head.status();
        write!((&mut *dst).writer(), "{version} {} {}\r\n", status.as_str(), status.canonical_reason().unwrap_or(""))?;

        // informational and 204 responses must not announce a length
        let zero_length = !(status.is_informational() || status == StatusCode::NO_CONTENT);
        set_framing_headers(head.headers_mut(), framing, zero_length);

        write_headers(head.headers(), dst);
        Ok(())
    }
}

impl Encoder<(RequestHeader, Framing)> for RequestHeadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (RequestHeader, Framing), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (header, framing) = item;
        let mut request = header.into_inner();

        dst.reserve(INIT_HEADER_SIZE);
        let version = version_str(request.version())?;
        let target = request.uri().path_and_query().map_or("/", |path| path.as_str());
        write!((&mut *dst).writer(), "{} {target} {version}\r\n", request.method())?;

        if !request.headers().contains_key(header::HOST) {
            if let Some(authority) = request.uri().authority() {
                let host = HeaderValue::from_str(authority.as_str()).map_err(SendError::invalid_body)?;
                request.headers_mut().insert(header::HOST, host);
            }
        }

        set_framing_headers(request.headers_mut(), framing, false);

        write_headers(request.headers(), dst);
        Ok(())
    }
}

fn version_str(version: Version) -> Result<&'static str, SendError> {
    match version {
        Version::HTTP_11 => Ok("HTTP/1.1"),
        Version::HTTP_10 => Ok("HTTP/1.0"),
        v => {
            error!(http_version = ?v, "unsupported http version");
            Err(SendError::invalid_body(format!("unsupported http version {v:?}")))
        }
    }
}

/// Rewrites Content-Length and Transfer-Encoding so they agree with `framing`.
///
/// `zero_length` decides whether a body-less message announces `Content-Length: 0`.
fn set_framing_headers(headers: &mut HeaderMap, framing: Framing, zero_length: bool) {
    match framing {
        Framing::Length(n) => {
            headers.remove(header::TRANSFER_ENCODING);
            headers.insert(header::CONTENT_LENGTH, n.into());
        }
        Framing::Chunked | Framing::UntilClose => {
            headers.remove(header::CONTENT_LENGTH);
            headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        }
        Framing::NoBody => {
            headers.remove(header::TRANSFER_ENCODING);
            if zero_length {
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
            } else {
                headers.remove(header::CONTENT_LENGTH);
            }
        }
    }
}

fn write_headers(headers: &HeaderMap, dst: &mut BytesMut) {
    for (header_name, header_value) in headers {
        dst.put_slice(header_name.as_ref());
        dst.put_slice(b": ");
        dst.put_slice(header_value.as_ref());
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use http::{Method, Request, Response};

    use super::*;

    #[test]
    fn response_with_length() {
        let head = Response::builder().status(StatusCode::OK).header("Server", "micro-h1").body(()).unwrap();
        let mut dst = BytesMut::new();

        ResponseHeadEncoder.encode((head, Framing::Length(5)), &mut dst).unwrap();

        assert_eq!(&dst[..], b"HTTP/1.1 200 OK\r\nserver: micro-h1\r\ncontent-length: 5\r\n\r\n");
    }

    #[test]
    fn empty_response_announces_zero_length() {
        let head = Response::builder().status(StatusCode::NOT_FOUND).body(()).unwrap();
        let mut dst = BytesMut::new();

        ResponseHeadEncoder.encode((head, Framing::NoBody), &mut dst).unwrap();

        assert_eq!(&dst[..], b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\n\r\n");
    }

    #[test]
    fn continue_response() {
        let head = Response::builder().status(StatusCode::CONTINUE).body(()).unwrap();
        let mut dst = BytesMut::new();

        ResponseHeadEncoder.encode((head, Framing::NoBody), &mut dst).unwrap();

        assert_eq!(&dst[..], b"HTTP/1.1 100 Continue\r\n\r\n");
    }

    #[test]
    fn chunked_request_drops_content_length() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("http://example.com:8080/upload?x=1")
            .header("Content-Length", "10")
            .body(())
            .unwrap();
        let mut dst = BytesMut::new();

        RequestHeadEncoder.encode((RequestHeader::from(request), Framing::Chunked), &mut dst).unwrap();

        assert_eq!(
            &dst[..],
            b"POST /upload?x=1 HTTP/1.1\r\nhost: example.com:8080\r\ntransfer-encoding: chunked\r\n\r\n"
        );
    }

    #[test]
    fn get_without_body_has_no_length() {
        let request = Request::builder().uri("/").header("Host", "localhost").body(()).unwrap();
        let mut dst = BytesMut::new();

        RequestHeadEncoder.encode((RequestHeader::from(request), Framing::NoBody), &mut dst).unwrap();

        assert_eq!(&dst[..], b"GET / HTTP/1.1\r\nhost: localhost\r\n\r\n");
    }
}
