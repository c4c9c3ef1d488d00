//! HTTP request head handling.
//!
//! Wraps `http::Request<()>` with the questions the body pipeline asks of a request:
//! may it carry a body, should the connection stay open, does the client wait for
//! `100 Continue`.

use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version, header};

use crate::protocol::framing::BodyInfo;
use crate::protocol::{ParseError, connection_has_token};

/// Represents an HTTP request header.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl AsMut<Request<()>> for RequestHeader {
    fn as_mut(&mut self) -> &mut Request<()> {
        &mut self.inner
    }
}

impl RequestHeader {
    /// Consumes the header and returns the inner `Request<()>`.
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body to this header, converting it into a full `Request<T>`.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|()| body)
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Whether the method of this request may carry a body at all.
    ///
    /// GET, HEAD and CONNECT requests are treated as body-less whatever their headers say.
    pub fn allows_body(&self) -> bool {
        request_allows_body(self.method())
    }

    /// Whether the client asked to keep the connection open after this exchange.
    pub fn is_keep_alive(&self) -> bool {
        let headers = self.headers();
        match self.version() {
            Version::HTTP_11 => !connection_has_token(headers, "close"),
            Version::HTTP_10 => connection_has_token(headers, "keep-alive"),
            _ => false,
        }
    }

    /// Whether the client waits for `100 Continue` before sending the body.
    pub fn expects_continue(&self) -> bool {
        self.version() == Version::HTTP_11
            && self
                .headers()
                .get(header::EXPECT)
                .is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"100-continue"))
    }

    /// Describes the body following this head.
    pub fn body_info(&self, allow_unknown_length: bool) -> Result<BodyInfo, ParseError> {
        BodyInfo::from_headers(self.headers(), self.allows_body(), allow_unknown_length)
    }
}

/// GET, HEAD and CONNECT never carry a request body here.
pub fn request_allows_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::CONNECT)
}

impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}

/// Converts a completely parsed httparse request into a `RequestHeader`.
impl<'headers, 'buf> TryFrom<httparse::Request<'headers, 'buf>> for RequestHeader {
    type Error = ParseError;

    fn try_from(req: httparse::Request<'headers, 'buf>) -> Result<Self, Self::Error> {
        let method = req.method.ok_or(ParseError::InvalidMethod)?;
        let path = req.path.ok_or(ParseError::InvalidUri)?;
        let version = parse_version(req.version)?;

        let mut builder = Request::builder().method(method).uri(path).version(version);
        if let Some(headers) = builder.headers_mut() {
            headers.reserve(req.headers.len());
        }
        for header in req.headers.iter() {
            builder = builder.header(header.name, header.value);
        }

        let inner = builder.body(()).map_err(ParseError::invalid_header)?;
        Ok(RequestHeader { inner })
    }
}

/// Maps the minor version reported by httparse onto `http::Version`.
pub(crate) fn parse_version(minor: Option<u8>) -> Result<Version, ParseError> {
    match minor {
        Some(1) => Ok(Version::HTTP_11),
        Some(0) => Ok(Version::HTTP_10),
        other => Err(ParseError::InvalidVersion(other)),
    }
}
