//! Splitting of boundary delimited `multipart/*` bodies.
//!
//! The parser is forward only: every call to [`MultipartParser::next_part`] reads one
//! more part from the underlying reader, and a part once returned cannot be read again.

use std::io::{self, Read};

use bytes::{Buf, Bytes, BytesMut};
use http::header::{self, HeaderName};
use http::{HeaderMap, HeaderValue};
use tracing::{debug, trace};

use crate::codec::header::{MAX_HEADER_BYTES, MAX_HEADER_NUM};
use crate::ensure;
use crate::protocol::{BodyError, MultipartError};

const MAX_BOUNDARY_LEN: usize = 70;
const READ_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    Headers,
    Done,
}

/// Reads the parts of a multipart body one at a time.
#[derive(Debug)]
pub struct MultipartParser<R> {
    reader: R,
    /// `\r\n--boundary`
    delimiter: Vec<u8>,
    buf: BytesMut,
    state: State,
    reader_eof: bool,
}

impl<R: Read> MultipartParser<R> {
    /// Creates a parser for parts separated by `boundary`.
    ///
    /// The boundary must be 1 to 70 characters long and must not contain line breaks.
    pub fn new(reader: R, boundary: &str) -> Result<Self, MultipartError> {
        ensure!(!boundary.is_empty(), MultipartError::invalid_boundary("boundary is empty"));
        ensure!(
            boundary.len() <= MAX_BOUNDARY_LEN,
            MultipartError::invalid_boundary(format!("boundary is {} bytes long", boundary.len()))
        );
        ensure!(
            !boundary.bytes().any(|b| b == b'\r' || b == b'\n'),
            MultipartError::invalid_boundary("boundary contains a line break")
        );

        let mut delimiter = Vec::with_capacity(boundary.len() + 4);
        delimiter.extend_from_slice(b"\r\n--");
        delimiter.extend_from_slice(boundary.as_bytes());

        // a body may start with the delimiter line right away, seeding a line break lets
        // the first delimiter be searched like every other one
        let mut buf = BytesMut::with_capacity(READ_SIZE);
        buf.extend_from_slice(b"\r\n");

        Ok(Self { reader, delimiter, buf, state: State::Preamble, reader_eof: false })
    }

    /// Returns the next part, `None` after the closing delimiter.
    pub fn next_part(&mut self) -> Result<Option<BodyPart>, MultipartError> {
        if self.state == State::Preamble {
            let skipped = self.find_delimiter()?;
            self.buf.advance(skipped + self.delimiter.len());
            if skipped > 2 {
                debug!(preamble = skipped - 2, "skipped multipart preamble");
            }
            self.after_delimiter()?;
        }

        if self.state == State::Done {
            return Ok(None);
        }

        let headers = self.read_headers()?;
        let end = self.find_delimiter()?;
        let body = self.buf.split_to(end).freeze();
        self.buf.advance(self.delimiter.len());
        trace!(len = body.len(), "read multipart part");

        self.after_delimiter()?;
        Ok(Some(BodyPart { headers, body }))
    }

    /// Gives back the underlying reader; anything after the closing delimiter that was
    /// already buffered is lost.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Offset of the next delimiter in the buffer, reading more input until one shows up.
    fn find_delimiter(&mut self) -> Result<usize, MultipartError> {
        let mut from = 0;
        loop {
            if let Some(pos) = find(&self.buf[from..], &self.delimiter) {
                return Ok(from + pos);
            }
            from = self.buf.len().saturating_sub(self.delimiter.len() - 1);

            if self.fill()? == 0 {
                return Err(MultipartError::MissingBoundary);
            }
        }
    }

    /// Consumes what follows a delimiter: `--` closes the body, otherwise optional
    /// whitespace and a line break lead to the next part's headers.
    fn after_delimiter(&mut self) -> Result<(), MultipartError> {
        loop {
            if self.buf.starts_with(b"--") {
                self.state = State::Done;
                return Ok(());
            }

            let padding = self.buf.iter().take_while(|b| **b == b' ' || **b == b'\t').count();
            let rest = &self.buf[padding..];
            if rest.starts_with(b"\r\n") {
                self.buf.advance(padding + 2);
                self.state = State::Headers;
                return Ok(());
            }

            let need_more = rest.is_empty() || rest == b"\r" || self.buf[..] == *b"-";
            ensure!(need_more, MultipartError::invalid_header("unexpected bytes after boundary delimiter"));

            if self.fill()? == 0 {
                return Err(MultipartError::MissingBoundary);
            }
        }
    }

    fn read_headers(&mut self) -> Result<HeaderMap, MultipartError> {
        loop {
            let mut raw = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
            match httparse::parse_headers(&self.buf, &mut raw) {
                Ok(httparse::Status::Complete((len, parsed))) => {
                    let headers = to_header_map(parsed)?;
                    self.buf.advance(len);
                    return Ok(headers);
                }
                Ok(httparse::Status::Partial) => {
                    ensure!(
                        self.buf.len() <= MAX_HEADER_BYTES,
                        MultipartError::invalid_header(format!("part headers exceed {MAX_HEADER_BYTES} bytes"))
                    );
                }
                Err(e) => return Err(MultipartError::invalid_header(e)),
            }

            if self.fill()? == 0 {
                return Err(MultipartError::MissingBoundary);
            }
        }
    }

    fn fill(&mut self) -> Result<usize, MultipartError> {
        if self.reader_eof {
            return Ok(0);
        }

        let start = self.buf.len();
        self.buf.resize(start + READ_SIZE, 0);
        let result = loop {
            match self.reader.read(&mut self.buf[start..]) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                other => break other,
            }
        };

        match result {
            Ok(n) => {
                self.buf.truncate(start + n);
                self.reader_eof = n == 0;
                Ok(n)
            }
            Err(e) => {
                self.buf.truncate(start);
                Err(BodyError::from(e).into())
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn to_header_map(parsed: &[httparse::Header<'_>]) -> Result<HeaderMap, MultipartError> {
    let mut headers = HeaderMap::with_capacity(parsed.len());
    for header in parsed {
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(MultipartError::invalid_header)?;
        let value = HeaderValue::from_bytes(header.value).map_err(MultipartError::invalid_header)?;
        headers.append(name, value);
    }
    Ok(headers)
}

/// One part of a multipart body.
#[derive(Debug, Clone)]
pub struct BodyPart {
    headers: HeaderMap,
    body: Bytes,
}

impl BodyPart {
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The first value of header `name` that is valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn body_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.body)
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// The `name` parameter of the part's Content-Disposition.
    pub fn name(&self) -> Option<&str> {
        self.disposition_param("name")
    }

    /// The `filename` parameter of the part's Content-Disposition.
    pub fn filename(&self) -> Option<&str> {
        self.disposition_param("filename")
    }

    fn disposition_param(&self, key: &str) -> Option<&str> {
        let disposition = self.headers.get(header::CONTENT_DISPOSITION)?.to_str().ok()?;
        disposition.split(';').skip(1).find_map(|param| {
            let (name, value) = param.split_once('=')?;
            if !name.trim().eq_ignore_ascii_case(key) {
                return None;
            }
            let value = value.trim();
            Some(value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value))
        })
    }
}

/// Boundary parameter of a `multipart/*` Content-Type header.
pub fn boundary_from_content_type(headers: &HeaderMap) -> Option<String> {
    let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let parsed = content_type.parse::<mime::Mime>().ok()?;
    if parsed.type_() != mime::MULTIPART {
        return None;
    }
    parsed.get_param(mime::BOUNDARY).map(|boundary| boundary.as_str().to_owned())
}
