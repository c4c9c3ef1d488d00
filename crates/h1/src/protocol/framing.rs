//! Message body framing resolution.
//!
//! Decides how many body bytes follow a header block, following
//! [RFC 9112 Section 6.3](https://www.rfc-editor.org/rfc/rfc9112.html#name-message-body-length).
//! Exactly one [`Framing`] applies to every message.

use http::{HeaderMap, header};
use tracing::debug;

use crate::ensure;
use crate::protocol::ParseError;

const CHUNKED: &str = "chunked";
const IDENTITY: &str = "identity";

/// How the body of a message is delimited on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Framing {
    /// The message carries no body at all
    NoBody,
    /// Exactly this many bytes follow the head
    Length(u64),
    /// The body uses chunked transfer encoding
    Chunked,
    /// The body runs until the peer closes the connection
    UntilClose,
}

impl Framing {
    /// Resolves the framing of a message from its framing headers.
    ///
    /// * `allows_body` - false when the method or status forbids a body, headers are then ignored
    /// * `content_length` - the declared content-length, if any
    /// * `chunked` - whether `chunked` is the final transfer coding
    /// * `allow_unknown_length` - permits reading until close and lets chunked override a
    ///   declared content-length
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::ConflictingFraming`] when both chunked and content-length are
    /// present and the caller has not opted in to permissive framing.
    pub fn resolve(
        allows_body: bool,
        content_length: Option<u64>,
        chunked: bool,
        allow_unknown_length: bool,
    ) -> Result<Self, ParseError> {
        if !allows_body {
            return Ok(Framing::NoBody);
        }

        match (chunked, content_length) {
            (true, None) => Ok(Framing::Chunked),
            (true, Some(length)) => {
                ensure!(
                    allow_unknown_length,
                    ParseError::conflicting_framing(format!(
                        "transfer-encoding chunked and content-length {length} both present"
                    ))
                );
                debug!(content_length = length, "chunked framing takes precedence over content-length");
                Ok(Framing::Chunked)
            }
            (false, Some(length)) => Ok(Framing::Length(length)),
            (false, None) if allow_unknown_length => Ok(Framing::UntilClose),
            (false, None) => Ok(Framing::NoBody),
        }
    }

    /// Returns true unless the message carries no body.
    ///
    /// A zero content-length still counts as a body that happens to be empty.
    #[inline]
    pub fn has_body(&self) -> bool {
        !matches!(self, Framing::NoBody)
    }

    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, Framing::Chunked)
    }

    #[inline]
    pub fn is_until_close(&self) -> bool {
        matches!(self, Framing::UntilClose)
    }
}

/// Everything the body pipeline needs to know about a message, taken from its head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyInfo {
    framing: Framing,
    content_length: Option<u64>,
    encoding: Option<String>,
}

impl BodyInfo {
    pub fn new(framing: Framing, content_length: Option<u64>, encoding: Option<String>) -> Self {
        Self { framing, content_length, encoding: encoding.map(|e| e.to_ascii_lowercase()) }
    }

    /// A message without body.
    pub fn empty() -> Self {
        Self::new(Framing::NoBody, None, None)
    }

    /// Builds the body description from the framing related headers of a message.
    ///
    /// A `Transfer-Encoding` whose last coding is not chunked leaves the length unknown:
    /// the body runs until close when `allow_unknown_length` is set and is a
    /// [`ParseError::ConflictingFraming`] otherwise.
    pub fn from_headers(
        headers: &HeaderMap,
        allows_body: bool,
        allow_unknown_length: bool,
    ) -> Result<Self, ParseError> {
        let content_length = content_length(headers)?;
        let codings = transfer_codings(headers);
        let chunked = is_chunked(&codings);

        let framing = if allows_body && !codings.is_empty() && !chunked {
            // a transfer coding without final chunked leaves the length unknown
            ensure!(
                allow_unknown_length,
                ParseError::conflicting_framing(format!(
                    "transfer-encoding `{}` does not end with chunked",
                    codings.join(", ")
                ))
            );
            Framing::UntilClose
        } else {
            Framing::resolve(allows_body, content_length, chunked, allow_unknown_length)?
        };
        let encoding = declared_encoding(headers, &codings);

        debug!(?framing, ?content_length, ?encoding, "resolved body framing");
        Ok(Self { framing, content_length, encoding })
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// The declared content-length, reported even when chunked framing took precedence.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// The declared content coding, lower-cased.
    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }
}

/// Reads the content-length of a message.
///
/// Repeated fields or comma separated lists are accepted as long as every value agrees.
pub fn content_length(headers: &HeaderMap) -> Result<Option<u64>, ParseError> {
    let mut length = None;

    for value in headers.get_all(header::CONTENT_LENGTH) {
        let cl_str = value.to_str().map_err(ParseError::invalid_content_length)?;

        for part in cl_str.split(',') {
            let parsed = part
                .trim()
                .parse::<u64>()
                .map_err(|e| ParseError::invalid_content_length(format!("value {cl_str} is not u64: {e}")))?;

            match length {
                Some(previous) if previous != parsed => {
                    return Err(ParseError::invalid_content_length(format!(
                        "conflicting values {previous} and {parsed}"
                    )));
                }
                _ => length = Some(parsed),
            }
        }
    }

    Ok(length)
}

/// Returns every transfer coding of a message in order, lower-cased.
pub fn transfer_codings(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::TRANSFER_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|coding| coding.trim().to_ascii_lowercase())
        .filter(|coding| !coding.is_empty())
        .collect()
}

/// Checks whether the transfer codings end with chunked.
///
/// According to RFC 9112, chunked must be the last encoding if present.
pub fn is_chunked(codings: &[String]) -> bool {
    codings.last().is_some_and(|coding| coding == CHUNKED)
}

/// Returns the content coding applied to the body, if any.
///
/// `Content-Encoding` wins; a compression coding listed in `Transfer-Encoding` ahead of
/// `chunked` (`gzip, chunked`) is used when no content encoding is declared. When several
/// codings are stacked only the outermost one is reported.
pub fn declared_encoding(headers: &HeaderMap, transfer_codings: &[String]) -> Option<String> {
    let content_encoding = headers
        .get_all(header::CONTENT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|coding| coding.trim().to_ascii_lowercase())
        .filter(|coding| !coding.is_empty() && coding != IDENTITY)
        .last();

    content_encoding.or_else(|| {
        transfer_codings.iter().rfind(|coding| coding.as_str() != CHUNKED && coding.as_str() != IDENTITY).cloned()
    })
}

/// Whether the `Connection` header lists the given token, compared case-insensitively.
pub fn connection_has_token(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|item| item.trim().eq_ignore_ascii_case(token))
}
