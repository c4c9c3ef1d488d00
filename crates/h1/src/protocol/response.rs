//! HTTP response head handling.
//!
//! Responses are plain `http::Response<()>` values; the functions here answer the
//! framing questions that depend on the status and on the request being answered.

use http::{Method, Response, StatusCode, Version};

use crate::protocol::framing::{BodyInfo, connection_has_token};
use crate::protocol::ParseError;

/// Type alias for HTTP response headers before a body is attached.
pub type ResponseHead = Response<()>;

/// Whether a response with this status, answering a request with this method, may carry a body.
///
/// Informational, `204 No Content` and `304 Not Modified` responses never do, and
/// neither does any answer to HEAD.
pub fn response_allows_body(status: StatusCode, request_method: &Method) -> bool {
    if *request_method == Method::HEAD {
        return false;
    }
    !(status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED)
}

/// Describes the body following a response head.
pub fn response_body_info(
    head: &ResponseHead,
    request_method: &Method,
    allow_unknown_length: bool,
) -> Result<BodyInfo, ParseError> {
    BodyInfo::from_headers(head.headers(), response_allows_body(head.status(), request_method), allow_unknown_length)
}

/// Whether the server intends to keep the connection open after this response.
pub fn response_is_keep_alive(head: &ResponseHead) -> bool {
    match head.version() {
        Version::HTTP_11 => !connection_has_token(head.headers(), "close"),
        Version::HTTP_10 => connection_has_token(head.headers(), "keep-alive"),
        _ => false,
    }
}
