use std::io::{Read, Write};

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use tracing::{debug, trace};

use crate::body::{BodyConfig, BodyStream, MessageReader};
use crate::codec::{RequestEncoder, ResponseHeadDecoder};
use crate::connection::message_writer::MessageWriter;
use crate::protocol::{Framing, HttpError, ParseError, RequestHeader, request_allows_body, response_body_info};

/// Client side of one HTTP/1.x connection.
///
/// Requests are sent one at a time; the body of a response borrows the connection, so it
/// has to be dropped before the next request. Whatever was left unread of it is skipped
/// then.
pub struct ClientConnection<R, W> {
    reader: MessageReader<R>,
    writer: MessageWriter<W, RequestEncoder>,
    config: BodyConfig,
}

impl<R, W> ClientConnection<R, W>
where
    R: Read,
    W: Write,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_config(reader, writer, BodyConfig::client())
    }

    pub fn with_config(reader: R, writer: W, config: BodyConfig) -> Self {
        Self {
            reader: MessageReader::with_read_size(reader, config.read_buffer_size()),
            writer: MessageWriter::with_capacity(writer, RequestEncoder::default(), 8 * 1024),
            config,
        }
    }

    /// Sends `request` and reads the head of its response.
    ///
    /// A body is announced with `Content-Length`; an empty body of a method that carries
    /// none is sent without any framing header. Interim `1xx` responses are skipped.
    pub fn send(&mut self, request: Request<Bytes>) -> Result<Response<BodyStream<'_>>, HttpError> {
        let (parts, body) = request.into_parts();
        let method = parts.method.clone();
        let empty_framing = if request_allows_body(&method) { Framing::Length(0) } else { Framing::NoBody };

        debug!(%method, uri = %parts.uri, body = body.len(), "sending request");
        self.writer.write_message(RequestHeader::from(parts), body, empty_framing)?;
        self.writer.flush()?;

        read_response(&mut self.reader, &method, &self.config)
    }

    /// Whether another request can be sent on this connection.
    pub fn is_reusable(&self) -> bool {
        self.reader.is_reusable()
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader.into_inner(), self.writer.into_inner())
    }
}

/// Reads the next response from `reader`, the answer to a request with `method`.
///
/// Interim `1xx` responses other than `101 Switching Protocols` are skipped. The body is
/// framed the way `config` allows, clients usually accept bodies running until close.
pub fn read_response<'r, R: Read>(
    reader: &'r mut MessageReader<R>,
    method: &Method,
    config: &BodyConfig,
) -> Result<Response<BodyStream<'r>>, HttpError> {
    let head = loop {
        let head = reader
            .read_head(&mut ResponseHeadDecoder)?
            .ok_or_else(|| ParseError::unexpected_eof("connection closed before a response arrived"))?;

        if head.status().is_informational() && head.status() != StatusCode::SWITCHING_PROTOCOLS {
            trace!(status = %head.status(), "skipped interim response");
            continue;
        }
        break head;
    };

    let info = response_body_info(&head, method, config.allow_unknown_length())?;
    debug!(status = %head.status(), framing = ?info.framing(), "received response");

    let (parts, ()) = head.into_parts();
    Ok(Response::from_parts(parts, BodyStream::new(reader, info, config)))
}
