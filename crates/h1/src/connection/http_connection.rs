use std::error::Error;
use std::io::{Read, Write};

use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::{Method, Response, StatusCode};
use tracing::{debug, error, info, warn};

use crate::body::{BodyConfig, BodyStream, MessageReader, PayloadSource};
use crate::codec::{RequestHeadDecoder, ResponseEncoder};
use crate::connection::message_writer::MessageWriter;
use crate::handler::{Handler, Reply};
use crate::protocol::{BodyError, CloseAction, ConnectionContext, Framing, HttpError, RequestHeader, content_length};

const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Server side of one HTTP/1.x connection.
///
/// `HttpConnection` reads requests one after the other, hands each to a [`Handler`]
/// together with a streaming body, skips whatever the handler left unread and writes the
/// reply. It runs on the calling thread and returns once the connection is done with.
///
/// # Type Parameters
///
/// * `R`: the readable half of the connection
/// * `W`: the writable half of the connection
pub struct HttpConnection<R, W> {
    reader: MessageReader<R>,
    writer: MessageWriter<W, ResponseEncoder>,
    context: ConnectionContext,
    config: BodyConfig,
}

impl<R, W> HttpConnection<R, W>
where
    R: Read,
    W: Write,
{
    pub fn new(reader: R, writer: W, context: ConnectionContext, config: BodyConfig) -> Self {
        Self {
            reader: MessageReader::with_read_size(reader, config.read_buffer_size()),
            writer: MessageWriter::with_capacity(writer, ResponseEncoder::default(), 8 * 1024),
            context,
            config,
        }
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    /// Serves requests until the connection should end.
    ///
    /// Returns how the caller should end the connection: [`CloseAction::Close`] when the
    /// peer went away or keep-alive is over, or whatever close action a reply asked for.
    /// Errors mean the connection is unusable and should be closed as well.
    pub fn process<H: Handler>(&mut self, handler: &H) -> Result<CloseAction, HttpError> {
        loop {
            let header = match self.reader.read_head(&mut RequestHeadDecoder) {
                Ok(Some(header)) => header,
                Ok(None) => {
                    info!("peer closed the connection");
                    return Ok(CloseAction::Close);
                }
                Err(e) => {
                    error!(cause = %e, "can't receive next request");
                    if !e.is_transport() {
                        self.send_error(StatusCode::BAD_REQUEST)?;
                    }
                    return Err(e.into());
                }
            };

            let action = self.do_process(header, handler)?;
            if !action.is_none() {
                return Ok(action);
            }
        }
    }

    fn do_process<H: Handler>(&mut self, header: RequestHeader, handler: &H) -> Result<CloseAction, HttpError> {
        let info = match header.body_info(self.config.allow_unknown_length()) {
            Ok(info) => info,
            Err(e) => {
                warn!(cause = %e, "unable to frame request body");
                self.send_error(StatusCode::BAD_REQUEST)?;
                return Err(e.into());
            }
        };
        debug!(method = %header.method(), uri = %header.uri(), framing = ?info.framing(), "received request");

        if header.expects_continue() && info.framing().has_body() {
            self.writer.write_raw(CONTINUE);
            self.writer.flush()?;
            info!("receive expect request header, sent continue response");
        }

        let keep_alive = header.is_keep_alive();
        let is_head = *header.method() == Method::HEAD;

        let result = {
            let body = BodyStream::new(&mut self.reader, info, &self.config);
            handler.call(&self.context, header.body(body))
        };

        let mut reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                let cause: Box<dyn Error + Send + Sync> = e.into();
                error!(%cause, "handler failed");
                error_reply(StatusCode::INTERNAL_SERVER_ERROR)
            }
        };

        // skip body if the handler didn't read it
        let drained = self.reader.skip_payload();
        let reusable = drained.is_ok() && self.reader.is_reusable();

        let mut action = reply.action();
        if action.is_none() && !(keep_alive && reusable) {
            action = CloseAction::Close;
        }
        if !action.is_none() {
            reply.response_mut().headers_mut().insert(header::CONNECTION, HeaderValue::from_static("close"));
        }
        if is_head {
            self.send_head_reply(reply)?;
        } else {
            self.send_reply(reply)?;
        }

        if let Err(e) = drained {
            warn!(cause = %e, "failed to skip request body");
            return Err(BodyError::from(e).into());
        }
        if self.reader.is_broken() {
            return Err(BodyError::Failed.into());
        }
        Ok(action)
    }

    fn send_reply(&mut self, reply: Reply) -> Result<(), HttpError> {
        let (response, _) = reply.into_parts();
        let (parts, body) = response.into_parts();

        self.writer.write_message(Response::from_parts(parts, ()), body, Framing::NoBody)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Writes the head of a reply to a HEAD request, announcing the length the body would
    /// have had.
    fn send_head_reply(&mut self, reply: Reply) -> Result<(), HttpError> {
        let (response, _) = reply.into_parts();
        let (parts, body) = response.into_parts();

        let declared = content_length(&parts.headers).ok().flatten();
        let framing = match declared {
            Some(length) => Framing::Length(length),
            None if !body.is_empty() => Framing::Length(body.len() as u64),
            None => Framing::NoBody,
        };

        self.writer.write_head_only(Response::from_parts(parts, ()), framing)?;
        self.writer.flush()?;
        Ok(())
    }

    fn send_error(&mut self, status: StatusCode) -> Result<(), HttpError> {
        let mut reply = error_reply(status);
        reply.response_mut().headers_mut().insert(header::CONNECTION, HeaderValue::from_static("close"));
        self.send_reply(reply)
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader.into_inner(), self.writer.into_inner())
    }
}

fn error_reply(status: StatusCode) -> Reply {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status;
    Reply::new(response)
}
