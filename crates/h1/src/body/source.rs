//! Buffered raw byte source of a connection and the framed view of one body.
//!
//! [`MessageReader`] owns the read side of a connection: the socket, its read buffer and
//! the framing decoder of the body currently in flight. Because the framing state lives
//! here and not in the body handed to user code, a body that was dropped half read is
//! still skipped before the next head is parsed.

use std::fmt;
use std::io::{self, Read};

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::body::config::DEFAULT_READ_BUFFER_SIZE;
use crate::codec::PayloadDecoder;
use crate::protocol::{BodyError, Framing, ParseError, PayloadItem};

/// Source of the framed payload bytes of one message at a time.
pub trait PayloadSource {
    /// Starts a new payload with the given framing.
    fn begin(&mut self, framing: Framing);

    /// Returns the next piece of payload, `None` once the payload is complete.
    fn next_chunk(&mut self) -> Result<Option<Bytes>, ParseError>;

    /// Discards what is left of the current payload, returning how many bytes were skipped.
    fn skip_payload(&mut self) -> Result<u64, ParseError>;
}

/// Buffered reader producing heads and payloads from a blocking byte stream.
pub struct MessageReader<R> {
    io: R,
    buf: BytesMut,
    read_size: usize,
    payload: Option<PayloadDecoder>,
    broken: bool,
    io_eof: bool,
}

impl<R: Read> MessageReader<R> {
    pub fn new(io: R) -> Self {
        Self::with_read_size(io, DEFAULT_READ_BUFFER_SIZE)
    }

    pub fn with_read_size(io: R, read_size: usize) -> Self {
        Self {
            io,
            buf: BytesMut::with_capacity(read_size),
            read_size: read_size.max(1),
            payload: None,
            broken: false,
            io_eof: false,
        }
    }

    /// Reads the next head with `decoder`.
    ///
    /// Any payload left of the previous message is skipped first. Returns `None` when
    /// the peer closed the connection cleanly between two messages.
    pub fn read_head<D>(&mut self, decoder: &mut D) -> Result<Option<D::Item>, ParseError>
    where
        D: Decoder<Error = ParseError>,
    {
        if self.broken {
            return Err(ParseError::unexpected_eof("connection is broken by an earlier error"));
        }
        if self.payload.is_some() {
            self.skip_payload()?;
        }

        loop {
            match decoder.decode(&mut self.buf) {
                Ok(Some(item)) => return Ok(Some(item)),
                Ok(None) => {}
                Err(e) => {
                    self.broken = true;
                    return Err(e);
                }
            }

            if self.fill()? == 0 {
                if self.buf.is_empty() {
                    trace!("connection closed between messages");
                    return Ok(None);
                }
                self.broken = true;
                return Err(ParseError::unexpected_eof(format!(
                    "connection closed inside message head, {} bytes buffered",
                    self.buf.len()
                )));
            }
        }
    }

    /// Whether another message can be read from this connection.
    pub fn is_reusable(&self) -> bool {
        !self.broken && self.payload.is_none() && !self.io_eof
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Whether a payload is still being read.
    pub fn in_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// Bytes read from the connection but not consumed yet.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    pub fn get_ref(&self) -> &R {
        &self.io
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.io
    }

    pub fn into_inner(self) -> R {
        self.io
    }

    fn fill(&mut self) -> Result<usize, ParseError> {
        if self.io_eof {
            return Ok(0);
        }

        let start = self.buf.len();
        self.buf.resize(start + self.read_size, 0);
        let result = loop {
            match self.io.read(&mut self.buf[start..]) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                other => break other,
            }
        };

        match result {
            Ok(n) => {
                self.buf.truncate(start + n);
                if n == 0 {
                    self.io_eof = true;
                }
                trace!(read = n, buffered = self.buf.len(), "filled read buffer");
                Ok(n)
            }
            Err(e) => {
                self.buf.truncate(start);
                self.broken = true;
                Err(ParseError::io(e))
            }
        }
    }

    fn fail(&mut self, e: ParseError) -> ParseError {
        self.broken = true;
        self.payload = None;
        e
    }
}

impl<R: Read> PayloadSource for MessageReader<R> {
    fn begin(&mut self, framing: Framing) {
        self.payload = framing.has_body().then(|| PayloadDecoder::from(framing));
    }

    fn next_chunk(&mut self) -> Result<Option<Bytes>, ParseError> {
        loop {
            let Some(decoder) = self.payload.as_mut() else {
                return Ok(None);
            };

            let item = if self.io_eof { decoder.decode_eof(&mut self.buf) } else { decoder.decode(&mut self.buf) };

            match item {
                Ok(Some(PayloadItem::Chunk(bytes))) => return Ok(Some(bytes)),
                Ok(Some(PayloadItem::Eof)) => {
                    self.payload = None;
                    return Ok(None);
                }
                Ok(None) => {}
                Err(e) => return Err(self.fail(e)),
            }

            if let Err(e) = self.fill() {
                return Err(self.fail(e));
            }
        }
    }

    fn skip_payload(&mut self) -> Result<u64, ParseError> {
        let mut skipped = 0u64;
        while let Some(bytes) = self.next_chunk()? {
            skipped += bytes.len() as u64;
        }
        if skipped > 0 {
            debug!(skipped, "drained unread payload");
        }
        Ok(skipped)
    }
}

impl<R> fmt::Debug for MessageReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageReader")
            .field("buffered", &self.buf.len())
            .field("payload", &self.payload)
            .field("broken", &self.broken)
            .field("io_eof", &self.io_eof)
            .finish_non_exhaustive()
    }
}

/// The framed payload of one message as a plain [`Read`].
///
/// Framing and transport errors surface as `io::Error` wrapping a [`BodyError`], use
/// `BodyError::from` to get it back.
pub struct FramedReader<'a> {
    source: &'a mut dyn PayloadSource,
    pending: Bytes,
    done: bool,
}

impl<'a> FramedReader<'a> {
    /// Starts reading a payload with `framing` from `source`.
    pub fn new(source: &'a mut dyn PayloadSource, framing: Framing) -> Self {
        source.begin(framing);
        Self { source, pending: Bytes::new(), done: !framing.has_body() }
    }

    /// Returns the next piece of framed payload.
    pub fn next_chunk(&mut self) -> Result<Option<Bytes>, ParseError> {
        if !self.pending.is_empty() {
            return Ok(Some(std::mem::take(&mut self.pending)));
        }
        if self.done {
            return Ok(None);
        }

        match self.source.next_chunk() {
            Ok(Some(bytes)) => Ok(Some(bytes)),
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    /// Discards the rest of the payload.
    pub fn drain(&mut self) -> Result<u64, ParseError> {
        let mut drained = std::mem::take(&mut self.pending).len() as u64;
        if !self.done {
            self.done = true;
            drained += self.source.skip_payload()?;
        }
        Ok(drained)
    }

    pub fn is_done(&self) -> bool {
        self.done && self.pending.is_empty()
    }
}

impl Read for FramedReader<'_> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        while self.pending.is_empty() {
            match self.next_chunk() {
                Ok(Some(bytes)) => self.pending = bytes,
                Ok(None) => return Ok(0),
                Err(e) => return Err(BodyError::from(e).into()),
            }
        }

        let n = out.len().min(self.pending.len());
        out[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}

impl fmt::Debug for FramedReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramedReader").field("pending", &self.pending.len()).field("done", &self.done).finish()
    }
}
