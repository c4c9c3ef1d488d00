//! The user facing body of a request or response.

use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::body::compression::{Compression, CompressionResolver, ContentDecoder};
use crate::body::config::BodyConfig;
use crate::body::multipart::MultipartParser;
use crate::body::peek::Peekable;
use crate::body::source::{FramedReader, PayloadSource};
use crate::protocol::{BodyError, BodyInfo, Framing, MultipartError};

const DECODE_BUFFER_SIZE: usize = 8 * 1024;

/// Body of a message read from a connection.
///
/// The body is consumed through [`Read`] or one of the `read_as_*` helpers; content
/// codings are detected on first access and removed transparently. Whatever is not read
/// can be thrown away with [`drain`](Self::drain), which leaves the connection positioned
/// at the next message. A body dropped without draining is skipped by the connection
/// before it reads the next head.
pub struct BodyStream<'conn> {
    info: BodyInfo,
    resolver: CompressionResolver,
    declared_compressed: bool,
    resolved: Option<Compression>,
    state: State<'conn>,
}

enum State<'conn> {
    /// Nothing read yet, the content coding is still undecided
    Unresolved(FramedReader<'conn>),
    Decoding(Box<Decoding<'conn>>),
    /// Fully read or drained
    Finished,
}

struct Decoding<'conn> {
    source: Peekable<FramedReader<'conn>>,
    decoder: ContentDecoder,
    decoded: Bytes,
    input_done: bool,
    failed: bool,
    scratch: Box<[u8]>,
}

impl<'conn> BodyStream<'conn> {
    /// Starts reading the body described by `info` from `source`.
    pub fn new(source: &'conn mut dyn PayloadSource, info: BodyInfo, config: &BodyConfig) -> Self {
        let resolver = CompressionResolver::new(Arc::clone(config.decoders()), config.strict_encoding());
        let declared_compressed = resolver.is_known(info.encoding());
        let framed = FramedReader::new(source, info.framing());

        Self { info, resolver, declared_compressed, resolved: None, state: State::Unresolved(framed) }
    }

    /// A body that carries nothing.
    pub fn empty() -> Self {
        Self {
            info: BodyInfo::empty(),
            resolver: CompressionResolver::new(Arc::default(), false),
            declared_compressed: false,
            resolved: None,
            state: State::Finished,
        }
    }

    /// Whether the message has a body, `Content-Length: 0` included.
    pub fn has_body(&self) -> bool {
        self.info.framing().has_body()
    }

    pub fn is_chunked(&self) -> bool {
        self.info.framing().is_chunked()
    }

    pub fn framing(&self) -> Framing {
        self.info.framing()
    }

    /// The declared content-length, even when chunked framing took precedence.
    pub fn content_length(&self) -> Option<u64> {
        self.info.content_length()
    }

    /// The declared content coding.
    pub fn encoding(&self) -> Option<&str> {
        self.info.encoding()
    }

    /// Whether the body is compressed.
    ///
    /// Until the first read this reflects the declaration; once decoding started it
    /// reports what sniffing the body found.
    pub fn is_compressed(&self) -> bool {
        self.resolved.as_ref().map_or(self.declared_compressed, Compression::is_compressed)
    }

    /// Resolves and returns the compression of the body, peeking at its first bytes.
    ///
    /// Fails with [`BodyError::Failed`] once resolving the coding has failed.
    pub fn compression(&mut self) -> Result<Compression, BodyError> {
        self.resolve()?;
        match (&self.resolved, &self.state) {
            (Some(compression), _) => Ok(compression.clone()),
            (None, State::Decoding(decoding)) if decoding.failed => Err(BodyError::Failed),
            (None, _) => Ok(Compression::None),
        }
    }

    /// Reads the whole decoded body.
    pub fn read_as_bytes(&mut self) -> Result<Bytes, BodyError> {
        Ok(Bytes::from(self.read_to_vec()?))
    }

    /// Reads the whole decoded body as UTF-8 text.
    pub fn read_as_string(&mut self) -> Result<String, BodyError> {
        Ok(String::from_utf8(self.read_to_vec()?)?)
    }

    fn read_to_vec(&mut self) -> Result<Vec<u8>, BodyError> {
        // content-length is only a hint, the decoded size may differ
        let capacity = self.content_length().and_then(|length| usize::try_from(length).ok()).unwrap_or(0);
        let mut body = Vec::with_capacity(capacity.min(1024 * 1024));
        self.read_to_end(&mut body)?;
        Ok(body)
    }

    /// The decoded body as an incremental reader.
    pub fn stream(&mut self) -> impl Read + '_ {
        self
    }

    /// Reads the whole body as it was framed on the wire, without removing any
    /// content coding.
    ///
    /// Fails with [`BodyError::AlreadyDecoding`] once decoded reading has started.
    pub fn raw_bytes(&mut self) -> Result<Bytes, BodyError> {
        let framed = match &mut self.state {
            State::Unresolved(framed) => framed,
            State::Decoding(_) => return Err(BodyError::AlreadyDecoding),
            State::Finished => return Ok(Bytes::new()),
        };

        let mut raw = BytesMut::new();
        let result = loop {
            match framed.next_chunk() {
                Ok(Some(bytes)) => raw.extend_from_slice(&bytes),
                Ok(None) => break Ok(raw.freeze()),
                Err(e) => break Err(BodyError::from(e)),
            }
        };

        self.state = State::Finished;
        result
    }

    /// Discards the rest of the body, returning how many framed bytes were skipped.
    ///
    /// Draining a fully read or already drained body does nothing. On error the
    /// connection the body came from is not reusable.
    pub fn drain(&mut self) -> Result<u64, BodyError> {
        let result = match &mut self.state {
            State::Unresolved(framed) => framed.drain(),
            State::Decoding(decoding) => {
                let peeked = decoding.source.buffered().len() as u64;
                decoding.source.get_mut().drain().map(|drained| drained + peeked)
            }
            State::Finished => return Ok(0),
        };
        self.state = State::Finished;

        match result {
            Ok(drained) => {
                if drained > 0 {
                    debug!(drained, "drained unread body");
                }
                Ok(drained)
            }
            Err(e) => {
                warn!(error = %e, "failed to drain body");
                Err(e.into())
            }
        }
    }

    /// Splits a `multipart/*` body into its parts.
    pub fn multipart(&mut self, boundary: &str) -> Result<MultipartParser<&mut Self>, MultipartError> {
        MultipartParser::new(self, boundary)
    }

    fn resolve(&mut self) -> Result<(), BodyError> {
        if !matches!(self.state, State::Unresolved(_)) {
            return Ok(());
        }
        let State::Unresolved(framed) = std::mem::replace(&mut self.state, State::Finished) else {
            return Ok(());
        };

        let mut source = Peekable::new(framed);
        let (decoder, result) = match self.resolver.resolve(self.info.encoding(), &mut source) {
            Ok(decoder) => (decoder, Ok(())),
            Err(e) => (ContentDecoder::identity(), Err(e)),
        };

        let failed = result.is_err();
        if !failed {
            let compression = decoder.compression();
            trace!(?compression, declared = ?self.info.encoding(), "body decoding resolved");
            self.resolved = Some(compression);
        }

        self.state = State::Decoding(Box::new(Decoding {
            source,
            decoder,
            decoded: Bytes::new(),
            input_done: false,
            failed,
            scratch: vec![0; DECODE_BUFFER_SIZE].into_boxed_slice(),
        }));
        result
    }

    fn read_decoded(&mut self, out: &mut [u8]) -> Result<usize, BodyError> {
        self.resolve()?;
        match &mut self.state {
            State::Decoding(decoding) => decoding.read(out),
            State::Unresolved(_) | State::Finished => Ok(0),
        }
    }
}

impl Decoding<'_> {
    fn read(&mut self, out: &mut [u8]) -> Result<usize, BodyError> {
        if self.failed {
            return Err(BodyError::Failed);
        }

        let result = self.read_inner(out);
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn read_inner(&mut self, out: &mut [u8]) -> Result<usize, BodyError> {
        if self.decoder.is_identity() {
            return Ok(self.source.read(out)?);
        }

        loop {
            if !self.decoded.is_empty() {
                let n = out.len().min(self.decoded.len());
                out[..n].copy_from_slice(&self.decoded.split_to(n));
                return Ok(n);
            }
            if self.input_done {
                return Ok(0);
            }

            let read = self.source.read(&mut self.scratch)?;
            if read == 0 {
                self.decoder.finish()?;
                self.input_done = true;
            } else {
                let consumed = self.decoder.write(&self.scratch[..read])?;
                if consumed < read {
                    debug!(trailing = read - consumed, "encoded stream ended before the body, rest is left for drain");
                    self.decoder.finish()?;
                    self.input_done = true;
                }
            }
            self.decoded = self.decoder.take();
        }
    }
}

impl Read for BodyStream<'_> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        self.read_decoded(out).map_err(io::Error::from)
    }
}

impl fmt::Debug for BodyStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Unresolved(_) => "unresolved",
            State::Decoding(decoding) if decoding.failed => "failed",
            State::Decoding(_) => "decoding",
            State::Finished => "finished",
        };
        f.debug_struct("BodyStream")
            .field("info", &self.info)
            .field("compressed", &self.is_compressed())
            .field("state", &state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;

    use super::*;
    use crate::body::source::MessageReader;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn empty_body() {
        let mut body = BodyStream::empty();

        assert!(!body.has_body());
        assert_eq!(body.read_as_bytes().unwrap(), Bytes::new());
        assert_eq!(body.drain().unwrap(), 0);
    }

    #[test]
    fn declared_compression_before_first_read() {
        let data = b"not gzip at all".to_vec();
        let mut reader = MessageReader::new(&data[..]);
        let info = BodyInfo::new(Framing::Length(data.len() as u64), Some(data.len() as u64), Some("gzip".to_owned()));
        let mut body = BodyStream::new(&mut reader, info, &BodyConfig::server());

        assert!(body.is_compressed());
        assert_eq!(body.compression().unwrap(), Compression::None);
        assert!(!body.is_compressed());
        assert_eq!(body.read_as_string().unwrap(), "not gzip at all");
    }

    #[test]
    fn raw_bytes_keep_compression() {
        let data = gzip(b"compressed");
        let mut reader = MessageReader::new(&data[..]);
        let info = BodyInfo::new(Framing::Length(data.len() as u64), None, Some("gzip".to_owned()));
        let mut body = BodyStream::new(&mut reader, info, &BodyConfig::server());

        assert_eq!(&body.raw_bytes().unwrap()[..], &data[..]);
        assert_eq!(body.drain().unwrap(), 0);
    }

    #[test]
    fn raw_bytes_after_decoding_started() {
        let data = gzip(b"compressed");
        let mut reader = MessageReader::new(&data[..]);
        let info = BodyInfo::new(Framing::Length(data.len() as u64), None, Some("gzip".to_owned()));
        let mut body = BodyStream::new(&mut reader, info, &BodyConfig::server());

        let mut first = [0u8; 4];
        body.read_exact(&mut first).unwrap();

        assert!(matches!(body.raw_bytes(), Err(BodyError::AlreadyDecoding)));
        assert_eq!(&first, b"comp");
    }

    #[test]
    fn corrupt_gzip_fails_then_drains() {
        let mut data = gzip(b"this body gets corrupted in the middle of the deflate stream");
        let middle = data.len() / 2;
        for byte in &mut data[middle..middle + 6] {
            *byte = 0xff;
        }
        data.extend_from_slice(b"GET / HTTP/1.1\r\n\r\n");

        let mut reader = MessageReader::new(&data[..]);
        let length = data.len() as u64 - 18;
        let info = BodyInfo::new(Framing::Length(length), Some(length), Some("gzip".to_owned()));
        let mut body = BodyStream::new(&mut reader, info, &BodyConfig::server());

        let error = body.read_as_bytes().unwrap_err();
        assert!(!error.is_fatal());
        assert!(matches!(body.read_as_bytes(), Err(BodyError::Failed)));

        body.drain().unwrap();
        drop(body);
        assert!(reader.is_reusable());
    }
}
