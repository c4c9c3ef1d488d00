//! Content-encoding detection and decoding.
//!
//! The declared `Content-Encoding` is only a hint: gzip and deflate bodies are sniffed
//! before a decoder is picked, and a body labelled gzip that lacks the gzip magic is
//! passed through untouched.
//!
//! Decoders are push style, like the compressors of `flate2`, `zstd` and `brotli` they
//! are built from: compressed bytes are written in and decoded bytes are taken out of
//! an in-memory buffer.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use flate2::write::{DeflateDecoder, GzDecoder, ZlibDecoder};
use tracing::{debug, trace};
use zstd::stream::raw::{Decoder as ZstdRawDecoder, InBuffer, Operation, OutBuffer};

use crate::body::peek::Peekable;
use crate::protocol::{BodyError, CompressionError};

/// The two first bytes of every gzip member, read as a little-endian u16.
pub const GZIP_MAGIC: u16 = 0x8b1f;

const ZLIB_METHOD_DEFLATE: u8 = 8;
const ZLIB_MAX_WINDOW_INFO: u8 = 7;

/// Whether `head` starts with the gzip magic number.
pub fn is_gzip(head: &[u8]) -> bool {
    match head {
        [b0, b1, ..] => u16::from_le_bytes([*b0, *b1]) == GZIP_MAGIC,
        _ => false,
    }
}

/// Whether `head` starts with a zlib header (RFC 1950) rather than raw deflate data.
pub fn is_zlib_wrapped(head: &[u8]) -> bool {
    match head {
        [cmf, flg, ..] => {
            cmf & 0x0f == ZLIB_METHOD_DEFLATE
                && cmf >> 4 <= ZLIB_MAX_WINDOW_INFO
                && u16::from_be_bytes([*cmf, *flg]) % 31 == 0
        }
        _ => false,
    }
}

/// In-memory sink the decoders write decoded bytes into.
#[derive(Debug)]
pub(crate) struct Writer {
    buf: BytesMut,
}

impl Writer {
    pub(crate) fn new() -> Self {
        Self { buf: BytesMut::with_capacity(4096) }
    }

    pub(crate) fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A push style decoder for one content coding.
pub trait BodyDecoder: Send {
    /// Feeds encoded bytes and returns how many were consumed.
    ///
    /// Consuming fewer bytes than offered means the encoded stream has ended, the rest
    /// of the input does not belong to it.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Takes the bytes decoded so far.
    fn take(&mut self) -> Bytes;

    /// Called once the input is exhausted, fails when the encoded stream is truncated.
    fn finish(&mut self) -> io::Result<()>;
}

/// Creates a fresh [`BodyDecoder`] for every body using a registered coding.
pub trait DecoderFactory: Send + Sync {
    fn create(&self) -> io::Result<Box<dyn BodyDecoder>>;
}

impl<F> DecoderFactory for F
where
    F: Fn() -> io::Result<Box<dyn BodyDecoder>> + Send + Sync,
{
    fn create(&self) -> io::Result<Box<dyn BodyDecoder>> {
        self()
    }
}

/// Writes as much of `data` as the decoder accepts, then flushes decoded output through.
fn write_some<W: Write>(decoder: &mut W, mut data: &[u8]) -> io::Result<usize> {
    let total = data.len();
    while !data.is_empty() {
        match decoder.write(data) {
            Ok(0) => break,
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    decoder.flush()?;
    Ok(total - data.len())
}

/// Decoder for the `zstd` content coding.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZstdDecoderFactory;

struct ZstdBodyDecoder {
    decoder: ZstdRawDecoder<'static>,
    out: Writer,
    scratch: Box<[u8]>,
    seen_input: bool,
    frame_done: bool,
}

impl DecoderFactory for ZstdDecoderFactory {
    fn create(&self) -> io::Result<Box<dyn BodyDecoder>> {
        Ok(Box::new(ZstdBodyDecoder {
            decoder: ZstdRawDecoder::new()?,
            out: Writer::new(),
            scratch: vec![0; 32 * 1024].into_boxed_slice(),
            seen_input: false,
            frame_done: false,
        }))
    }
}

impl BodyDecoder for ZstdBodyDecoder {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        self.seen_input = true;

        let mut input = InBuffer::around(data);
        loop {
            let before = input.pos();
            let mut output = OutBuffer::around(&mut self.scratch[..]);
            // a zero hint means the current frame is complete and flushed
            let hint = self.decoder.run(&mut input, &mut output)?;
            let produced = output.pos();

            self.out.buf.extend_from_slice(&self.scratch[..produced]);
            self.frame_done = hint == 0;

            let output_full = produced == self.scratch.len();
            if (input.pos() == data.len() && !output_full) || (input.pos() == before && produced == 0) {
                break;
            }
        }
        Ok(input.pos())
    }

    fn take(&mut self) -> Bytes {
        self.out.take()
    }

    fn finish(&mut self) -> io::Result<()> {
        if self.seen_input && !self.frame_done {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "zstd stream ended inside a frame"));
        }
        Ok(())
    }
}

/// Decoder for the `br` content coding.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrotliDecoderFactory;

struct BrotliBodyDecoder {
    writer: Box<brotli::DecompressorWriter<Writer>>,
    seen_input: bool,
}

impl DecoderFactory for BrotliDecoderFactory {
    fn create(&self) -> io::Result<Box<dyn BodyDecoder>> {
        let writer = Box::new(brotli::DecompressorWriter::new(Writer::new(), 32 * 1024));
        Ok(Box::new(BrotliBodyDecoder { writer, seen_input: false }))
    }
}

impl BodyDecoder for BrotliBodyDecoder {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.seen_input |= !data.is_empty();
        write_some(&mut *self.writer, data)
    }

    fn take(&mut self) -> Bytes {
        self.writer.get_mut().take()
    }

    /// Fails unless the brotli stream reached its last meta-block.
    fn finish(&mut self) -> io::Result<()> {
        if !self.seen_input {
            return Ok(());
        }
        self.writer.close()
    }
}

/// Gzip decoder that carries on with the next member of a multi-member body.
///
/// Bytes after a member that do not start with the gzip magic end the body and are
/// left unconsumed.
struct GzipMembers {
    decoder: GzDecoder<Writer>,
    /// Single byte seen after a finished member, the next byte decides whether it starts
    /// another member
    pending: Option<u8>,
    ended: bool,
}

impl GzipMembers {
    fn new() -> Self {
        Self { decoder: GzDecoder::new(Writer::new()), pending: None, ended: false }
    }

    fn next_member(&mut self) -> io::Result<()> {
        let finished = std::mem::replace(&mut self.decoder, GzDecoder::new(Writer::new()));
        *self.decoder.get_mut() = finished.finish()?;
        trace!("gzip member finished, decoding the next one");
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut consumed = 0;

        if let Some(first) = self.pending {
            let Some(&second) = data.first() else {
                return Ok(0);
            };
            if !is_gzip(&[first, second]) {
                self.ended = true;
                return Ok(0);
            }
            self.pending = None;
            self.next_member()?;
            write_some(&mut self.decoder, &[first])?;
        }

        while consumed < data.len() && !self.ended {
            consumed += write_some(&mut self.decoder, &data[consumed..])?;

            match &data[consumed..] {
                [] => {}
                [single] => {
                    self.pending = Some(*single);
                    consumed += 1;
                }
                rest if is_gzip(rest) => self.next_member()?,
                _ => self.ended = true,
            }
        }

        Ok(consumed)
    }

    fn take(&mut self) -> Bytes {
        self.decoder.get_mut().take()
    }

    fn finish(&mut self) -> io::Result<()> {
        self.decoder.try_finish()
    }
}

/// Custom content codings, keyed by their lower-cased token.
#[derive(Clone, Default)]
pub struct DecoderRegistry {
    factories: HashMap<String, Arc<dyn DecoderFactory>>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry knowing `zstd` and `br`.
    pub fn with_defaults() -> Self {
        Self::new().with("zstd", ZstdDecoderFactory).with("br", BrotliDecoderFactory)
    }

    /// Registers `factory` for `encoding`, replacing any previous registration.
    pub fn register<F: DecoderFactory + 'static>(&mut self, encoding: &str, factory: F) -> &mut Self {
        self.factories.insert(encoding.trim().to_ascii_lowercase(), Arc::new(factory));
        self
    }

    #[must_use]
    pub fn with<F: DecoderFactory + 'static>(mut self, encoding: &str, factory: F) -> Self {
        self.register(encoding, factory);
        self
    }

    pub fn get(&self, encoding: &str) -> Option<&Arc<dyn DecoderFactory>> {
        self.factories.get(&encoding.trim().to_ascii_lowercase())
    }

    pub fn contains(&self, encoding: &str) -> bool {
        self.get(encoding).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("DecoderRegistry").field("encodings", &names).finish()
    }
}

/// What a body turned out to be encoded with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compression {
    /// Passed through as is
    None,
    Gzip,
    /// Deflate data, `wrapped` when it carries a zlib header
    Deflate { wrapped: bool },
    /// A coding from the [`DecoderRegistry`]
    Custom(String),
}

impl Compression {
    pub fn is_compressed(&self) -> bool {
        !matches!(self, Compression::None)
    }
}

/// The decoder picked for a body.
pub struct ContentDecoder {
    inner: Inner,
}

enum Inner {
    Identity(Writer),
    Gzip(GzipMembers),
    Zlib(ZlibDecoder<Writer>),
    Deflate(DeflateDecoder<Writer>),
    Custom { name: String, decoder: Box<dyn BodyDecoder> },
}

impl ContentDecoder {
    pub fn identity() -> Self {
        Self { inner: Inner::Identity(Writer::new()) }
    }

    pub fn gzip() -> Self {
        Self { inner: Inner::Gzip(GzipMembers::new()) }
    }

    pub fn zlib() -> Self {
        Self { inner: Inner::Zlib(ZlibDecoder::new(Writer::new())) }
    }

    /// Raw deflate data without zlib header.
    pub fn deflate() -> Self {
        Self { inner: Inner::Deflate(DeflateDecoder::new(Writer::new())) }
    }

    pub fn custom<S: Into<String>>(name: S, decoder: Box<dyn BodyDecoder>) -> Self {
        Self { inner: Inner::Custom { name: name.into(), decoder } }
    }

    pub fn compression(&self) -> Compression {
        match &self.inner {
            Inner::Identity(_) => Compression::None,
            Inner::Gzip(_) => Compression::Gzip,
            Inner::Zlib(_) => Compression::Deflate { wrapped: true },
            Inner::Deflate(_) => Compression::Deflate { wrapped: false },
            Inner::Custom { name, .. } => Compression::Custom(name.clone()),
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.inner, Inner::Identity(_))
    }

    fn name(&self) -> &str {
        match &self.inner {
            Inner::Identity(_) => "identity",
            Inner::Gzip(_) => "gzip",
            Inner::Zlib(_) | Inner::Deflate(_) => "deflate",
            Inner::Custom { name, .. } => name,
        }
    }

    /// Feeds encoded bytes, see [`BodyDecoder::write`].
    pub fn write(&mut self, data: &[u8]) -> Result<usize, CompressionError> {
        let result = match &mut self.inner {
            Inner::Identity(writer) => writer.write(data),
            Inner::Gzip(decoder) => decoder.write(data),
            Inner::Zlib(decoder) => write_some(decoder, data),
            Inner::Deflate(decoder) => write_some(decoder, data),
            Inner::Custom { decoder, .. } => decoder.write(data),
        };

        result.map_err(|e| CompressionError::corrupt(self.name(), e))
    }

    /// Takes the bytes decoded so far.
    pub fn take(&mut self) -> Bytes {
        match &mut self.inner {
            Inner::Identity(writer) => writer.take(),
            Inner::Gzip(decoder) => decoder.take(),
            Inner::Zlib(decoder) => decoder.get_mut().take(),
            Inner::Deflate(decoder) => decoder.get_mut().take(),
            Inner::Custom { decoder, .. } => decoder.take(),
        }
    }

    /// Completes decoding once the encoded input is exhausted.
    pub fn finish(&mut self) -> Result<(), CompressionError> {
        let result = match &mut self.inner {
            Inner::Identity(_) => Ok(()),
            Inner::Gzip(decoder) => decoder.finish(),
            Inner::Zlib(decoder) => decoder.try_finish(),
            Inner::Deflate(decoder) => decoder.try_finish(),
            Inner::Custom { decoder, .. } => decoder.finish(),
        };

        result.map_err(|e| CompressionError::corrupt(self.name(), e))
    }
}

impl fmt::Debug for ContentDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentDecoder").field("compression", &self.compression()).finish()
    }
}

/// Picks the decoder for a body from its declared coding and its first bytes.
#[derive(Debug, Clone)]
pub struct CompressionResolver {
    registry: Arc<DecoderRegistry>,
    strict: bool,
}

impl CompressionResolver {
    /// `strict` turns unknown codings into [`CompressionError::Unsupported`] instead of
    /// passing the body through.
    pub fn new(registry: Arc<DecoderRegistry>, strict: bool) -> Self {
        Self { registry, strict }
    }

    /// Whether the declared coding is one this resolver would try to decode.
    pub fn is_known(&self, declared: Option<&str>) -> bool {
        match declared.map(|token| token.trim().to_ascii_lowercase()) {
            None => false,
            Some(token) => matches!(token.as_str(), "gzip" | "x-gzip" | "deflate") || self.registry.contains(&token),
        }
    }

    /// Resolves the decoder for a body declared with `declared`.
    ///
    /// Peeked bytes stay in `source` and are decoded (or passed through) like all others.
    pub fn resolve<R: Read>(
        &self,
        declared: Option<&str>,
        source: &mut Peekable<R>,
    ) -> Result<ContentDecoder, BodyError> {
        let Some(token) = declared.map(str::trim).filter(|token| !token.is_empty()) else {
            return Ok(ContentDecoder::identity());
        };
        let token = token.to_ascii_lowercase();

        let decoder = match token.as_str() {
            "identity" => ContentDecoder::identity(),
            "gzip" | "x-gzip" => {
                if is_gzip(source.peek(2)?) {
                    ContentDecoder::gzip()
                } else {
                    debug!(encoding = %token, "body declared gzip carries no gzip magic, passing through");
                    ContentDecoder::identity()
                }
            }
            "deflate" => {
                let head = source.peek(2)?;
                if head.len() < 2 {
                    debug!(len = head.len(), "deflate body too short to be compressed, passing through");
                    ContentDecoder::identity()
                } else if is_zlib_wrapped(head) {
                    ContentDecoder::zlib()
                } else {
                    ContentDecoder::deflate()
                }
            }
            other => match self.registry.get(other) {
                Some(factory) => {
                    let decoder = factory.create().map_err(|e| CompressionError::decoder(other, e))?;
                    ContentDecoder::custom(other, decoder)
                }
                None if self.strict => return Err(CompressionError::unsupported(other).into()),
                None => {
                    debug!(encoding = other, "unknown content encoding, passing through");
                    ContentDecoder::identity()
                }
            },
        };

        trace!(compression = ?decoder.compression(), "resolved content decoder");
        Ok(decoder)
    }
}
