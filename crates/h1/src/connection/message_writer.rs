use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::Encoder;
use tracing::trace;

use crate::codec::MessageEncoder;
use crate::protocol::{Framing, Message, PayloadItem, SendError};

/// Buffers encoded messages and writes them to a blocking sink.
#[derive(Debug)]
pub struct MessageWriter<W, E> {
    writer: W,
    buffer: BytesMut,
    encoder: E,
}

impl<W, E> MessageWriter<W, E>
where
    W: Write,
{
    pub fn with_capacity(writer: W, encoder: E, buffer_size: usize) -> Self {
        Self { writer, buffer: BytesMut::with_capacity(buffer_size), encoder }
    }

    #[inline]
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    #[inline]
    pub fn write<T>(&mut self, item: T) -> Result<(), SendError>
    where
        E: Encoder<T, Error = SendError>,
    {
        self.encoder.encode(item, &mut self.buffer)
    }

    /// Queues bytes that bypass the encoder, such as an interim `100 Continue`.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buffer.put_slice(bytes);
    }

    /// Queues a head and a body of known length.
    ///
    /// An empty body is written without any framing when `empty_framing` is
    /// [`Framing::NoBody`], or with `Content-Length: 0` when it is `Framing::Length(0)`.
    pub fn write_message<H>(&mut self, head: H, body: Bytes, empty_framing: Framing) -> Result<(), SendError>
    where
        E: Encoder<Message<(H, Framing)>, Error = SendError>,
    {
        let framing = if body.is_empty() { empty_framing } else { Framing::Length(body.len() as u64) };

        self.write(Message::Header((head, framing)))?;
        if !body.is_empty() {
            self.write(Message::<(H, Framing)>::Payload(PayloadItem::Chunk(body)))?;
        }
        Ok(())
    }

    /// Writes out everything queued so far.
    pub fn flush(&mut self) -> Result<(), SendError> {
        if !self.buffer.is_empty() {
            trace!(len = self.buffer.len(), "writing buffered messages");
            let result = self.writer.write_all(&self.buffer);
            self.buffer.clear();
            result?;
        }
        Ok(self.writer.flush()?)
    }
}

impl<W, HE> MessageWriter<W, MessageEncoder<HE>>
where
    W: Write,
{
    /// Queues a head announcing `framing` without writing any body.
    pub fn write_head_only<H>(&mut self, head: H, framing: Framing) -> Result<(), SendError>
    where
        HE: Encoder<(H, Framing), Error = SendError>,
    {
        self.encoder.encode_head_only(head, framing, &mut self.buffer)
    }
}
