//! Encoder for bodies with a declared `Content-Length`.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;

use crate::protocol::{PayloadItem, SendError};

/// Copies payload bytes through while checking them against the declared length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    length: u64,
    eof: bool,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { length, eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof || self.length == 0
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(bytes) => {
                let size = bytes.remaining() as u64;
                if size > self.length {
                    return Err(SendError::invalid_body(format!(
                        "chunk of {size} bytes exceeds the {} bytes left of content-length",
                        self.length
                    )));
                }
                dst.put(bytes);
                self.length -= size;
                Ok(())
            }
            PayloadItem::Eof => {
                self.eof = true;
                if self.length > 0 {
                    return Err(SendError::invalid_body(format!(
                        "body ended {} bytes short of content-length",
                        self.length
                    )));
                }
                Ok(())
            }
        }
    }
}
