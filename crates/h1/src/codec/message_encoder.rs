use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::codec::body::PayloadEncoder;
use crate::codec::header::{RequestHeadEncoder, ResponseHeadEncoder};
use crate::protocol::{Framing, Message, SendError};

/// Encodes a head followed by its payload items.
///
/// The framing given with the head picks the payload encoder; payload items are only
/// accepted between a head and the end of its body.
#[derive(Debug, Default)]
pub struct MessageEncoder<E> {
    header_encoder: E,
    payload_encoder: Option<PayloadEncoder>,
}

pub type ResponseEncoder = MessageEncoder<ResponseHeadEncoder>;

pub type RequestEncoder = MessageEncoder<RequestHeadEncoder>;

impl<E> MessageEncoder<E> {
    pub fn new(header_encoder: E) -> Self {
        Self { header_encoder, payload_encoder: None }
    }

    /// Whether the previous message has been written completely.
    pub fn is_idle(&self) -> bool {
        self.payload_encoder.is_none()
    }

    /// Encodes a head that announces `framing` but is never followed by a body, like the
    /// reply to a HEAD request.
    pub fn encode_head_only<H>(&mut self, head: H, framing: Framing, dst: &mut BytesMut) -> Result<(), SendError>
    where
        E: Encoder<(H, Framing), Error = SendError>,
    {
        if self.payload_encoder.is_some() {
            error!("expect payload item but receive message head");
            return Err(SendError::invalid_body("message head written before previous body finished"));
        }
        self.header_encoder.encode((head, framing), dst)
    }
}

impl<H, D, E> Encoder<Message<(H, Framing), D>> for MessageEncoder<E>
where
    D: Buf,
    E: Encoder<(H, Framing), Error = SendError>,
{
    type Error = SendError;

    fn encode(&mut self, item: Message<(H, Framing), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, framing)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive message head");
                    return Err(SendError::invalid_body("message head written before previous body finished"));
                }

                self.header_encoder.encode((head, framing), dst)?;
                let payload_encoder = PayloadEncoder::from(framing);
                if !payload_encoder.is_finish() {
                    self.payload_encoder = Some(payload_encoder);
                }
                Ok(())
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect message head but receive payload item");
                    return Err(SendError::invalid_body("payload written without a message head"));
                };

                let result = payload_encoder.encode(payload_item, dst);
                if result.is_err() || payload_encoder.is_finish() {
                    self.payload_encoder = None;
                }
                result
            }
        }
    }
}
