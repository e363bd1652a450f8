//! Streaming encoder for whole HTTP messages.
//!
//! A head must be followed by its payload items up to [`PayloadItem::Eof`] before the
//! next head; the encoder refuses out-of-order items.

use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeaderEncoder;
use crate::protocol::{Message, PayloadSize, SendError};
use bytes::{Buf, BytesMut};
use std::io;
use std::io::ErrorKind;
use tokio_util::codec::Encoder;
use tracing::error;

#[derive(Debug, Default)]
pub struct MessageEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

/// Server side encoder: response heads and bodies.
pub type ResponseEncoder = MessageEncoder;

/// Client side encoder: request heads and bodies.
pub type RequestEncoder = MessageEncoder;

impl MessageEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<H, D: Buf> Encoder<Message<(H, PayloadSize), D>> for MessageEncoder
where
    HeaderEncoder: Encoder<(H, PayloadSize), Error = SendError>,
{
    type Error = SendError;

    fn encode(&mut self, item: Message<(H, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive message head");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                }

                let payload_encoder = PayloadEncoder::from(payload_size);
                if !payload_encoder.is_finish() {
                    self.payload_encoder = Some(payload_encoder);
                }
                self.header_encoder.encode((head, payload_size), dst)
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    // bodiless heads have nothing left to encode
                    if payload_item.is_eof() {
                        return Ok(());
                    }
                    error!("expect message head but receive payload item");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                };

                let result = payload_encoder.encode(payload_item, dst);

                if payload_encoder.is_finish() {
                    self.payload_encoder.take();
                }

                result
            }
        }
    }
}
