//! Streaming decoder for whole HTTP messages
//!
//! A [`MessageDecoder`] coordinates a head decoder and a [`PayloadDecoder`]:
//! 1. Header parsing: the head decoder yields the head and its [`PayloadSize`]
//! 2. Payload parsing: the payload decoder yields chunks until [`PayloadItem::Eof`]
//!
//! The server reads requests with [`RequestDecoder`], the client reads responses with
//! [`ResponseDecoder`].
//!
//! # Example
//!
//! ```no_run
//! use exchange_http::codec::RequestDecoder;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::new();
//! // ... add request data to buffer ...
//! let result = decoder.decode(&mut buffer);
//! ```

use crate::codec::body::PayloadDecoder;
use crate::codec::header::{RequestHeaderDecoder, ResponseHeaderDecoder};
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize};
use bytes::BytesMut;
use http::Method;
use tokio_util::codec::Decoder;

/// Decodes a message head followed by its payload.
///
/// The decoder is in one of two states through the `payload_decoder` field:
/// - `None`: currently parsing a head
/// - `Some(PayloadDecoder)`: currently parsing the payload of the last head
#[derive(Debug)]
pub struct MessageDecoder<HD> {
    header_decoder: HD,
    payload_decoder: Option<PayloadDecoder>,
}

/// Server side decoder: request heads and bodies.
pub type RequestDecoder = MessageDecoder<RequestHeaderDecoder>;

/// Client side decoder: response heads and bodies.
pub type ResponseDecoder = MessageDecoder<ResponseHeaderDecoder>;

impl RequestDecoder {
    pub fn new() -> Self {
        Self { header_decoder: RequestHeaderDecoder, payload_decoder: None }
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseDecoder {
    /// The request method decides whether the response may carry a body.
    pub fn new(request_method: Method) -> Self {
        Self { header_decoder: ResponseHeaderDecoder::new(request_method), payload_decoder: None }
    }
}

impl<HD, T> Decoder for MessageDecoder<HD>
where
    HD: Decoder<Item = (T, PayloadSize), Error = ParseError>,
{
    type Item = Message<(T, PayloadSize)>;
    type Error = ParseError;

    /// # Returns
    ///
    /// - `Ok(Some(Message::Header(_)))`: decoded a head
    /// - `Ok(Some(Message::Payload(_)))`: decoded a payload chunk or the end of the payload
    /// - `Ok(None)`: need more data to proceed
    /// - `Err(_)`: the peer sent something that is not HTTP/1.1
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode(src)?;
            return Ok(self.on_payload(item));
        }

        let message = match self.header_decoder.decode(src)? {
            Some((header, payload_size)) => {
                self.payload_decoder = Some(payload_size.into());
                Some(Message::Header((header, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode_eof(src)?;
            return Ok(self.on_payload(item));
        }

        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(ParseError::UnexpectedEof),
        }
    }
}

impl<HD> MessageDecoder<HD> {
    fn on_payload<T>(&mut self, item: Option<PayloadItem>) -> Option<Message<(T, PayloadSize)>> {
        match item {
            Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
            Some(item @ PayloadItem::Eof) => {
                // the next bytes belong to a new head
                self.payload_decoder.take();
                Some(Message::Payload(item))
            }
            None => None,
        }
    }
}
