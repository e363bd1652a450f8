//! HTTP/1.1 codec for both ends of an exchange
//!
//! Built on `tokio_util::codec` so it plugs into `FramedRead`/`FramedWrite`:
//!
//! - Server side: [`RequestDecoder`] reads requests, [`ResponseEncoder`] writes responses
//! - Client side: [`RequestEncoder`] writes requests, [`ResponseDecoder`] reads responses
//!
//! Heads go through the [`header`] module, payloads through the [`body`] module.
//!
//! # Example
//!
//! ```no_run
//! use exchange_http::codec::{RequestDecoder, ResponseEncoder};
//! use tokio_util::codec::{Decoder, Encoder};
//! use bytes::BytesMut;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut request_buffer = BytesMut::new();
//! let request = decoder.decode(&mut request_buffer);
//!
//! let mut encoder = ResponseEncoder::new();
//! let mut response_buffer = BytesMut::new();
//! // ... encode response ...
//! ```

pub mod body;
pub mod header;
mod message_decoder;
mod message_encoder;

pub use message_decoder::MessageDecoder;
pub use message_decoder::RequestDecoder;
pub use message_decoder::ResponseDecoder;
pub use message_encoder::MessageEncoder;
pub use message_encoder::RequestEncoder;
pub use message_encoder::ResponseEncoder;
