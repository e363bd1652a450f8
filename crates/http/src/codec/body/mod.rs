//! HTTP body framing for request and response payloads
//!
//! ## Decoders
//! - `ChunkedDecoder`: chunked transfer encoded payloads
//! - `LengthDecoder`: fixed-length payloads
//! - [`PayloadDecoder`]: picks the strategy from the [`PayloadSize`](crate::protocol::PayloadSize)
//!   announced by the head, including read-until-close for responses
//!
//! ## Encoders
//! - `ChunkedEncoder`, `LengthEncoder`
//! - [`PayloadEncoder`]: the encoding counterpart of [`PayloadDecoder`]

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
