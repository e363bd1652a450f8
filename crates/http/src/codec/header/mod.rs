//! HTTP header processing for encoding and decoding message heads
//!
//! - [`RequestHeaderDecoder`] / [`ResponseHeaderDecoder`]: parse heads from raw bytes,
//!   enforce size limits and work out the payload framing
//! - [`HeaderEncoder`]: serialize request or response heads, keeping
//!   `Content-Length`/`Transfer-Encoding` consistent with the payload

mod header_decoder;
mod header_encoder;

pub use header_decoder::RequestHeaderDecoder;
pub use header_decoder::ResponseHeaderDecoder;
pub use header_encoder::HeaderEncoder;
