//! HTTP/1.1 message framing for the exchange engine
//!
//! This crate is the wire layer of the workspace: it turns bytes into typed HTTP heads and
//! payload chunks and back again, for both ends of an exchange. It knows nothing about
//! sockets, tasks or cancellation; the `exchange-engine` crate drives it through
//! `tokio_util::codec::{FramedRead, FramedWrite}`.
//!
//! # Architecture
//!
//! - [`protocol`]: heads, payload items, payload sizes and error types
//! - [`codec`]: the decoders and encoders
//!
//! | side   | reads with                      | writes with                      |
//! |--------|---------------------------------|----------------------------------|
//! | server | [`codec::RequestDecoder`]       | [`codec::ResponseEncoder`]       |
//! | client | [`codec::ResponseDecoder`]      | [`codec::RequestEncoder`]        |
//!
//! # Error Handling
//!
//! - [`protocol::HttpError`]: Top-level error type
//! - [`protocol::ParseError`]: decoding errors
//! - [`protocol::SendError`]: encoding errors
//!
//! # Limitations
//!
//! - HTTP/1.0 and HTTP/1.1 only
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64

pub mod codec;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
