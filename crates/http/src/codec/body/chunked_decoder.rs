//! Decoder for HTTP chunked transfer encoding,
//! see [RFC 9112 Section 7.1](https://www.rfc-editor.org/rfc/rfc9112#section-7.1).
//!
//! Chunk extensions and trailer fields are accepted and skipped.

use crate::protocol::{ParseError, PayloadItem};
use bytes::{Buf, BytesMut};
use std::cmp;
use tokio_util::codec::Decoder;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: ChunkedState::SizeStart, remaining_size: 0 }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// First hex digit of the chunk size
    SizeStart,
    /// Remaining hex digits of the chunk size
    Size,
    /// Whitespace or extensions after the size, up to CR
    Extension,
    /// LF closing the size line
    SizeLf,
    Body,
    BodyCr,
    BodyLf,
    /// Start of a trailer line, or CR of the final empty line
    TrailerStart,
    Trailer,
    TrailerLf,
    EndLf,
    End,
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                ChunkedState::End => return Ok(Some(PayloadItem::Eof)),
                ChunkedState::Body => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let len = cmp::min(self.remaining_size, src.len() as u64);
                    #[allow(clippy::cast_possible_truncation, reason = "len is bounded by src.len()")]
                    let bytes = src.split_to(len as usize).freeze();
                    self.remaining_size -= len;
                    if self.remaining_size == 0 {
                        self.state = ChunkedState::BodyCr;
                    }
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }
                _ => {
                    if !src.has_remaining() {
                        return Ok(None);
                    }
                    let byte = src.get_u8();
                    self.state = self.step(byte)?;
                }
            }
        }
    }
}

impl ChunkedDecoder {
    fn step(&mut self, byte: u8) -> Result<ChunkedState, ParseError> {
        use ChunkedState::*;

        Ok(match (self.state, byte) {
            (SizeStart | Size, b) if b.is_ascii_hexdigit() => {
                let digit = u64::from(hex_value(b));
                self.remaining_size = self
                    .remaining_size
                    .checked_mul(16)
                    .and_then(|size| size.checked_add(digit))
                    .ok_or_else(|| ParseError::invalid_body("chunk size overflow"))?;
                Size
            }
            (Size, b' ' | b'\t' | b';') => Extension,
            (Size | Extension, b'\r') => SizeLf,
            (Extension, _) => Extension,
            (SizeLf, b'\n') if self.remaining_size == 0 => {
                trace!("read last chunk");
                TrailerStart
            }
            (SizeLf, b'\n') => Body,
            (BodyCr, b'\r') => BodyLf,
            (BodyLf, b'\n') => SizeStart,
            (TrailerStart, b'\r') => EndLf,
            (Trailer, b'\r') => TrailerLf,
            (TrailerStart | Trailer, _) => Trailer,
            (TrailerLf, b'\n') => TrailerStart,
            (EndLf, b'\n') => End,
            (state, b) => {
                return Err(ParseError::invalid_body(format!("unexpected byte {b:#04x} in chunked state {state:?}")));
            }
        })
    }
}

fn hex_value(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        _ => b - b'A' + 10,
    }
}
