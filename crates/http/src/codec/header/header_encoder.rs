//! HTTP header encoder for both directions of an exchange.
//!
//! The same [`HeaderEncoder`] writes a status line for a [`ResponseHead`] and a request line
//! for a [`RequestHead`], then fixes up the framing headers so they agree with the
//! [`PayloadSize`] that follows.

use crate::protocol::{PayloadSize, RequestHead, ResponseHead, SendError};

use bytes::{BufMut, BytesMut};

use http::{header, HeaderMap, HeaderValue, Version};
use std::io;
use std::io::{ErrorKind, Write};
use tokio_util::codec::Encoder;
use tracing::error;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

const CHUNKED_VALUE: HeaderValue = HeaderValue::from_static("chunked");
const ZERO_VALUE: HeaderValue = HeaderValue::from_static("0");

#[derive(Debug, Default)]
pub struct HeaderEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut header, payload_size) = item;

        dst.reserve(INIT_HEADER_SIZE);
        ensure_http11(header.version())?;
        write!(
            FastWrite(dst),
            "HTTP/1.1 {} {}\r\n",
            header.status().as_str(),
            header.status().canonical_reason().unwrap_or("")
        )?;

        set_framing_headers(header.headers_mut(), payload_size, true);
        write_headers(header.headers(), dst);
        Ok(())
    }
}

impl Encoder<(RequestHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (RequestHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut header, payload_size) = item;

        dst.reserve(INIT_HEADER_SIZE);
        ensure_http11(header.version())?;
        let target = header.uri().path_and_query().map_or("/", |path_and_query| path_and_query.as_str());
        write!(FastWrite(dst), "{} {} HTTP/1.1\r\n", header.method().as_str(), target)?;

        set_framing_headers(header.headers_mut(), payload_size, false);
        write_headers(header.headers(), dst);
        Ok(())
    }
}

fn ensure_http11(version: Version) -> Result<(), SendError> {
    if version == Version::HTTP_11 {
        Ok(())
    } else {
        error!(http_version = ?version, "unsupported http version");
        Err(io::Error::from(ErrorKind::Unsupported).into())
    }
}

/// Set Content-Length or Transfer-Encoding so they match the payload that follows.
///
/// Bodiless requests carry neither header, bodiless responses carry `Content-Length: 0`.
fn set_framing_headers(headers: &mut HeaderMap, payload_size: PayloadSize, is_response: bool) {
    match payload_size {
        PayloadSize::Length(n) => {
            headers.remove(header::TRANSFER_ENCODING);
            headers.insert(header::CONTENT_LENGTH, n.into());
        }
        PayloadSize::Chunked | PayloadSize::UntilClose => {
            headers.remove(header::CONTENT_LENGTH);
            headers.insert(header::TRANSFER_ENCODING, CHUNKED_VALUE);
        }
        PayloadSize::Empty => {
            headers.remove(header::TRANSFER_ENCODING);
            if is_response {
                headers.insert(header::CONTENT_LENGTH, ZERO_VALUE);
            } else {
                headers.remove(header::CONTENT_LENGTH);
            }
        }
    }
}

fn write_headers(headers: &HeaderMap, dst: &mut BytesMut) {
    for (header_name, header_value) in headers {
        dst.put_slice(header_name.as_ref());
        dst.put_slice(b": ");
        dst.put_slice(header_value.as_ref());
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");
}

/// Writer over `BytesMut` so `write!` can format straight into the buffer.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
