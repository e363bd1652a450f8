//! HTTP header decoders for both directions of an exchange.
//!
//! [`RequestHeaderDecoder`] is used by the server to read request heads,
//! [`ResponseHeaderDecoder`] by the client to read response heads. Both parse with
//! `httparse`, record the byte ranges of each header name/value and then build the typed
//! `http` structure from slices of one frozen buffer, so header values share the
//! underlying allocation instead of being copied one by one.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header size: 8KB
//! - Only HTTP/1.0 and HTTP/1.1

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Uri, Version};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, PayloadSize, RequestHeader, ResponseHeader};

/// Maximum number of headers allowed in a message
const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header section
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decoder for HTTP request heads.
///
/// Yields the parsed [`RequestHeader`] and the [`PayloadSize`] announced by its
/// `Content-Length` / `Transfer-Encoding` headers.
#[derive(Debug, Default)]
pub struct RequestHeaderDecoder;

impl Decoder for RequestHeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // shortest possible request is "GET / HTTP/1.1\r\n\r\n"
        if src.len() < 14 {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut req = httparse::Request::new(&mut headers);

        let Some(body_offset) = check_status(req.parse(&src[..]).map_err(map_httparse_error)?, src.len())? else {
            return Ok(None);
        };

        let version = parse_version(req.version)?;
        let method = Method::from_bytes(req.method.ok_or(ParseError::InvalidMethod)?.as_bytes())
            .map_err(|_e| ParseError::InvalidMethod)?;
        let uri = req.path.ok_or(ParseError::InvalidUri)?.parse::<Uri>().map_err(|_e| ParseError::InvalidUri)?;

        let header_count = req.headers.len();
        let mut header_index = [EMPTY_HEADER_INDEX; MAX_HEADER_NUM];
        HeaderIndex::record(&src[..], req.headers, &mut header_index);

        let header_bytes = src.split_to(body_offset).freeze();

        let mut builder = Request::builder().method(method).uri(uri).version(version);
        if let Some(header_map) = builder.headers_mut() {
            append_headers(header_map, &header_bytes, &header_index[..header_count])?;
        }

        let header = RequestHeader::from(builder.body(()).map_err(ParseError::invalid_header)?);
        let payload_size = request_payload_size(&header)?;

        Ok(Some((header, payload_size)))
    }
}

/// Decoder for HTTP response heads.
///
/// The payload size of a response depends on the method of the request it answers, so
/// the decoder is created per exchange with that method.
#[derive(Debug)]
pub struct ResponseHeaderDecoder {
    request_method: Method,
}

impl ResponseHeaderDecoder {
    pub fn new(request_method: Method) -> Self {
        Self { request_method }
    }
}

impl Decoder for ResponseHeaderDecoder {
    type Item = (ResponseHeader, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
            let mut resp = httparse::Response::new(&mut headers);

            let Some(body_offset) = check_status(resp.parse(&src[..]).map_err(map_httparse_error)?, src.len())? else {
                return Ok(None);
            };

            let version = parse_version(resp.version)?;
            let status = resp
                .code
                .and_then(|code| StatusCode::from_u16(code).ok())
                .ok_or(ParseError::InvalidStatus(resp.code))?;

            // interim responses precede the final one and are dropped
            if status.is_informational() && status != StatusCode::SWITCHING_PROTOCOLS {
                trace!(status = status.as_u16(), "skip informational response");
                let _ = src.split_to(body_offset);
                continue;
            }

            let header_count = resp.headers.len();
            let mut header_index = [EMPTY_HEADER_INDEX; MAX_HEADER_NUM];
            HeaderIndex::record(&src[..], resp.headers, &mut header_index);

            let header_bytes = src.split_to(body_offset).freeze();

            let mut builder = Response::builder().status(status).version(version);
            if let Some(header_map) = builder.headers_mut() {
                append_headers(header_map, &header_bytes, &header_index[..header_count])?;
            }

            let header = ResponseHeader::from(builder.body(()).map_err(ParseError::invalid_header)?);
            let payload_size = response_payload_size(&header, &self.request_method)?;

            return Ok(Some((header, payload_size)));
        }
    }
}

fn map_httparse_error(e: Error) -> ParseError {
    match e {
        Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
        e => ParseError::invalid_header(e.to_string()),
    }
}

/// Returns the body offset of a complete head, `None` for a partial one.
fn check_status(status: Status<usize>, buffered: usize) -> Result<Option<usize>, ParseError> {
    match status {
        Status::Complete(body_offset) => {
            trace!(header_size = body_offset, "parsed header size");
            ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));
            Ok(Some(body_offset))
        }
        Status::Partial => {
            ensure!(buffered <= MAX_HEADER_BYTES, ParseError::too_large_header(buffered, MAX_HEADER_BYTES));
            Ok(None)
        }
    }
}

fn parse_version(version: Option<u8>) -> Result<Version, ParseError> {
    match version {
        Some(0) => Ok(Version::HTTP_10),
        Some(1) => Ok(Version::HTTP_11),
        // http2 and http3 are not spoken on this framing
        v => Err(ParseError::InvalidVersion(v)),
    }
}

/// Byte range positions of a header's name and value within the head buffer.
#[derive(Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

const EMPTY_HEADER_INDEX: HeaderIndex = HeaderIndex { name: (0, 0), value: (0, 0) };

impl HeaderIndex {
    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        let bytes_ptr = bytes.as_ptr() as usize;
        for (header, indices) in headers.iter().zip(indices.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - bytes_ptr;
            indices.name = (name_start, name_start + header.name.len());
            let value_start = header.value.as_ptr() as usize - bytes_ptr;
            indices.value = (value_start, value_start + header.value.len());
        }
    }
}

fn append_headers(headers: &mut HeaderMap, header_bytes: &Bytes, indices: &[HeaderIndex]) -> Result<(), ParseError> {
    headers.reserve(indices.len());
    for index in indices {
        let name = HeaderName::from_bytes(&header_bytes[index.name.0..index.name.1]).map_err(ParseError::invalid_header)?;
        let value = HeaderValue::from_maybe_shared(header_bytes.slice(index.value.0..index.value.1))
            .map_err(ParseError::invalid_header)?;
        headers.append(name, value);
    }
    Ok(())
}

/// Determines the request payload framing, refer: <https://www.rfc-editor.org/rfc/rfc9112.html#name-message-body-length>
fn request_payload_size(header: &RequestHeader) -> Result<PayloadSize, ParseError> {
    if !header.need_body() {
        return Ok(PayloadSize::new_empty());
    }

    let te_header = header.headers().get(http::header::TRANSFER_ENCODING);
    let cl_header = header.headers().get(http::header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        (None, None) => Ok(PayloadSize::new_empty()),
        (te_value @ Some(_), None) => {
            if is_chunked(te_value) {
                Ok(PayloadSize::new_chunked())
            } else {
                Ok(PayloadSize::new_empty())
            }
        }
        (None, Some(cl_value)) => parse_content_length(cl_value),
        (Some(_), Some(_)) => {
            Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers"))
        }
    }
}

/// Determines the response payload framing. Transfer-Encoding overrides Content-Length
/// and a response without either runs until the connection closes.
fn response_payload_size(header: &ResponseHeader, request_method: &Method) -> Result<PayloadSize, ParseError> {
    if !header.has_body(request_method) {
        return Ok(PayloadSize::new_empty());
    }

    let te_header = header.headers().get(http::header::TRANSFER_ENCODING);
    let cl_header = header.headers().get(http::header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        (te_value @ Some(_), _) => {
            if is_chunked(te_value) {
                Ok(PayloadSize::new_chunked())
            } else {
                Ok(PayloadSize::UntilClose)
            }
        }
        (None, Some(cl_value)) => parse_content_length(cl_value),
        (None, None) => Ok(PayloadSize::UntilClose),
    }
}

fn parse_content_length(cl_value: &HeaderValue) -> Result<PayloadSize, ParseError> {
    let cl_str = cl_value.to_str().map_err(|_e| ParseError::invalid_content_length("value can't to_str"))?;
    let length = cl_str
        .trim()
        .parse::<u64>()
        .map_err(|_e| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;
    Ok(PayloadSize::new_length(length))
}

/// Checks if chunked is the final encoding of the Transfer-Encoding header.
fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    header_value
        .and_then(|value| value.as_bytes().rsplit(|b| *b == b',').next())
        .is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(CHUNKED))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderMap;
    use indoc::indoc;

    #[test]
    fn check_is_chunked() {
        let headers = HeaderMap::new();
        assert!(!is_chunked(headers.get(http::header::TRANSFER_ENCODING)));

        let mut headers = HeaderMap::new();
        headers.insert("Transfer-Encoding", "gzip, chunked".parse().unwrap());
        assert!(is_chunked(headers.get(http::header::TRANSFER_ENCODING)));

        let mut headers = HeaderMap::new();
        headers.insert("Transfer-Encoding", "chunked, gzip".parse().unwrap());
        assert!(!is_chunked(headers.get(http::header::TRANSFER_ENCODING)));

        let mut headers = HeaderMap::new();
        headers.insert("Transfer-Encoding", "Chunked".parse().unwrap());
        assert!(is_chunked(headers.get(http::header::TRANSFER_ENCODING)));
    }

    #[test]
    fn request_head_leaves_body_in_buffer() {
        let str = indoc! {r##"
        POST /upload HTTP/1.1
        Host: 127.0.0.1:8080
        Content-Length: 3

        123"##};

        let mut bytes = BytesMut::from(str);
        let (header, payload_size) = RequestHeaderDecoder.decode(&mut bytes).unwrap().unwrap();

        assert_eq!(header.method(), &Method::POST);
        assert_eq!(header.uri().path(), "/upload");
        assert_eq!(payload_size, PayloadSize::Length(3));
        assert_eq!(&bytes[..], &b"123"[..]);
    }

    #[test]
    fn request_from_curl() {
        let str = indoc! {r##"
        GET /index.html?a=1&b=2 HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "##};

        let mut buf = BytesMut::from(str);
        let (header, payload_size) = RequestHeaderDecoder.decode(&mut buf).unwrap().unwrap();

        assert!(payload_size.is_empty());
        assert_eq!(header.version(), Version::HTTP_11);
        assert_eq!(header.uri().path(), "/index.html");
        assert_eq!(header.uri().query(), Some("a=1&b=2"));
        assert_eq!(header.headers().len(), 3);
        assert_eq!(header.headers().get(http::header::USER_AGENT), Some(&HeaderValue::from_static("curl/7.79.1")));
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_request_needs_more() {
        let mut buf = BytesMut::from("GET /index.html HTTP/1.1\r\nHost: 127.0.0.1\r\n");
        assert!(RequestHeaderDecoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 43);
    }

    #[test]
    fn request_with_both_framing_headers_is_rejected() {
        let mut buf = BytesMut::from("POST / HTTP/1.1\r\nContent-Length: 3\r\nTransfer-Encoding: chunked\r\n\r\n");
        let result = RequestHeaderDecoder.decode(&mut buf);
        assert!(matches!(result, Err(ParseError::InvalidContentLength { .. })));
    }

    #[test]
    fn oversized_partial_head_is_rejected() {
        let mut buf = BytesMut::from("GET / HTTP/1.1\r\n");
        buf.extend_from_slice(format!("X-Fill: {}\r\n", "a".repeat(MAX_HEADER_BYTES)).as_bytes());
        let result = RequestHeaderDecoder.decode(&mut buf);
        assert!(matches!(result, Err(ParseError::TooLargeHeader { .. })));
    }

    #[test]
    fn response_with_content_length() {
        let str = indoc! {r##"
        HTTP/1.1 200 OK
        Content-Length: 5
        Content-Type: text/plain

        hello"##};

        let mut buf = BytesMut::from(str);
        let (header, payload_size) = ResponseHeaderDecoder::new(Method::GET).decode(&mut buf).unwrap().unwrap();

        assert_eq!(header.status(), StatusCode::OK);
        assert_eq!(header.headers().len(), 2);
        assert_eq!(payload_size, PayloadSize::Length(5));
        assert_eq!(&buf[..], b"hello");
    }

    #[test]
    fn response_framing_rules() {
        let mut buf = BytesMut::from("HTTP/1.1 302 Found\r\nLocation: /next\r\n\r\n");
        let (header, payload_size) = ResponseHeaderDecoder::new(Method::GET).decode(&mut buf).unwrap().unwrap();
        assert_eq!(header.status(), StatusCode::FOUND);
        assert_eq!(payload_size, PayloadSize::UntilClose);

        let mut buf = BytesMut::from("HTTP/1.1 200 OK\r\nContent-Length: 10\r\nTransfer-Encoding: chunked\r\n\r\n");
        let (_, payload_size) = ResponseHeaderDecoder::new(Method::GET).decode(&mut buf).unwrap().unwrap();
        assert_eq!(payload_size, PayloadSize::Chunked);

        let mut buf = BytesMut::from("HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n");
        let (_, payload_size) = ResponseHeaderDecoder::new(Method::HEAD).decode(&mut buf).unwrap().unwrap();
        assert_eq!(payload_size, PayloadSize::Empty);

        let mut buf = BytesMut::from("HTTP/1.0 204 No Content\r\n\r\n");
        let (header, payload_size) = ResponseHeaderDecoder::new(Method::DELETE).decode(&mut buf).unwrap().unwrap();
        assert_eq!(header.version(), Version::HTTP_10);
        assert_eq!(payload_size, PayloadSize::Empty);
    }

    #[test]
    fn response_skips_continue() {
        let mut buf = BytesMut::from("HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n");
        let (header, payload_size) = ResponseHeaderDecoder::new(Method::POST).decode(&mut buf).unwrap().unwrap();
        assert_eq!(header.status(), StatusCode::CREATED);
        assert_eq!(payload_size, PayloadSize::Empty);
        assert!(buf.is_empty());
    }

    #[test]
    fn response_with_bad_version() {
        let mut buf = BytesMut::from("HTTP/2.0 200 OK\r\n\r\n");
        assert!(ResponseHeaderDecoder::new(Method::GET).decode(&mut buf).is_err());
    }
}
