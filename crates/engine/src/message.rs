//! Fully buffered messages exchanged with user code.
//!
//! The engine reads a whole body before handing a message over, so both types carry their
//! body as [`Bytes`].

use bytes::Bytes;
use exchange_http::protocol::{RequestHeader, ResponseHead, ResponseHeader};
use http::{HeaderMap, Method, StatusCode, Uri, Version};
use std::net::SocketAddr;

/// A response: received by the client, or populated by a sink before `send_response`.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self { status, version: Version::HTTP_11, headers: HeaderMap::new(), body: Bytes::new() }
    }

    pub(crate) fn from_header(header: ResponseHeader, body: Bytes) -> Self {
        let parts = header.into_parts();
        Self { status: parts.status, version: parts.version, headers: parts.headers, body }
    }

    /// Split into the head to encode and the body that follows it.
    pub(crate) fn into_head(self) -> (ResponseHead, Bytes) {
        let mut head = ResponseHead::new(());
        *head.status_mut() = self.status;
        *head.headers_mut() = self.headers;
        (head, self.body)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.body = body.into();
        self
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }
}

/// A request received by the server, handed to the sink together with its connection.
#[derive(Debug)]
pub struct IncomingRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    peer_addr: SocketAddr,
}

impl IncomingRequest {
    pub(crate) fn new(header: RequestHeader, body: Bytes, peer_addr: SocketAddr) -> Self {
        let (parts, ()) = header.into_inner().into_parts();
        Self { method: parts.method, uri: parts.uri, version: parts.version, headers: parts.headers, body, peer_addr }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}
