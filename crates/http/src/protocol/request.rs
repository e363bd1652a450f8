//! HTTP request header handling.
//!
//! [`RequestHeader`] is what the server side decoder yields, [`RequestHead`] is what the
//! client side encoder consumes.

use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};

/// Type alias for an outgoing request before the body is attached.
pub type RequestHead = Request<()>;

/// Represents a decoded HTTP request header.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl AsMut<Request<()>> for RequestHeader {
    fn as_mut(&mut self) -> &mut Request<()> {
        &mut self.inner
    }
}

impl RequestHeader {
    /// Consumes the header and returns the inner `Request<()>`.
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body to this header, converting it into a full `Request<T>`.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|()| body)
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Determines if this request may carry a body based on its HTTP method.
    ///
    /// Returns false for GET, HEAD, DELETE, OPTIONS and CONNECT.
    pub fn need_body(&self) -> bool {
        !matches!(self.method(), &Method::GET | &Method::HEAD | &Method::DELETE | &Method::OPTIONS | &Method::CONNECT)
    }
}

impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn need_body_by_method() {
        let get = RequestHeader::from(Request::get("/").body(()).unwrap());
        assert!(!get.need_body());

        let head = RequestHeader::from(Request::head("/").body(()).unwrap());
        assert!(!head.need_body());

        let post = RequestHeader::from(Request::post("/upload").body(()).unwrap());
        assert!(post.need_body());

        let patch = RequestHeader::from(Request::patch("/item/1").body(()).unwrap());
        assert!(patch.need_body());
    }

    #[test]
    fn attach_body_keeps_parts() {
        let header = RequestHeader::from(Request::put("/a?b=c").header("x-trace", "1").body(()).unwrap());
        let request = header.body("payload");

        assert_eq!(request.method(), Method::PUT);
        assert_eq!(request.uri().query(), Some("b=c"));
        assert_eq!(request.headers()["x-trace"], "1");
        assert_eq!(*request.body(), "payload");
    }
}
