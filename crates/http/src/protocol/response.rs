//! HTTP response header handling.
//!
//! [`ResponseHead`] is what the server side encoder consumes, [`ResponseHeader`] is what
//! the client side decoder yields.

use http::response::Parts;
use http::{HeaderMap, Method, Response, StatusCode, Version};

/// Type alias for HTTP response headers before the body is attached.
pub type ResponseHead = Response<()>;

/// Represents a decoded HTTP response header.
#[derive(Debug)]
pub struct ResponseHeader {
    inner: Response<()>,
}

impl ResponseHeader {
    pub fn into_inner(self) -> Response<()> {
        self.inner
    }

    pub fn into_parts(self) -> Parts {
        self.inner.into_parts().0
    }

    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Whether a response to a request with `request_method` carries a body at all.
    ///
    /// Responses to HEAD, informational responses, 204 and 304 never have one
    /// regardless of their framing headers.
    pub fn has_body(&self, request_method: &Method) -> bool {
        let status = self.status();
        !(request_method == Method::HEAD
            || status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED)
    }
}

impl From<Response<()>> for ResponseHeader {
    #[inline]
    fn from(inner: Response<()>) -> Self {
        Self { inner }
    }
}
