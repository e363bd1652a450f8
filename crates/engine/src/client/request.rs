use crate::error::ClientError;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{HeaderMap, Method, Uri};

/// A request template.
///
/// Built fluently and moved into the client when an operation starts. Cloning is cheap,
/// so one template can seed many concurrent operations.
///
/// ```
/// use exchange_engine::Request;
///
/// let request = Request::new()
///     .url("http://127.0.0.1:8080/api")
///     .join_url_path("users", false)
///     .join_url_path("a b", true)
///     .header("accept", "application/json")
///     .follow_redirect(true);
///
/// assert_eq!(request.target().unwrap(), "http://127.0.0.1:8080/api/users/a%20b");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Request {
    url: Option<String>,
    segments: Vec<String>,
    headers: HeaderMap,
    header_error: Option<String>,
    follow_redirect: bool,
    method: Option<Method>,
    body: Bytes,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Append a path segment to the url, percent encoding it when `escape` is set.
    pub fn join_url_path(mut self, segment: impl AsRef<str>, escape: bool) -> Self {
        let segment = segment.as_ref();
        let segment = if escape { percent_encode(segment) } else { segment.trim_matches('/').to_owned() };
        self.segments.push(segment);
        self
    }

    /// Append a header. An invalid name or value makes the request fail with
    /// `InvalidRequest` when it is started.
    pub fn header<K, V>(mut self, key: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let name: Result<HeaderName, http::Error> = HeaderName::try_from(key).map_err(Into::into);
        let value: Result<HeaderValue, http::Error> = HeaderValue::try_from(value).map_err(Into::into);
        match (name, value) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            (Err(e), _) | (_, Err(e)) => {
                self.header_error.get_or_insert_with(|| e.to_string());
            }
        }
        self
    }

    pub fn follow_redirect(mut self, follow: bool) -> Self {
        self.follow_redirect = follow;
        self
    }

    /// The method used by `async_request`; the `async_<verb>` calls override it.
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_follow_redirect(&self) -> bool {
        self.follow_redirect
    }

    pub(crate) fn method_or_get(&self) -> Method {
        self.method.clone().unwrap_or(Method::GET)
    }

    /// The absolute target url, with the joined path segments.
    pub fn target(&self) -> Result<Uri, ClientError> {
        let url = self.url.as_deref().ok_or_else(|| ClientError::invalid_request("url is not set"))?;
        let uri: Uri = url.parse().map_err(|e| ClientError::invalid_request(format!("invalid url {url}: {e}")))?;
        let uri = check_target(uri)?;
        if self.segments.is_empty() {
            return Ok(uri);
        }

        let mut path = uri.path().trim_end_matches('/').to_owned();
        for segment in &self.segments {
            path.push('/');
            path.push_str(segment);
        }
        if let Some(query) = uri.query() {
            path.push('?');
            path.push_str(query);
        }

        let mut parts = uri.into_parts();
        parts.path_and_query =
            Some(PathAndQuery::try_from(path).map_err(|e| ClientError::invalid_request(format!("invalid path: {e}")))?);
        Uri::from_parts(parts).map_err(|e| ClientError::invalid_request(format!("invalid url: {e}")))
    }

    /// Validate the template and turn it into the first hop of an operation.
    pub(crate) fn prepare(self, method: Method) -> Result<Exchange, ClientError> {
        if let Some(reason) = &self.header_error {
            return Err(ClientError::invalid_request(format!("invalid header: {reason}")));
        }
        let uri = self.target()?;
        Ok(Exchange { method, uri, headers: self.headers, body: self.body, follow_redirect: self.follow_redirect })
    }
}

/// One physical exchange: the request sent over a fresh connection.
#[derive(Debug, Clone)]
pub(crate) struct Exchange {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) follow_redirect: bool,
}

impl Exchange {
    pub(crate) fn authority(&self) -> Option<&Authority> {
        self.uri.authority()
    }

    /// The host to connect to, IPv6 literals without their brackets.
    pub(crate) fn host(&self) -> &str {
        let host = self.uri.host().unwrap_or_default();
        host.strip_prefix('[').and_then(|host| host.strip_suffix(']')).unwrap_or(host)
    }

    pub(crate) fn port(&self) -> u16 {
        self.uri.port_u16().unwrap_or(80)
    }
}

/// Only absolute `http` urls can be exchanged.
pub(crate) fn check_target(uri: Uri) -> Result<Uri, ClientError> {
    match uri.scheme() {
        Some(scheme) if *scheme == Scheme::HTTP => {}
        Some(scheme) => return Err(ClientError::invalid_request(format!("unsupported scheme {scheme}"))),
        None => return Err(ClientError::invalid_request(format!("url {uri} is not absolute"))),
    }
    if uri.host().is_none_or(str::is_empty) {
        return Err(ClientError::invalid_request(format!("url {uri} has no host")));
    }
    Ok(uri)
}

/// Percent encode everything but the unreserved characters of RFC 3986.
fn percent_encode(segment: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";

    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            encoded.push(char::from(byte));
        } else {
            encoded.push('%');
            encoded.push(char::from(HEX[usize::from(byte >> 4)]));
            encoded.push(char::from(HEX[usize::from(byte & 0x0f)]));
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_segments() {
        assert_eq!(percent_encode("plain-name_1.txt~"), "plain-name_1.txt~");
        assert_eq!(percent_encode("a b/c?d"), "a%20b%2Fc%3Fd");
        assert_eq!(percent_encode("é"), "%C3%A9");
    }

    #[test]
    fn join_keeps_query() {
        let request = Request::new().url("http://example.com/base/?q=1").join_url_path("/items/", false).join_url_path("x y", true);
        assert_eq!(request.target().unwrap(), "http://example.com/base/items/x%20y?q=1");
    }

    #[test]
    fn join_onto_bare_host() {
        let request = Request::new().url("http://localhost:8080").join_url_path("status", false);
        assert_eq!(request.target().unwrap(), "http://localhost:8080/status");
    }

    #[test]
    fn missing_url_is_invalid() {
        let result = Request::new().prepare(Method::GET);
        assert!(matches!(result, Err(ClientError::InvalidRequest { .. })));
    }

    #[test]
    fn unparseable_or_relative_urls_are_invalid() {
        for url in ["not a url", "/relative/path", "https://example.com/", "ftp://example.com/"] {
            let result = Request::new().url(url).prepare(Method::GET);
            assert!(matches!(result, Err(ClientError::InvalidRequest { .. })), "{url}");
        }
    }

    #[test]
    fn invalid_header_is_reported_on_prepare() {
        let request = Request::new().url("http://localhost/").header("bad header", "v");
        let result = request.prepare(Method::GET);
        assert!(matches!(result, Err(ClientError::InvalidRequest { ref reason }) if reason.contains("header")));
    }

    #[test]
    fn prepare_carries_everything() {
        let exchange = Request::new()
            .url("http://localhost:9000/upload")
            .header("x-a", "1")
            .header("x-a", "2")
            .body("payload")
            .follow_redirect(true)
            .prepare(Method::PUT)
            .unwrap();

        assert_eq!(exchange.method, Method::PUT);
        assert_eq!(exchange.host(), "localhost");
        assert_eq!(exchange.port(), 9000);
        assert_eq!(exchange.headers.get_all("x-a").iter().count(), 2);
        assert_eq!(exchange.body, Bytes::from_static(b"payload"));
        assert!(exchange.follow_redirect);
    }

    #[test]
    fn ipv6_host_is_connectable() {
        let exchange = Request::new().url("http://[::1]:8080/").prepare(Method::GET).unwrap();

        assert_eq!(exchange.host(), "::1");
        assert_eq!(exchange.port(), 8080);
        assert_eq!(exchange.authority().unwrap().as_str(), "[::1]:8080");
    }

    #[test]
    fn templates_are_reusable() {
        let template = Request::new().url("http://localhost/").method(Method::DELETE);
        let first = template.clone().join_url_path("1", false);
        let second = template.join_url_path("2", false);

        assert_eq!(first.target().unwrap().path(), "/1");
        assert_eq!(second.target().unwrap().path(), "/2");
        assert_eq!(second.method_or_get(), Method::DELETE);
    }
}
