//! Redirect following for one operation.
//!
//! Every hop opens a fresh connection but stays inside the same operation, so the caller
//! keeps one handle and gets one callback for the whole chain.

use crate::client::request::{Exchange, check_target};
use crate::error::ClientError;
use crate::message::Response;
use bytes::Bytes;
use http::{Method, StatusCode, Uri, header};
use tracing::debug;

/// Counts the hops of one operation.
#[derive(Debug)]
pub(crate) struct RedirectPolicy {
    max_redirects: usize,
    followed: usize,
}

impl RedirectPolicy {
    pub(crate) fn new(max_redirects: usize) -> Self {
        Self { max_redirects, followed: 0 }
    }

    /// The next hop for `response`, or `None` when the response is final.
    pub(crate) fn next_hop(&mut self, current: &Exchange, response: &Response) -> Result<Option<Exchange>, ClientError> {
        if !current.follow_redirect || !is_redirect(response.status()) {
            return Ok(None);
        }
        let Some(location) = response.headers().get(header::LOCATION) else {
            return Ok(None);
        };

        if self.followed >= self.max_redirects {
            return Err(ClientError::RedirectLoop { max_redirects: self.max_redirects });
        }
        self.followed += 1;

        let location =
            location.to_str().map_err(|e| ClientError::invalid_request(format!("invalid location header: {e}")))?;
        let uri = check_target(resolve_location(&current.uri, location)?)?;
        debug!(hop = self.followed, status = %response.status(), from = %current.uri, to = %uri, "following redirect");

        let mut next = current.clone();
        if current.authority() != uri.authority() {
            next.headers.remove(header::AUTHORIZATION);
            next.headers.remove(header::COOKIE);
        }
        next.uri = uri;

        if switches_to_get(response.status(), &current.method) {
            next.method = Method::GET;
            next.body = Bytes::new();
            next.headers.remove(header::CONTENT_TYPE);
            next.headers.remove(header::CONTENT_LENGTH);
        }
        Ok(Some(next))
    }
}

pub(crate) fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// 303 always continues with GET, 301 and 302 turn a POST into a GET; 307 and 308 keep
/// the method and body.
fn switches_to_get(status: StatusCode, method: &Method) -> bool {
    match status {
        StatusCode::SEE_OTHER => method != Method::HEAD,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND => method == Method::POST,
        _ => false,
    }
}

/// Resolve a `Location` value against the url that produced it.
pub(crate) fn resolve_location(base: &Uri, location: &str) -> Result<Uri, ClientError> {
    let invalid = |e: http::uri::InvalidUri| ClientError::invalid_request(format!("invalid redirect target {location}: {e}"));

    if location.contains("://") {
        return location.parse().map_err(invalid);
    }

    let scheme = base.scheme_str().unwrap_or("http");
    if let Some(rest) = location.strip_prefix("//") {
        return format!("{scheme}://{rest}").parse().map_err(invalid);
    }

    let authority = base.authority().map_or("", |authority| authority.as_str());
    let path = if location.starts_with('/') {
        location.to_owned()
    } else if location.starts_with('?') {
        format!("{}{location}", base.path())
    } else {
        let directory = base.path().rsplit_once('/').map_or("", |(directory, _)| directory);
        format!("{directory}/{location}")
    };
    format!("{scheme}://{authority}{path}").parse().map_err(invalid)
}
