//! Error types of the engine.
//!
//! [`ClientError`] is what an operation resolves with, so it is `Clone`: the same terminal
//! outcome may be observed by the completion callback and by any number of handles.
//! Sources that are not `Clone` themselves are shared behind an [`Arc`].
//!
//! [`ServerError`] covers synchronous server setup and the connection release protocol.

use crate::server::ConnectionId;
use exchange_http::protocol::{HttpError, ParseError, SendError};
use std::io;
use std::io::ErrorKind;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The request could not be turned into an exchange, nothing was sent.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The operation was cancelled before it completed.
    #[error("operation aborted")]
    OperationAborted,

    /// The client is shutting down and refuses new operations.
    #[error("client is shutting down")]
    ShuttingDown,

    #[error("too many redirects, the limit is {max_redirects}")]
    RedirectLoop { max_redirects: usize },

    /// The peer closed the connection before a complete response arrived.
    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("io error: {source}")]
    Io { source: Arc<io::Error> },

    /// The peer sent something that is not HTTP/1.1, or the request could not be encoded.
    #[error("protocol error: {source}")]
    Protocol { source: Arc<HttpError> },

    /// The reactor threads of the client could not be started.
    #[error("failed to start the client runtime: {source}")]
    Runtime { source: Arc<io::Error> },
}

impl ClientError {
    pub fn invalid_request<S: ToString>(str: S) -> Self {
        Self::InvalidRequest { reason: str.to_string() }
    }

    pub fn runtime(e: io::Error) -> Self {
        Self::Runtime { source: Arc::new(e) }
    }

    /// Returns true if this error is the result of a cancellation.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::OperationAborted)
    }
}

impl From<io::Error> for ClientError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof => {
                Self::ConnectionReset
            }
            _ => Self::Io { source: Arc::new(e) },
        }
    }
}

impl From<ParseError> for ClientError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Io { source } => source.into(),
            ParseError::UnexpectedEof => Self::ConnectionReset,
            e => Self::Protocol { source: Arc::new(e.into()) },
        }
    }
}

impl From<SendError> for ClientError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::Io { source } => source.into(),
            e => Self::Protocol { source: Arc::new(e.into()) },
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    /// The address could not be resolved or bound.
    #[error("failed to bind {address}: {source}")]
    Bind { address: String, source: io::Error },

    /// A bound socket could not be handed to the reactor, or the reactor could not start.
    #[error("failed to listen: {source}")]
    Listen {
        #[from]
        source: io::Error,
    },

    /// The server was stopped and can not listen again.
    #[error("server is stopped")]
    Stopped,

    /// The connection id does not name a live connection, its slot was already reclaimed.
    #[error("stale connection {id}")]
    StaleConnection { id: ConnectionId },

    /// The connection is live but was already released, or already has a response queued.
    #[error("connection {id} already released")]
    AlreadyReleased { id: ConnectionId },
}

impl ServerError {
    pub fn bind<S: ToString>(address: S, source: io::Error) -> Self {
        Self::Bind { address: address.to_string(), source }
    }

    pub fn stale(id: ConnectionId) -> Self {
        Self::StaleConnection { id }
    }

    pub fn already_released(id: ConnectionId) -> Self {
        Self::AlreadyReleased { id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_like_io_errors_become_connection_reset() {
        let error = ClientError::from(io::Error::from(ErrorKind::ConnectionReset));
        assert!(matches!(error, ClientError::ConnectionReset));

        let error = ClientError::from(ParseError::UnexpectedEof);
        assert!(matches!(error, ClientError::ConnectionReset));

        let error = ClientError::from(ParseError::io(io::Error::from(ErrorKind::BrokenPipe)));
        assert!(matches!(error, ClientError::ConnectionReset));
    }

    #[test]
    fn other_errors_keep_their_source() {
        let error = ClientError::from(io::Error::from(ErrorKind::ConnectionRefused));
        assert!(matches!(error, ClientError::Io { ref source } if source.kind() == ErrorKind::ConnectionRefused));

        let error = ClientError::from(ParseError::invalid_header("bad"));
        assert!(matches!(error, ClientError::Protocol { .. }));
        assert!(error.to_string().contains("bad"));
    }

    #[test]
    fn only_cancellation_is_aborted() {
        assert!(ClientError::OperationAborted.is_aborted());
        assert!(!ClientError::ConnectionReset.is_aborted());
        assert!(!ClientError::ShuttingDown.is_aborted());
    }
}
