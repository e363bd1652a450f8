//! An embeddable HTTP/1.1 client and server with cancellable asynchronous operations
//!
//! The engine owns its reactor threads: every [`HttpClient`] and [`HttpServer`] runs its own
//! tokio runtime, so it can be embedded in synchronous code. Wire framing comes from the
//! `exchange-http` crate.
//!
//! # Client
//!
//! [`HttpClient::async_get`] and its siblings return at once with an [`OperationHandle`].
//! The completion callback runs exactly once, on a reactor thread, with the resolved
//! [`OperationFuture`]. [`OperationHandle::cancel_operation`] can be called from anywhere at
//! any time; if it wins the race against completion the operation resolves with
//! [`ClientError::OperationAborted`]. Dropping the client cancels everything still pending
//! and waits until every callback ran.
//!
//! ```no_run
//! use exchange_engine::{HttpClient, Request};
//!
//! let client = HttpClient::new().unwrap();
//! let handle = client
//!     .async_get(Request::new().url("http://127.0.0.1:8080/").follow_redirect(true), |future| {
//!         if let Ok(response) = future.get() {
//!             println!("{}", response.status());
//!         }
//!     })
//!     .unwrap();
//! let _ = handle.wait();
//! ```
//!
//! # Server
//!
//! [`HttpServer::set_sink`] registers the target that receives each request together with
//! its [`Connection`]. The sink owns the connection until it responds or releases it, and
//! may hold it for as long as it needs.
//!
//! # Error Handling
//!
//! - [`ClientError`]: what an operation resolves with, or why it could not start
//! - [`ServerError`]: server setup and connection release errors
//!
//! # Limitations
//!
//! - plain `http` only, no TLS
//! - one request per connection, no keep-alive or pooling
//! - no implicit timeouts, cancel operations that take too long

mod client;
mod config;
mod error;
mod message;
mod operation;
mod runtime;
mod server;

pub use client::ClientBuilder;
pub use client::HttpClient;
pub use client::Request;
pub use config::ClientConfig;
pub use config::ServerConfig;
pub use error::ClientError;
pub use error::ServerError;
pub use message::IncomingRequest;
pub use message::Response;
pub use operation::OperationFuture;
pub use operation::OperationHandle;
pub use operation::OperationId;
pub use operation::OperationState;
pub use operation::PendingOperationRegistry;
pub use server::Connection;
pub use server::ConnectionId;
pub use server::ConnectionState;
pub use server::HttpServer;
pub use server::ServerBuilder;
pub use server::Sink;

pub use http::{Method, StatusCode, header};
