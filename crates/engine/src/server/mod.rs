//! The HTTP server and the connection ownership protocol.
//!
//! Every accepted connection lives in an arena slot owned by the server. The sink receives a
//! [`Connection`] token for it and gives it back with [`Connection::send_response`] or
//! [`Connection::release_from_handler`]; the I/O task then writes the response, if any,
//! closes the socket and reclaims the slot.

mod arena;
mod connection;
mod dispatch;
mod http_server;
mod sink;

pub use arena::ConnectionId;
pub use arena::ConnectionState;
pub use connection::Connection;
pub use http_server::HttpServer;
pub use http_server::ServerBuilder;
pub use sink::Sink;
