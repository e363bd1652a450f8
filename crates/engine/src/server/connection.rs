use crate::error::ServerError;
use crate::message::Response;
use crate::server::arena::{ConnectionArena, ConnectionId, ConnectionState};
use std::mem;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Ownership of one dispatched server connection.
///
/// The sink receives a `Connection` for every request and owns it until it either sends a
/// response or releases it. Both consume the value, so a released connection can not be
/// touched again. A `Connection` may be stored and finished later from any thread.
///
/// Dropping an unreleased connection releases it without a response.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    arena: Arc<ConnectionArena>,
    response: Response,
    released: bool,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, arena: Arc<ConnectionArena>) -> Self {
        Self { id, arena, response: Response::default(), released: false }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.arena.peer_addr(self.id)
    }

    pub fn state(&self) -> ConnectionState {
        self.arena.state(self.id)
    }

    /// Returns true if the peer hung up, or the server already took the connection back.
    pub fn is_closed(&self) -> bool {
        self.arena.is_peer_closed(self.id)
    }

    /// The response that `send_response` will write, `200 OK` with an empty body until changed.
    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Write the populated response, then give the connection back to the server.
    pub fn send_response(mut self) -> Result<(), ServerError> {
        self.released = true;
        let response = mem::take(&mut self.response);
        self.arena.respond(self.id, response)
    }

    /// Give the connection back to the server without responding, the socket is closed.
    pub fn release_from_handler(mut self) -> Result<(), ServerError> {
        self.released = true;
        self.arena.release(self.id)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.arena.release(self.id) {
            Ok(()) => warn!(connection = %self.id, "connection dropped without release, releasing it"),
            Err(e) => debug!(connection = %self.id, cause = %e, "dropped connection was already taken back"),
        }
    }
}
