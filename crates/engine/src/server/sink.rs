use crate::message::IncomingRequest;
use crate::server::connection::Connection;

/// The dispatch target of a server.
///
/// `dispatch` runs on a reactor thread, once per received request, possibly for several
/// connections at the same time. It should return quickly: finish the connection right away,
/// or store it and finish it later from anywhere.
///
/// Any `Fn(Connection, IncomingRequest)` closure is a sink.
#[cfg_attr(test, mockall::automock)]
pub trait Sink: Send + Sync {
    fn dispatch(&self, connection: Connection, request: IncomingRequest);
}

impl<F> Sink for F
where
    F: Fn(Connection, IncomingRequest) + Send + Sync,
{
    fn dispatch(&self, connection: Connection, request: IncomingRequest) {
        self(connection, request);
    }
}
