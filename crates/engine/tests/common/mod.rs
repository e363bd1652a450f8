#![allow(dead_code, reason = "each test binary uses a different part of the helpers")]

use exchange_engine::{ClientError, Connection, HttpServer, IncomingRequest, OperationFuture, Response};
use std::net::SocketAddr;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::Level;

pub const TIMEOUT: Duration = Duration::from_secs(10);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_max_level(Level::DEBUG).with_test_writer().try_init();
}

/// Poll `condition` until it holds, panics after [`TIMEOUT`].
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

/// Connections the sink kept without answering, plus a count of every request seen.
#[derive(Default)]
pub struct Held {
    connections: Mutex<Vec<Connection>>,
    requests: Mutex<Vec<String>>,
}

impl Held {
    pub fn len(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn take(&self) -> Vec<Connection> {
        std::mem::take(&mut *self.connections.lock().unwrap())
    }

    pub fn all_closed(&self) -> bool {
        self.connections.lock().unwrap().iter().all(Connection::is_closed)
    }
}

/// A server whose sink keeps every connection without answering.
pub fn holding_server() -> (HttpServer, SocketAddr, Arc<Held>) {
    init_tracing();
    let held = Arc::new(Held::default());
    let server = HttpServer::new();
    {
        let held = Arc::clone(&held);
        server.set_sink(move |connection: Connection, request: IncomingRequest| {
            held.requests.lock().unwrap().push(request.path().to_owned());
            held.connections.lock().unwrap().push(connection);
        });
    }
    let address = server.bind("127.0.0.1", 0).unwrap();
    (server, address, held)
}

/// A server answering every request with `respond`.
pub fn answering_server<F>(respond: F) -> (HttpServer, SocketAddr, Arc<Held>)
where
    F: Fn(&IncomingRequest, &mut Response) + Send + Sync + 'static,
{
    init_tracing();
    let held = Arc::new(Held::default());
    let server = HttpServer::new();
    {
        let held = Arc::clone(&held);
        server.set_sink(move |mut connection: Connection, request: IncomingRequest| {
            held.requests.lock().unwrap().push(request.path().to_owned());
            respond(&request, connection.response_mut());
            connection.send_response().unwrap();
        });
    }
    let address = server.bind("127.0.0.1", 0).unwrap();
    (server, address, held)
}

pub fn url(address: SocketAddr, path: &str) -> String {
    format!("http://{address}{path}")
}

/// A completion callback reporting outcomes on a channel.
pub fn outcome_channel() -> (Sender<Result<Response, ClientError>>, Receiver<Result<Response, ClientError>>) {
    mpsc::channel()
}

pub fn report(sender: &Sender<Result<Response, ClientError>>) -> impl FnOnce(OperationFuture) + Send + 'static {
    let sender = sender.clone();
    move |future: OperationFuture| {
        let _ = sender.send(future.get());
    }
}
