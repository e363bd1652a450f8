//! A server answering `/hello/<name>`, with `/slow` answered from a worker thread.
//!
//! ```sh
//! cargo run -p exchange-engine --example hello_server
//! curl -v http://127.0.0.1:8080/hello/world
//! curl -v http://127.0.0.1:8080/slow
//! ```

use exchange_engine::{Connection, HttpServer, IncomingRequest, StatusCode, header};
use std::io::BufRead;
use std::sync::Mutex;
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let (slow_sender, slow_receiver) = mpsc::channel::<Connection>();
    let worker = thread::spawn(move || {
        for mut connection in slow_receiver {
            thread::sleep(Duration::from_secs(1));
            if connection.is_closed() {
                info!(connection = %connection.id(), "peer went away, releasing");
                let _ = connection.release_from_handler();
                continue;
            }
            connection.response_mut().set_body("finally\r\n");
            if let Err(e) = connection.send_response() {
                error!(cause = %e, "failed to answer slow request");
            }
        }
    });

    let slow_sender = Mutex::new(slow_sender);
    let server = HttpServer::builder()
        .worker_threads(2)
        .sink(move |connection: Connection, request: IncomingRequest| route(&slow_sender, connection, request))
        .build();

    let address = match server.bind("127.0.0.1", 8080) {
        Ok(address) => address,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };
    info!(%address, "press enter to stop");

    let _ = std::io::stdin().lock().lines().next();
    server.stop();
    drop(server);
    let _ = worker.join();
}

fn route(slow: &Mutex<Sender<Connection>>, mut connection: Connection, request: IncomingRequest) {
    if request.path() == "/slow" {
        if let Ok(slow) = slow.lock() {
            let _ = slow.send(connection);
        }
        return;
    }

    let response = connection.response_mut();
    match request.path().strip_prefix("/hello/") {
        Some(name) => {
            response.headers_mut().insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/plain"));
            response.set_body(format!("hello {name}, from {}\r\n", request.peer_addr()));
        }
        None => {
            response.set_status(StatusCode::NOT_FOUND).set_body("404 not found\r\n");
        }
    }
    if let Err(e) = connection.send_response() {
        error!(cause = %e, "failed to answer");
    }
}
