//! Fetch a url with redirects followed, cancelling when it takes too long.
//!
//! ```sh
//! cargo run -p exchange-engine --example fetch -- http://127.0.0.1:8080/hello/world
//! ```

use exchange_engine::{ClientError, HttpClient, OperationFuture, Request};
use std::time::Duration;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let url = std::env::args().nth(1).unwrap_or_else(|| "http://127.0.0.1:8080/hello/world".to_owned());
    let client = match HttpClient::new() {
        Ok(client) => client,
        Err(e) => {
            error!(cause = %e, "failed to start client");
            return;
        }
    };

    let request = Request::new().url(url).follow_redirect(true);
    let handle = match client.async_get(request, |future: OperationFuture| info!(state = ?future.state(), "operation finished")) {
        Ok(handle) => handle,
        Err(e) => {
            error!(cause = %e, "invalid request");
            return;
        }
    };

    // cancelling a finished operation does nothing, so the timer is never joined
    {
        let handle = handle.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(3));
            handle.cancel_operation();
        });
    }

    match handle.wait() {
        Ok(response) => {
            info!(status = %response.status(), "received response");
            for (name, value) in response.headers() {
                info!(%name, value = ?value, "header");
            }
            println!("{}", String::from_utf8_lossy(response.body()));
        }
        Err(ClientError::OperationAborted) => error!("request took too long, cancelled"),
        Err(e) => error!(cause = %e, "request failed"),
    }
}
