mod common;

use common::{TIMEOUT, answering_server, holding_server, init_tracing, url, wait_until};
use exchange_engine::{
    ClientError, Connection, ConnectionId, ConnectionState, HttpClient, HttpServer, IncomingRequest, OperationState, Request,
    ServerError, StatusCode, header,
};
use std::collections::HashSet;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn post_body_is_echoed() {
    let (_server, address, held) = answering_server(|request, response| {
        response.set_status(StatusCode::CREATED).set_body(request.body().clone());
        if let Some(kind) = request.headers().get(header::CONTENT_TYPE) {
            response.headers_mut().insert(header::CONTENT_TYPE, kind.clone());
        }
    });
    let client = HttpClient::new().unwrap();

    let request = Request::new()
        .url(url(address, ""))
        .join_url_path("items", false)
        .join_url_path("a b", true)
        .header(header::CONTENT_TYPE, "text/plain")
        .body("some payload");
    let handle = client.async_post(request, |_| {}).unwrap();

    let response = handle.wait().unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.body().as_ref(), b"some payload");
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    assert_eq!(held.paths(), ["/items/a%20b"]);
}

#[test]
fn head_response_has_no_body() {
    let (_server, address, _held) = answering_server(|_request, response| {
        response.set_body("only for GET");
    });
    let client = HttpClient::new().unwrap();

    let handle = client.async_head(Request::new().url(url(address, "/resource")), |_| {}).unwrap();

    let response = handle.wait().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "12");
    assert!(response.body().is_empty());
}

#[test]
fn request_released_without_response_is_reset() {
    let (_server, address, held) = holding_server();
    let client = HttpClient::new().unwrap();

    let handle = client.async_get(Request::new().url(url(address, "/")), |_| {}).unwrap();
    wait_until("the sink to hold the connection", || held.len() == 1);

    let connection = held.take().pop().unwrap();
    assert_eq!(connection.state(), ConnectionState::Dispatched);
    connection.release_from_handler().unwrap();

    let outcome = handle.wait();
    assert!(matches!(outcome, Err(ClientError::ConnectionReset)), "{outcome:?}");
    assert_eq!(handle.state(), OperationState::Failed);
}

#[test]
fn release_by_id_then_by_connection() {
    let (server, address, held) = holding_server();
    let client = HttpClient::new().unwrap();

    let handle = client.async_get(Request::new().url(url(address, "/")), |_| {}).unwrap();
    wait_until("the sink to hold the connection", || held.len() == 1);

    let connection = held.take().pop().unwrap();
    let id = connection.id();
    server.release(id).unwrap();

    assert!(matches!(server.release(id), Err(ServerError::AlreadyReleased { .. })));
    assert!(matches!(connection.send_response(), Err(ServerError::AlreadyReleased { .. } | ServerError::StaleConnection { .. })));
    assert!(matches!(handle.wait(), Err(ClientError::ConnectionReset)));

    wait_until("the connection slot to be reclaimed", || server.connection_state(id) == ConnectionState::Released);
    assert!(matches!(server.release(id), Err(ServerError::StaleConnection { .. })));
}

#[test]
fn stop_takes_back_held_connections() {
    let (server, address, held) = holding_server();
    let client = HttpClient::new().unwrap();

    let handles: Vec<_> =
        (0..3).map(|_| client.async_get(Request::new().url(url(address, "/")), |_| {}).unwrap()).collect();
    wait_until("the sink to hold every connection", || held.len() == 3);

    server.stop();
    assert_eq!(server.connection_count(), 0);

    for handle in &handles {
        assert!(matches!(handle.wait(), Err(ClientError::ConnectionReset)));
    }
    for connection in held.take() {
        assert!(connection.is_closed());
        assert!(matches!(connection.send_response(), Err(ServerError::StaleConnection { .. })));
    }
}

#[test]
fn panicking_sink_does_not_take_the_server_down() {
    init_tracing();
    let panicked = AtomicBool::new(false);
    let server = HttpServer::new();
    server.set_sink(move |mut connection: Connection, _request: IncomingRequest| {
        assert!(panicked.swap(true, Ordering::SeqCst), "first request fails");
        connection.response_mut().set_body("recovered");
        connection.send_response().unwrap();
    });
    let address = server.bind("127.0.0.1", 0).unwrap();
    let client = HttpClient::new().unwrap();

    let first = client.async_get(Request::new().url(url(address, "/")), |_| {}).unwrap();
    assert!(matches!(first.wait(), Err(ClientError::ConnectionReset)));

    let second = client.async_get(Request::new().url(url(address, "/")), |_| {}).unwrap();
    assert_eq!(second.wait().unwrap().body().as_ref(), b"recovered");
}

#[test]
fn panicking_sink_that_stored_its_connection_is_released() {
    init_tracing();
    let stored = Arc::new(Mutex::new(Vec::new()));
    let server = HttpServer::new();
    {
        let stored = Arc::clone(&stored);
        server.set_sink(move |connection: Connection, _request: IncomingRequest| {
            stored.lock().unwrap().push(connection);
            panic!("sink failed after storing the connection");
        });
    }
    let address = server.bind("127.0.0.1", 0).unwrap();
    let client = HttpClient::new().unwrap();

    let handle = client.async_get(Request::new().url(url(address, "/")), |_| {}).unwrap();

    assert!(matches!(handle.wait(), Err(ClientError::ConnectionReset)));
    wait_until("the connection to be closed", || server.connection_count() == 0);

    let connection = stored.lock().unwrap().pop().unwrap();
    assert_eq!(connection.state(), ConnectionState::Released);
    assert!(matches!(connection.send_response(), Err(ServerError::StaleConnection { .. })));
}

#[test]
fn ipv6_literal_urls_connect() {
    init_tracing();
    let server = HttpServer::new();
    server.set_sink(|mut connection: Connection, request: IncomingRequest| {
        connection.response_mut().set_body(request.peer_addr().ip().to_string());
        connection.send_response().unwrap();
    });
    let address = server.bind("::1", 0).unwrap();
    assert!(address.is_ipv6());
    let client = HttpClient::new().unwrap();

    let handle = client.async_get(Request::new().url(format!("http://[::1]:{}/", address.port())), |_| {}).unwrap();

    assert_eq!(handle.wait().unwrap().body().as_ref(), b"::1");
}

#[test]
fn sink_is_dispatched_concurrently_once_per_connection() {
    const REQUESTS: usize = 8;

    init_tracing();
    let in_sink = Arc::new(AtomicUsize::new(0));
    let max_in_sink = Arc::new(AtomicUsize::new(0));
    let held = Arc::new(Mutex::new(Vec::new()));

    // each dispatch lingers until another one is running next to it, bounded so a
    // scheduling hiccup can't hang the test
    let server = HttpServer::builder().worker_threads(4).build();
    {
        let (in_sink, max_in_sink, held) = (Arc::clone(&in_sink), Arc::clone(&max_in_sink), Arc::clone(&held));
        server.set_sink(move |connection: Connection, _request: IncomingRequest| {
            let now = in_sink.fetch_add(1, Ordering::SeqCst) + 1;
            max_in_sink.fetch_max(now, Ordering::SeqCst);
            let deadline = Instant::now() + Duration::from_secs(2);
            while max_in_sink.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }
            in_sink.fetch_sub(1, Ordering::SeqCst);
            held.lock().unwrap().push(connection);
        });
    }
    let address = server.bind("127.0.0.1", 0).unwrap();
    let client = HttpClient::new().unwrap();

    let handles: Vec<_> =
        (0..REQUESTS).map(|_| client.async_get(Request::new().url(url(address, "/")), |_| {}).unwrap()).collect();
    wait_until("every connection to reach the sink", || held.lock().unwrap().len() == REQUESTS);

    assert!(max_in_sink.load(Ordering::SeqCst) >= 2, "the sink never ran concurrently");
    let ids: HashSet<ConnectionId> = held.lock().unwrap().iter().map(Connection::id).collect();
    assert_eq!(ids.len(), REQUESTS);
    assert_eq!(server.connection_count(), REQUESTS);

    for mut connection in std::mem::take(&mut *held.lock().unwrap()) {
        connection.response_mut().set_status(StatusCode::NO_CONTENT);
        connection.send_response().unwrap();
    }
    for handle in &handles {
        assert_eq!(handle.wait().unwrap().status(), StatusCode::NO_CONTENT);
    }
    wait_until("every connection to be closed", || server.connection_count() == 0);
}

#[test]
fn request_without_sink_is_dropped() {
    init_tracing();
    let server = HttpServer::new();
    let address = server.bind("127.0.0.1", 0).unwrap();
    let client = HttpClient::new().unwrap();

    let handle = client.async_get(Request::new().url(url(address, "/")), |_| {}).unwrap();

    assert!(matches!(handle.wait(), Err(ClientError::ConnectionReset)));
    wait_until("the connection to be closed", || server.connection_count() == 0);
}

#[test]
fn sink_can_be_replaced() {
    let (server, address, _held) = answering_server(|_request, response| {
        response.set_body("first");
    });
    let client = HttpClient::new().unwrap();
    assert_eq!(client.async_get(Request::new().url(url(address, "/")), |_| {}).unwrap().wait().unwrap().body().as_ref(), b"first");

    server.set_sink(|mut connection: Connection, _request: IncomingRequest| {
        connection.response_mut().set_body("second");
        connection.send_response().unwrap();
    });
    assert_eq!(client.async_get(Request::new().url(url(address, "/")), |_| {}).unwrap().wait().unwrap().body().as_ref(), b"second");
}

#[test]
fn sink_may_answer_from_another_thread() {
    init_tracing();
    let (sender, receiver) = mpsc::channel::<Connection>();
    let worker = thread::spawn(move || {
        for mut connection in receiver {
            connection.response_mut().set_status(StatusCode::ACCEPTED);
            connection.send_response().unwrap();
        }
    });

    let server = HttpServer::new();
    let sender = Mutex::new(sender);
    server.set_sink(move |connection: Connection, _request: IncomingRequest| {
        sender.lock().unwrap().send(connection).unwrap();
    });
    let address = server.bind("127.0.0.1", 0).unwrap();
    let client = HttpClient::new().unwrap();

    let handle = client.async_delete(Request::new().url(url(address, "/jobs/7")), |_| {}).unwrap();
    assert_eq!(handle.wait().unwrap().status(), StatusCode::ACCEPTED);

    drop(server);
    worker.join().unwrap();
}

#[test]
fn oversized_body_is_rejected() {
    init_tracing();
    let server = HttpServer::builder()
        .max_body_size(16)
        .sink(|connection: Connection, _request: IncomingRequest| {
            connection.send_response().unwrap();
        })
        .build();
    let address = server.bind("127.0.0.1", 0).unwrap();
    let client = HttpClient::new().unwrap();

    let handle = client.async_put(Request::new().url(url(address, "/")).body(vec![b'x'; 64]), |_| {}).unwrap();

    match handle.wait() {
        Ok(response) => assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE),
        // the server may close before the whole body was written
        Err(e) => assert!(matches!(e, ClientError::ConnectionReset), "{e:?}"),
    }
}

#[test]
fn bind_conflict_is_reported() {
    init_tracing();
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    let server = HttpServer::new();

    let result = server.bind("127.0.0.1", port);

    assert!(matches!(result, Err(ServerError::Bind { .. })), "{result:?}");
    assert!(server.local_addrs().is_empty());
}

#[test]
fn unreachable_server_fails_the_operation() {
    init_tracing();
    let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let client = HttpClient::new().unwrap();

    let handle = client.async_get(Request::new().url(format!("http://127.0.0.1:{port}/")), |_| {}).unwrap();

    let outcome = handle.wait();
    assert!(outcome.is_err());
    assert!(!outcome.unwrap_err().is_aborted());
    assert_eq!(handle.state(), OperationState::Failed);
}

#[test]
fn operations_wait_with_timeout_free_channel() {
    let (_server, address, _held) = answering_server(|request, response| {
        response.set_body(request.method().as_str().to_owned());
    });
    let client = HttpClient::new().unwrap();
    let (sender, receiver) = mpsc::channel();

    for method in [exchange_engine::Method::GET, exchange_engine::Method::PATCH, exchange_engine::Method::PUT] {
        let sender = sender.clone();
        client
            .async_send(Request::new().url(url(address, "/")).method(method), move |future| {
                let _ = sender.send(future.get().map(|response| response.into_body()));
            })
            .unwrap();
    }
    drop(sender);

    let mut bodies: Vec<_> = (0..3).map(|_| receiver.recv_timeout(TIMEOUT).unwrap().unwrap()).collect();
    bodies.sort();
    assert_eq!(bodies, ["GET", "PATCH", "PUT"]);
}
