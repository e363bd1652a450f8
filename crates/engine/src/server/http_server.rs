use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::runtime::build_runtime;
use crate::server::arena::{ConnectionArena, ConnectionId, ConnectionState};
use crate::server::dispatch::serve_connection;
use crate::server::sink::Sink;
use arc_swap::ArcSwapOption;
use std::net::{SocketAddr, TcpListener as StdTcpListener, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::TcpListener;
use tokio::runtime::{Handle, Runtime};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// Builder for [`HttpServer`].
#[derive(Default)]
pub struct ServerBuilder {
    config: ServerConfig,
    sink: Option<Box<dyn Sink>>,
}

impl ServerBuilder {
    fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn worker_threads(mut self, worker_threads: usize) -> Self {
        self.config.worker_threads = worker_threads;
        self
    }

    pub fn max_body_size(mut self, max_body_size: usize) -> Self {
        self.config.max_body_size = max_body_size;
        self
    }

    pub fn sink(mut self, sink: impl Sink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn build(self) -> HttpServer {
        let server = HttpServer::with_config(self.config);
        if let Some(sink) = self.sink {
            server.shared.sink.store(Some(Arc::new(sink)));
        }
        server
    }
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder").field("config", &self.config).field("sink", &self.sink.is_some()).finish()
    }
}

/// An HTTP/1.1 server handing every received request to a [`Sink`].
///
/// The server owns its reactor threads, created by [`HttpServer::start`] or by the first
/// [`HttpServer::bind`]. Each connection stays owned by the server until the sink gives it
/// back, see [`Connection`](crate::Connection).
///
/// [`HttpServer::stop`] takes back connections the sink still holds: they are closed without
/// a response, and finishing them afterwards fails with a release error. Dropping the
/// server stops it.
///
/// ```no_run
/// use exchange_engine::HttpServer;
///
/// let server = HttpServer::new();
/// server.set_sink(|mut connection: exchange_engine::Connection, request: exchange_engine::IncomingRequest| {
///     connection.response_mut().set_body(format!("hello {}", request.path()));
///     let _ = connection.send_response();
/// });
/// let address = server.bind("127.0.0.1", 8080).unwrap();
/// println!("listening on {address}");
/// ```
pub struct HttpServer {
    shared: Arc<ServerShared>,
    runtime: Mutex<Option<Runtime>>,
    listeners: Mutex<Vec<Listener>>,
    stopped: AtomicBool,
}

pub(crate) struct ServerShared {
    pub(crate) config: ServerConfig,
    pub(crate) sink: ArcSwapOption<Box<dyn Sink>>,
    pub(crate) arena: Arc<ConnectionArena>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) tracker: TaskTracker,
}

#[derive(Debug)]
struct Listener {
    local_addr: SocketAddr,
    cancel: CancellationToken,
}

impl HttpServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let shared = ServerShared {
            config,
            sink: ArcSwapOption::empty(),
            arena: Arc::new(ConnectionArena::new()),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        };
        Self {
            shared: Arc::new(shared),
            runtime: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Register the dispatch target, replacing the previous one.
    ///
    /// Requests received while no sink is set are logged and their connection is dropped.
    pub fn set_sink(&self, sink: impl Sink + 'static) {
        self.shared.sink.store(Some(Arc::new(Box::new(sink))));
    }

    /// Start the reactor threads. Calling it again does nothing.
    pub fn start(&self) -> Result<(), ServerError> {
        self.handle().map(drop)
    }

    fn handle(&self) -> Result<Handle, ServerError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(ServerError::Stopped);
        }

        let mut runtime = lock(&self.runtime);
        if let Some(runtime) = runtime.as_ref() {
            return Ok(runtime.handle().clone());
        }

        let config = &self.shared.config;
        let started = build_runtime(config.worker_threads, &config.thread_name)?;
        let handle = started.handle().clone();
        *runtime = Some(started);
        info!(worker_threads = config.worker_threads, "server started");
        Ok(handle)
    }

    /// Listen on `host:port` and accept connections until the listeners are stopped.
    ///
    /// Returns the bound address, which tells the actual port when `port` is 0.
    pub fn bind(&self, host: &str, port: u16) -> Result<SocketAddr, ServerError> {
        let handle = self.handle()?;

        let address = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        let std_listener = bind_first(&address)?;
        std_listener.set_nonblocking(true)?;
        let local_addr = std_listener.local_addr()?;

        let listener = {
            let _guard = handle.enter();
            TcpListener::from_std(std_listener)?
        };

        let cancel = self.shared.shutdown.child_token();
        let shared = Arc::clone(&self.shared);
        handle.spawn(self.shared.tracker.track_future(accept_loop(shared, listener, cancel.clone())));

        lock(&self.listeners).push(Listener { local_addr, cancel });
        info!(address = %local_addr, "start listening");
        Ok(local_addr)
    }

    /// Addresses of the listeners that are still accepting.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        lock(&self.listeners).iter().map(|listener| listener.local_addr).collect()
    }

    /// Stop accepting new connections.
    ///
    /// Connections already accepted are left alone, the sink still finishes them.
    pub fn stop_listeners(&self) {
        let listeners: Vec<_> = lock(&self.listeners).drain(..).collect();
        for listener in &listeners {
            listener.cancel.cancel();
        }
        if !listeners.is_empty() {
            info!(count = listeners.len(), "stopped listeners");
        }
    }

    /// Release a connection by id, the handle based form of
    /// [`Connection::release_from_handler`](crate::Connection::release_from_handler).
    pub fn release(&self, id: ConnectionId) -> Result<(), ServerError> {
        self.shared.arena.release(id)
    }

    pub fn connection_state(&self, id: ConnectionId) -> ConnectionState {
        self.shared.arena.state(id)
    }

    /// Number of connections that were accepted and not yet closed.
    pub fn connection_count(&self) -> usize {
        self.shared.arena.len()
    }

    /// Stop the server: stop the listeners, take back every live connection, wait for the
    /// connection tasks to finish and stop the reactor threads.
    ///
    /// Calling it again does nothing. Must not be called from a reactor thread, for example
    /// from inside the sink.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        self.stop_listeners();
        let held_by_sink = self.shared.arena.force_release_all();
        if held_by_sink > 0 {
            warn!(held_by_sink, "stopping with connections still held by the sink, closing them");
        }
        self.shared.shutdown.cancel();

        let runtime = lock(&self.runtime).take();
        if let Some(runtime) = runtime {
            self.shared.tracker.close();
            futures::executor::block_on(self.shared.tracker.wait());
            runtime.shutdown_background();
            info!("server stopped");
        }
    }
}

impl Default for HttpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("config", &self.shared.config)
            .field("listeners", &self.local_addrs())
            .field("connections", &self.connection_count())
            .field("stopped", &self.stopped.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolve `address` and bind the first candidate that works.
fn bind_first(address: &str) -> Result<StdTcpListener, ServerError> {
    let candidates = address.to_socket_addrs().map_err(|e| ServerError::bind(address, e))?;

    let mut last_error = None;
    for candidate in candidates {
        match StdTcpListener::bind(candidate) {
            Ok(listener) => return Ok(listener),
            Err(e) => last_error = Some(e),
        }
    }

    let cause = last_error.unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved"));
    Err(ServerError::bind(address, cause))
}

async fn accept_loop(shared: Arc<ServerShared>, listener: TcpListener, cancel: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer_addr) = match accepted {
            Ok(stream_and_addr) => stream_and_addr,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            error!(cause = %e, "failed to set TCP_NODELAY");
        }
        tokio::spawn(shared.tracker.track_future(serve_connection(Arc::clone(&shared), stream, peer_addr)));
    }

    match listener.local_addr() {
        Ok(address) => info!(%address, "listener closed"),
        Err(_) => info!("listener closed"),
    }
}
