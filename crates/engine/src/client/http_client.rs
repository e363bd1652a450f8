use crate::client::exchange::perform;
use crate::client::redirect::RedirectPolicy;
use crate::client::request::{Exchange, Request};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::message::Response;
use crate::operation::{
    Callback, Completion, OperationCell, OperationFuture, OperationHandle, OperationId, PendingOperationRegistry,
};
use crate::runtime::build_runtime;
use http::Method;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// Builder for [`HttpClient`].
#[derive(Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn worker_threads(mut self, worker_threads: usize) -> Self {
        self.config.worker_threads = worker_threads;
        self
    }

    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.max_redirects = max_redirects;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn max_body_size(mut self, max_body_size: usize) -> Self {
        self.config.max_body_size = max_body_size;
        self
    }

    pub fn build(self) -> Result<HttpClient, ClientError> {
        HttpClient::with_config(self.config)
    }
}

/// An HTTP/1.1 client issuing cancellable asynchronous requests.
///
/// The client owns its reactor threads. Dropping it, or calling [`HttpClient::shutdown`],
/// cancels every pending operation and waits until each one resolved and ran its callback.
///
/// ```no_run
/// use exchange_engine::{HttpClient, Request};
///
/// let client = HttpClient::new().unwrap();
/// let handle = client
///     .async_get(Request::new().url("http://127.0.0.1:8080/"), |future| match future.get() {
///         Ok(response) => println!("status {}", response.status()),
///         Err(e) => println!("failed: {e}"),
///     })
///     .unwrap();
///
/// handle.cancel_operation();
/// ```
#[derive(Debug)]
pub struct HttpClient {
    shared: Arc<ClientShared>,
    runtime: Option<Runtime>,
}

#[derive(Debug)]
struct ClientShared {
    config: ClientConfig,
    registry: Arc<PendingOperationRegistry>,
    next_id: AtomicU64,
}

impl HttpClient {
    pub fn new() -> Result<Self, ClientError> {
        Self::with_config(ClientConfig::default())
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn with_config(config: ClientConfig) -> Result<Self, ClientError> {
        let runtime = build_runtime(config.worker_threads, &config.thread_name).map_err(ClientError::runtime)?;
        let shared = ClientShared {
            config,
            registry: Arc::new(PendingOperationRegistry::new()),
            next_id: AtomicU64::new(1),
        };
        Ok(Self { shared: Arc::new(shared), runtime: Some(runtime) })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// The operations of this client that have not resolved yet.
    pub fn pending_operations(&self) -> &PendingOperationRegistry {
        &self.shared.registry
    }

    pub fn async_get<F>(&self, request: Request, callback: F) -> Result<OperationHandle, ClientError>
    where
        F: FnOnce(OperationFuture) + Send + 'static,
    {
        self.async_request(Method::GET, request, callback)
    }

    pub fn async_post<F>(&self, request: Request, callback: F) -> Result<OperationHandle, ClientError>
    where
        F: FnOnce(OperationFuture) + Send + 'static,
    {
        self.async_request(Method::POST, request, callback)
    }

    pub fn async_put<F>(&self, request: Request, callback: F) -> Result<OperationHandle, ClientError>
    where
        F: FnOnce(OperationFuture) + Send + 'static,
    {
        self.async_request(Method::PUT, request, callback)
    }

    pub fn async_delete<F>(&self, request: Request, callback: F) -> Result<OperationHandle, ClientError>
    where
        F: FnOnce(OperationFuture) + Send + 'static,
    {
        self.async_request(Method::DELETE, request, callback)
    }

    pub fn async_head<F>(&self, request: Request, callback: F) -> Result<OperationHandle, ClientError>
    where
        F: FnOnce(OperationFuture) + Send + 'static,
    {
        self.async_request(Method::HEAD, request, callback)
    }

    pub fn async_patch<F>(&self, request: Request, callback: F) -> Result<OperationHandle, ClientError>
    where
        F: FnOnce(OperationFuture) + Send + 'static,
    {
        self.async_request(Method::PATCH, request, callback)
    }

    /// Start an operation with the method set on the request, `GET` if none is set.
    pub fn async_send<F>(&self, request: Request, callback: F) -> Result<OperationHandle, ClientError>
    where
        F: FnOnce(OperationFuture) + Send + 'static,
    {
        let method = request.method_or_get();
        self.async_request(method, request, callback)
    }

    /// Start an operation.
    ///
    /// Returns at once. The request is validated first, an invalid one fails here with
    /// [`ClientError::InvalidRequest`] and the callback is never called. Otherwise the
    /// operation is registered before the handle is returned and `callback` is invoked
    /// exactly once, from a reactor thread, when it resolves.
    pub fn async_request<F>(&self, method: Method, request: Request, callback: F) -> Result<OperationHandle, ClientError>
    where
        F: FnOnce(OperationFuture) + Send + 'static,
    {
        let exchange = request.prepare(method)?;
        debug!(method = %exchange.method, uri = %exchange.uri, "starting operation");

        let shared = Arc::clone(&self.shared);
        self.spawn_operation(Box::new(callback), async move { follow(exchange, &shared.config).await })
    }

    /// Register an operation and drive `work` on the reactor until it or cancellation ends.
    fn spawn_operation<W>(&self, callback: Callback, work: W) -> Result<OperationHandle, ClientError>
    where
        W: Future<Output = Result<Response, ClientError>> + Send + 'static,
    {
        let runtime = self.runtime.as_ref().ok_or(ClientError::ShuttingDown)?;

        let id = OperationId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let cell = Arc::new(OperationCell::new(id));
        self.shared.registry.register(&cell)?;

        let completion = Completion::new(Arc::clone(&cell), callback, Arc::clone(&self.shared.registry));
        runtime.spawn(async move {
            let cancel = completion.cancel_token();
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(ClientError::OperationAborted),
                outcome = work => outcome,
            };
            completion.complete(outcome);
        });

        Ok(OperationHandle::new(cell))
    }

    /// Cancel every pending operation and block until all of them resolved.
    ///
    /// New operations are refused with [`ClientError::ShuttingDown`] from the moment this is
    /// called. Calling it again is harmless. Must not be called from a reactor thread.
    pub fn shutdown(&self) {
        let registry = &self.shared.registry;
        let pending = registry.len();
        registry.close_and_cancel_all();
        futures::executor::block_on(registry.drained());
        if pending > 0 {
            info!(pending, "client drained its pending operations");
        }
    }
}

impl Drop for HttpClient {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Run the exchanges of one operation, following redirects.
async fn follow(mut exchange: Exchange, config: &ClientConfig) -> Result<Response, ClientError> {
    let mut redirects = RedirectPolicy::new(config.max_redirects);
    loop {
        let response = perform(&exchange, config).await?;
        match redirects.next_hop(&exchange, &response)? {
            Some(next) => exchange = next,
            None => return Ok(response),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationState;
    use std::sync::Mutex;
    use std::sync::mpsc;
    use std::time::Duration;

    type Seen = Arc<Mutex<Vec<OperationState>>>;

    fn recording_callback(seen: &Seen) -> Callback {
        let seen = Arc::clone(seen);
        Box::new(move |future: OperationFuture| seen.lock().unwrap().push(future.state()))
    }

    #[test]
    fn invalid_request_fails_before_registration() {
        let client = HttpClient::new().unwrap();
        let result = client.async_get(Request::new(), |_| panic!("callback must not run"));

        assert!(matches!(result, Err(ClientError::InvalidRequest { .. })));
        assert!(client.pending_operations().is_empty());
    }

    #[test]
    fn dropping_the_client_aborts_a_thousand_pending_operations() {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let client = HttpClient::new().unwrap();

        let handles: Vec<_> = (0..1000)
            .map(|_| client.spawn_operation(recording_callback(&seen), futures::future::pending()).unwrap())
            .collect();
        assert_eq!(client.pending_operations().len(), 1000);

        drop(client);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1000);
        assert!(seen.iter().all(|state| *state == OperationState::Aborted));
        assert!(handles.iter().all(|handle| handle.state() == OperationState::Aborted));
    }

    #[test]
    fn shutdown_refuses_new_operations() {
        let client = HttpClient::new().unwrap();
        client.shutdown();

        let result = client.async_get(Request::new().url("http://127.0.0.1:1/"), |_| {});
        assert!(matches!(result, Err(ClientError::ShuttingDown)));
    }

    #[test]
    fn cancel_resolves_a_pending_operation() {
        let client = HttpClient::new().unwrap();
        let (tx, rx) = mpsc::channel();

        let handle = client
            .spawn_operation(
                Box::new(move |future: OperationFuture| tx.send(future.get()).unwrap()),
                futures::future::pending(),
            )
            .unwrap();
        assert_eq!(handle.state(), OperationState::Pending);

        handle.cancel_operation();

        let outcome = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(outcome, Err(ClientError::OperationAborted)));
        assert!(matches!(handle.wait(), Err(ClientError::OperationAborted)));
        client.shutdown();
        assert!(client.pending_operations().is_empty());
    }

    #[test]
    fn completed_operation_ignores_late_cancel() {
        let client = HttpClient::new().unwrap();
        let handle = client
            .spawn_operation(Box::new(|_| {}), async { Ok(Response::new(http::StatusCode::ACCEPTED)) })
            .unwrap();

        let response = handle.wait().unwrap();
        handle.cancel_operation();

        assert_eq!(response.status(), http::StatusCode::ACCEPTED);
        assert_eq!(handle.state(), OperationState::Completed);
        assert_eq!(handle.wait().unwrap().status(), http::StatusCode::ACCEPTED);
    }
}
