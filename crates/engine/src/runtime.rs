use std::io;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

/// Build the reactor owned by one client or server.
pub(crate) fn build_runtime(worker_threads: usize, thread_name: &str) -> io::Result<Runtime> {
    let worker_threads = worker_threads.max(1);
    debug!(worker_threads, thread_name, "starting reactor threads");
    Builder::new_multi_thread().worker_threads(worker_threads).thread_name(thread_name).enable_all().build()
}

/// Message of a caught panic payload, for logging.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non string panic payload"
    }
}
