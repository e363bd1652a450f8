use crate::error::ClientError;
use crate::operation::cell::{OperationCell, Outcome};
use crate::operation::handle::OperationFuture;
use crate::operation::registry::PendingOperationRegistry;
use crate::runtime::panic_message;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Completion callback of an operation, invoked exactly once from a reactor thread.
pub(crate) type Callback = Box<dyn FnOnce(OperationFuture) + Send + 'static>;

/// The right and duty to resolve one operation, owned by the task driving it.
///
/// Resolving runs the callback, then publishes the terminal state, then deregisters the
/// operation. If the task is dropped before resolving, for example when its runtime shuts
/// down, the operation resolves as aborted.
pub(crate) struct Completion {
    cell: Arc<OperationCell>,
    callback: Option<Callback>,
    registry: Arc<PendingOperationRegistry>,
}

impl Completion {
    pub(crate) fn new(cell: Arc<OperationCell>, callback: Callback, registry: Arc<PendingOperationRegistry>) -> Self {
        Self { cell, callback: Some(callback), registry }
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cell.cancel_token().clone()
    }

    pub(crate) fn complete(mut self, outcome: Outcome) {
        self.resolve(outcome);
    }

    fn resolve(&mut self, natural: Outcome) {
        let Some(callback) = self.callback.take() else {
            return;
        };
        let Some(outcome) = self.cell.claim(natural) else {
            return;
        };

        let id = self.cell.id();
        match &outcome {
            Ok(response) => debug!(operation = %id, status = %response.status(), "operation completed"),
            Err(ClientError::OperationAborted) => debug!(operation = %id, "operation aborted"),
            Err(e) => debug!(operation = %id, cause = %e, "operation failed"),
        }

        self.cell.store_outcome(outcome);
        let future = OperationFuture::new(Arc::clone(&self.cell));
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(future))) {
            error!(operation = %id, panic = panic_message(payload.as_ref()), "completion callback panicked");
        }

        self.cell.publish();
        self.registry.deregister(id);
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.callback.is_some() {
            warn!(operation = %self.cell.id(), "operation dropped before it resolved, aborting");
            self.resolve(Err(ClientError::OperationAborted));
        }
    }
}
