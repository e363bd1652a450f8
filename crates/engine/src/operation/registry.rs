use crate::error::ClientError;
use crate::operation::cell::{OperationCell, OperationId};
use std::collections::HashMap;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::{debug, info};

/// The set of in-flight operations of one client.
///
/// Operations are registered before their handle is returned and removed exactly once,
/// after their callback ran. Closing the registry refuses new operations, which lets the
/// owner drain it to zero.
#[derive(Debug, Default)]
pub struct PendingOperationRegistry {
    inner: Mutex<RegistryInner>,
    drained: Notify,
}

#[derive(Debug, Default)]
struct RegistryInner {
    operations: HashMap<OperationId, Arc<OperationCell>>,
    closed: bool,
}

impl PendingOperationRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // the map stays consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of operations that have not resolved yet.
    pub fn len(&self) -> usize {
        self.lock().operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().operations.is_empty()
    }

    /// Returns true once the owning client started shutting down.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub(crate) fn register(&self, cell: &Arc<OperationCell>) -> Result<(), ClientError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(ClientError::ShuttingDown);
        }
        inner.operations.insert(cell.id(), Arc::clone(cell));
        cell.mark_registered();
        Ok(())
    }

    pub(crate) fn deregister(&self, id: OperationId) -> bool {
        let mut inner = self.lock();
        let removed = inner.operations.remove(&id).is_some();
        if inner.operations.is_empty() {
            self.drained.notify_waiters();
        }
        removed
    }

    /// Refuse new operations and request cancellation of every registered one.
    ///
    /// Returns the number of operations this call moved to cancelling.
    pub(crate) fn close_and_cancel_all(&self) -> usize {
        let operations: Vec<_> = {
            let mut inner = self.lock();
            inner.closed = true;
            inner.operations.values().cloned().collect()
        };

        let cancelled = operations.iter().filter(|cell| cell.request_cancel()).count();
        if cancelled > 0 {
            info!(pending = operations.len(), cancelled, "cancelling pending operations");
        }
        cancelled
    }

    /// Resolves once no operation is registered.
    pub(crate) async fn drained(&self) {
        loop {
            let mut notified = pin!(self.drained.notified());
            notified.as_mut().enable();

            let remaining = self.len();
            if remaining == 0 {
                return;
            }
            debug!(remaining, "waiting for pending operations to resolve");
            notified.await;
        }
    }
}
