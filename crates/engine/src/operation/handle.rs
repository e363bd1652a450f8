use crate::error::ClientError;
use crate::message::Response;
use crate::operation::cell::{OperationCell, OperationId, OperationState};
use std::sync::Arc;
use tracing::debug;

/// Caller side control of one asynchronous operation.
///
/// Handles are cheap to clone and may be used from any thread. Dropping every handle does
/// not cancel the operation, the completion callback still runs.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    cell: Arc<OperationCell>,
}

impl OperationHandle {
    pub(crate) fn new(cell: Arc<OperationCell>) -> Self {
        Self { cell }
    }

    pub fn id(&self) -> OperationId {
        self.cell.id()
    }

    /// Request cancellation of the operation.
    ///
    /// Safe to call any number of times, from any thread, at any point. If the operation
    /// has not resolved yet it resolves with [`ClientError::OperationAborted`] and the socket
    /// is closed by the task that owns it. After resolution this does nothing.
    pub fn cancel_operation(&self) {
        if self.cell.request_cancel() {
            debug!(operation = %self.cell.id(), "cancellation requested");
        }
    }

    pub fn state(&self) -> OperationState {
        self.cell.state()
    }

    pub fn is_terminal(&self) -> bool {
        self.cell.state().is_terminal()
    }

    /// Wait for the operation to resolve.
    ///
    /// The completion callback has returned by the time this resolves.
    pub async fn completion(&self) -> Result<Response, ClientError> {
        self.cell.terminated().await.clone()
    }

    /// Block the current thread until the operation resolves.
    ///
    /// Must not be called from a reactor thread, for example from inside a callback.
    pub fn wait(&self) -> Result<Response, ClientError> {
        futures::executor::block_on(self.completion())
    }
}

/// The resolved outcome of an operation, as passed to its completion callback.
#[derive(Debug)]
pub struct OperationFuture {
    cell: Arc<OperationCell>,
}

impl OperationFuture {
    pub(crate) fn new(cell: Arc<OperationCell>) -> Self {
        Self { cell }
    }

    pub fn id(&self) -> OperationId {
        self.cell.id()
    }

    /// The terminal state this future resolved with.
    pub fn state(&self) -> OperationState {
        self.cell.stored_outcome().map_or_else(|| self.cell.state(), OperationState::of)
    }

    pub fn is_aborted(&self) -> bool {
        self.state() == OperationState::Aborted
    }

    /// The response, or the error the operation resolved with.
    pub fn get(self) -> Result<Response, ClientError> {
        match self.cell.stored_outcome() {
            Some(outcome) => outcome.clone(),
            None => Err(ClientError::OperationAborted),
        }
    }
}
