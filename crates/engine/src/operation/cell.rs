//! Shared state of one asynchronous operation.
//!
//! The state word is the single point where cancellation races natural completion:
//!
//! ```text
//! CREATED --register--> PENDING --cancel--> CANCELLING
//!    |                     |                    |
//!    +------claim----------+-----claim----------+--> RESOLVING --publish--> COMPLETED | FAILED | ABORTED
//! ```
//!
//! `claim` is only called by the task driving the operation. Claiming from `CANCELLING`
//! discards the natural outcome and resolves with `OperationAborted`; a cancel request
//! that finds `RESOLVING` or a terminal state does nothing.

use crate::error::ClientError;
use crate::message::Response;
use std::fmt;
use std::pin::pin;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub(crate) type Outcome = Result<Response, ClientError>;

const CREATED: u8 = 0;
const PENDING: u8 = 1;
const CANCELLING: u8 = 2;
const RESOLVING: u8 = 3;
const COMPLETED: u8 = 4;
const FAILED: u8 = 5;
const ABORTED: u8 = 6;

/// Identity of an operation, unique within its client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(pub(crate) u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Observable state of an operation.
///
/// A cancellation that has been requested but not yet delivered still reads as `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    /// Not yet registered with the client.
    Created,
    Pending,
    /// Resolved with a response.
    Completed,
    /// Resolved with a transport, protocol or redirect error.
    Failed,
    /// Resolved by cancellation.
    Aborted,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }

    pub(crate) fn of(outcome: &Outcome) -> Self {
        match outcome {
            Ok(_) => Self::Completed,
            Err(ClientError::OperationAborted) => Self::Aborted,
            Err(_) => Self::Failed,
        }
    }
}

#[derive(Debug)]
pub(crate) struct OperationCell {
    id: OperationId,
    state: AtomicU8,
    outcome: OnceLock<Outcome>,
    cancel: CancellationToken,
    terminal: Notify,
}

impl OperationCell {
    pub(crate) fn new(id: OperationId) -> Self {
        Self {
            id,
            state: AtomicU8::new(CREATED),
            outcome: OnceLock::new(),
            cancel: CancellationToken::new(),
            terminal: Notify::new(),
        }
    }

    pub(crate) fn id(&self) -> OperationId {
        self.id
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn mark_registered(&self) {
        // a failed exchange means the cell already left CREATED, which is fine
        let _ = self.state.compare_exchange(CREATED, PENDING, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Ask for cancellation, returns true if this call moved the operation to cancelling.
    pub(crate) fn request_cancel(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current != CREATED && current != PENDING {
                return false;
            }
            match self.state.compare_exchange_weak(current, CANCELLING, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => {
                    self.cancel.cancel();
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Take the right to resolve the operation.
    ///
    /// Returns the outcome to deliver: `natural` if the operation was still pending,
    /// `OperationAborted` if a cancel request came first, `None` if it is already resolving.
    pub(crate) fn claim(&self, natural: Outcome) -> Option<Outcome> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let outcome_if_won = match current {
                CREATED | PENDING => None,
                CANCELLING => Some(Err(ClientError::OperationAborted)),
                _ => return None,
            };
            match self.state.compare_exchange_weak(current, RESOLVING, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Some(outcome_if_won.unwrap_or(natural)),
                Err(actual) => current = actual,
            }
        }
    }

    /// Store the outcome of a claimed operation, before the callback sees it.
    pub(crate) fn store_outcome(&self, outcome: Outcome) {
        let _ = self.outcome.set(outcome);
    }

    /// Make the stored outcome visible to every observer and wake the waiters.
    pub(crate) fn publish(&self) {
        let terminal = match self.outcome.get().map(OperationState::of) {
            Some(OperationState::Completed) => COMPLETED,
            Some(OperationState::Failed) => FAILED,
            _ => ABORTED,
        };
        self.state.store(terminal, Ordering::Release);
        self.terminal.notify_waiters();
    }

    pub(crate) fn state(&self) -> OperationState {
        match self.state.load(Ordering::Acquire) {
            CREATED => OperationState::Created,
            COMPLETED => OperationState::Completed,
            FAILED => OperationState::Failed,
            ABORTED => OperationState::Aborted,
            _ => OperationState::Pending,
        }
    }

    /// The stored outcome, once the operation is observably terminal.
    pub(crate) fn outcome(&self) -> Option<&Outcome> {
        if self.state().is_terminal() { self.outcome.get() } else { None }
    }

    /// The stored outcome as soon as it is set, the callback path reads it before publish.
    pub(crate) fn stored_outcome(&self) -> Option<&Outcome> {
        self.outcome.get()
    }

    /// Resolves once the operation is observably terminal.
    pub(crate) async fn terminated(&self) -> &Outcome {
        loop {
            let mut notified = pin!(self.terminal.notified());
            notified.as_mut().enable();

            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            notified.await;
        }
    }
}
