//! Asynchronous operation lifecycle shared by every client request.
//!
//! - [`OperationHandle`]: returned to the caller, cancels and observes the operation
//! - [`OperationFuture`]: the resolved outcome handed to the completion callback
//! - [`PendingOperationRegistry`]: every in-flight operation of a client, drained on shutdown
//!
//! An operation resolves exactly once, either with its natural outcome or with
//! `OperationAborted` when a cancel request wins the race.

mod cell;
mod completion;
mod handle;
mod registry;

pub use cell::OperationId;
pub use cell::OperationState;
pub use handle::OperationFuture;
pub use handle::OperationHandle;
pub use registry::PendingOperationRegistry;

pub(crate) use cell::OperationCell;
pub(crate) use completion::{Callback, Completion};
