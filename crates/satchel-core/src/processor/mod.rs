//! Execution port: the one side-effecting action that "delivers" an entry.

mod http;

pub use http::HttpProcessor;

use async_trait::async_trait;

use crate::domain::{QueueEntry, QueuePayload};
use crate::error::SatchelError;

/// Performs the delivery action for a single entry.
///
/// The processor never retries internally; every error propagates to the
/// orchestrator, which owns the retry policy. `process` must be safe to
/// call repeatedly with the same entry, since retries resubmit the
/// payload unchanged.
///
/// Cancellation is single-slot: one processor instance tracks one
/// in-flight call, and `cancel_current` aborts whichever call was
/// started most recently. An orchestrator that relies on precise
/// per-item cancellation must not run two `process` calls on the same
/// instance at once (i.e. it runs that instance at concurrency 1).
#[async_trait]
pub trait ItemProcessor<T: QueuePayload>: Send + Sync {
    /// Execute the delivery action for `entry`.
    async fn process(&self, entry: &QueueEntry<T>) -> Result<(), SatchelError>;

    /// Abort the in-flight attempt, if any. The aborted call returns
    /// `SatchelError::Cancelled`.
    fn cancel_current(&self);
}
