//! Permanent-failure signal.

use crate::domain::QueueEntry;

/// Terminal outcome for an entry that exhausted its retry budget.
///
/// By the time this signal is emitted the entry has been removed from
/// the store; the queue never re-enqueues it. Re-creating the item is a
/// producer-level decision.
#[derive(Debug, Clone)]
pub struct PermanentFailure<T> {
    pub entry: QueueEntry<T>,

    /// Failed attempts made (equals the configured budget).
    pub attempts: u32,

    /// Error text of the final attempt.
    pub error: String,
}
