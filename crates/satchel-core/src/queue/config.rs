//! Orchestrator configuration.

use std::time::Duration;

use crate::error::SatchelError;

/// Configuration for a [`super::SubmissionQueue`]. All fields are
/// required at construction and fixed for the queue's lifetime.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Transition straight to Running on construction.
    pub auto_start: bool,

    /// Number of worker lanes; the hard bound on concurrently in-flight
    /// deliveries. Must be at least 1. Global FIFO delivery order is
    /// only guaranteed at 1.
    pub concurrency: usize,

    /// Fixed delay between an entry's failed attempt and its next
    /// eligibility. The failing entry's lane is released for the
    /// duration, so one entry's backoff never blocks the others.
    pub retry_delay: Duration,

    /// Total attempt budget per entry. An entry that keeps failing is
    /// attempted exactly this many times, then removed from the store
    /// and reported as a permanent failure. Zero behaves as one attempt
    /// with no retries.
    pub max_retries: u32,
}

impl QueueConfig {
    pub(super) fn validate(&self) -> Result<(), SatchelError> {
        if self.concurrency == 0 {
            return Err(SatchelError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
