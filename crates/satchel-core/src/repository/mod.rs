//! Repository port: durable storage of queue entries, independent of
//! how or when they are executed.

mod memory;
mod sqlite;

pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;

use async_trait::async_trait;

use crate::domain::{OrderNumber, QueueEntry, QueuePayload};
use crate::error::SatchelError;

/// Persistence port for queue entries.
///
/// This trait is the seam for swapping storage engines: anything with
/// keyed get/put/delete and an ordered full scan qualifies. The store is
/// the single source of truth for "what is still pending"; the
/// orchestrator's claim state is rebuilt from it after a restart.
///
/// Contract notes:
/// - `enqueue` is the only path that allocates order numbers. Numbers
///   are strictly increasing for the lifetime of the store and are never
///   reused, even after deletion or `clear_all`.
/// - All operations are durable: a completed call survives a process
///   restart, and a failed write leaves the store in its pre-call state.
/// - Absence and failure are distinct channels. `delete` on a missing
///   entry is `Ok(false)`, never an error.
#[async_trait]
pub trait QueueRepository<T: QueuePayload>: Send + Sync {
    /// Persist a payload under the next order number and return it.
    async fn enqueue(&self, payload: T) -> Result<OrderNumber, SatchelError>;

    /// Delete the entry with the smallest order number. `Ok(false)` if
    /// the queue is empty. Simple pop semantics; the orchestrator uses
    /// the explicit calls below instead.
    async fn dequeue_first(&self) -> Result<bool, SatchelError>;

    /// All entries, ascending by order number. Stable, deterministic
    /// total order.
    async fn ordered_entries(&self) -> Result<Vec<QueueEntry<T>>, SatchelError>;

    async fn get(&self, order_number: OrderNumber)
    -> Result<Option<QueueEntry<T>>, SatchelError>;

    /// Idempotent delete by order number.
    async fn delete(&self, order_number: OrderNumber) -> Result<bool, SatchelError>;

    /// Replace the stored entry matching `entry.order_number()`.
    /// `Ok(false)` if it no longer exists (e.g. concurrently delivered).
    async fn update(&self, entry: &QueueEntry<T>) -> Result<bool, SatchelError>;

    async fn count(&self) -> Result<usize, SatchelError>;

    /// Administrative reset. Returns the number of entries deleted. The
    /// order-number counter is not reset.
    async fn clear_all(&self) -> Result<usize, SatchelError>;

    /// The order number the next `enqueue` would assign. Inspection
    /// only; it does not reserve anything.
    async fn next_order_number(&self) -> Result<OrderNumber, SatchelError>;
}
