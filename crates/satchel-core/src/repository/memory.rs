//! In-memory repository implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{OrderNumber, QueueEntry, QueuePayload};
use crate::error::SatchelError;
use crate::repository::QueueRepository;

/// Inner state, guarded by one lock.
///
/// `next_order` is a counter, not "max key + 1": it keeps advancing
/// across deletes and `clear_all`, which is what makes order numbers
/// monotonic for the lifetime of the repository.
struct MemoryState<T> {
    entries: BTreeMap<OrderNumber, T>,
    next_order: u64,
}

/// Ephemeral adapter for tests and development. Same contract as the
/// durable adapters, minus the durability.
pub struct MemoryRepository<T> {
    state: Mutex<MemoryState<T>>,
}

impl<T> MemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                entries: BTreeMap::new(),
                next_order: 1,
            }),
        }
    }
}

impl<T> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: QueuePayload> QueueRepository<T> for MemoryRepository<T> {
    async fn enqueue(&self, payload: T) -> Result<OrderNumber, SatchelError> {
        let mut state = self.state.lock().await;
        let order_number = OrderNumber::new(state.next_order);
        state.next_order += 1;
        state.entries.insert(order_number, payload);
        Ok(order_number)
    }

    async fn dequeue_first(&self) -> Result<bool, SatchelError> {
        let mut state = self.state.lock().await;
        match state.entries.keys().next().copied() {
            Some(first) => {
                state.entries.remove(&first);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ordered_entries(&self) -> Result<Vec<QueueEntry<T>>, SatchelError> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .iter()
            .map(|(n, payload)| QueueEntry::new(*n, payload.clone()))
            .collect())
    }

    async fn get(
        &self,
        order_number: OrderNumber,
    ) -> Result<Option<QueueEntry<T>>, SatchelError> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .get(&order_number)
            .map(|payload| QueueEntry::new(order_number, payload.clone())))
    }

    async fn delete(&self, order_number: OrderNumber) -> Result<bool, SatchelError> {
        let mut state = self.state.lock().await;
        Ok(state.entries.remove(&order_number).is_some())
    }

    async fn update(&self, entry: &QueueEntry<T>) -> Result<bool, SatchelError> {
        let mut state = self.state.lock().await;
        match state.entries.get_mut(&entry.order_number()) {
            Some(stored) => {
                *stored = entry.payload().clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self) -> Result<usize, SatchelError> {
        let state = self.state.lock().await;
        Ok(state.entries.len())
    }

    async fn clear_all(&self) -> Result<usize, SatchelError> {
        let mut state = self.state.lock().await;
        let deleted = state.entries.len();
        state.entries.clear();
        Ok(deleted)
    }

    async fn next_order_number(&self) -> Result<OrderNumber, SatchelError> {
        let state = self.state.lock().await;
        Ok(OrderNumber::new(state.next_order))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[tokio::test]
    async fn order_numbers_increase_across_deletes() {
        let repo = MemoryRepository::<String>::new();

        let a = repo.enqueue("a".to_string()).await.unwrap();
        let b = repo.enqueue("b".to_string()).await.unwrap();
        assert!(b > a);

        assert!(repo.delete(b).await.unwrap());
        let c = repo.enqueue("c".to_string()).await.unwrap();

        // b's number is not reused even though b is gone
        assert!(c > b);
    }

    #[tokio::test]
    async fn counter_survives_clear_all() {
        let repo = MemoryRepository::<String>::new();

        repo.enqueue("a".to_string()).await.unwrap();
        let before = repo.next_order_number().await.unwrap();

        assert_eq!(repo.clear_all().await.unwrap(), 1);
        assert_eq!(repo.count().await.unwrap(), 0);

        let after = repo.next_order_number().await.unwrap();
        assert!(after >= before);

        let next = repo.enqueue("b".to_string()).await.unwrap();
        assert!(next >= before);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let repo = MemoryRepository::<String>::new();
        let n = repo.enqueue("a".to_string()).await.unwrap();

        assert!(repo.delete(n).await.unwrap());
        assert!(!repo.delete(n).await.unwrap());
    }

    #[tokio::test]
    async fn entries_come_back_in_order() {
        let repo = MemoryRepository::<String>::new();
        for payload in ["a", "b", "c"] {
            repo.enqueue(payload.to_string()).await.unwrap();
        }

        let entries = repo.ordered_entries().await.unwrap();
        let payloads: Vec<&str> = entries.iter().map(|e| e.payload().as_str()).collect();
        assert_eq!(payloads, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn dequeue_first_pops_the_oldest() {
        let repo = MemoryRepository::<String>::new();
        repo.enqueue("a".to_string()).await.unwrap();
        repo.enqueue("b".to_string()).await.unwrap();

        assert!(repo.dequeue_first().await.unwrap());
        let entries = repo.ordered_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload(), "b");

        assert!(repo.dequeue_first().await.unwrap());
        assert!(!repo.dequeue_first().await.unwrap());
    }

    #[tokio::test]
    async fn update_replaces_only_existing_entries() {
        let repo = MemoryRepository::<String>::new();
        let n = repo.enqueue("a".to_string()).await.unwrap();

        let corrected = QueueEntry::new(n, "a2".to_string());
        assert!(repo.update(&corrected).await.unwrap());
        let fetched = repo.get(n).await.unwrap().unwrap();
        assert_eq!(fetched.payload(), "a2");

        repo.delete(n).await.unwrap();
        assert!(!repo.update(&corrected).await.unwrap());
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(7)]
    #[tokio::test]
    async fn count_tracks_enqueues(#[case] items: usize) {
        let repo = MemoryRepository::<String>::new();
        for i in 0..items {
            repo.enqueue(format!("item-{i}")).await.unwrap();
        }
        assert_eq!(repo.count().await.unwrap(), items);
    }
}
