//! Queue entries: order key + domain payload.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::OrderNumber;

/// Bound every queued payload type must satisfy.
///
/// The engine is generic over the payload: it only needs to persist it
/// (serde), hand clones to worker lanes, and move it across tasks.
pub trait QueuePayload:
    Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
}

impl<T> QueuePayload for T where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
}

/// A stored queue entry.
///
/// The payload is immutable once created; retries resubmit it unchanged.
/// `QueueEntry` is exposed through accessor methods to avoid accidental
/// mutation of either half.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry<T> {
    order_number: OrderNumber,
    payload: T,
}

impl<T> QueueEntry<T> {
    pub fn new(order_number: OrderNumber, payload: T) -> Self {
        Self {
            order_number,
            payload,
        }
    }

    pub fn order_number(&self) -> OrderNumber {
        self.order_number
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}
