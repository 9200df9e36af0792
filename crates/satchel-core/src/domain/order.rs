//! Order numbers: the engine-assigned ordering key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of an entry in the queue, assigned by the repository at
/// enqueue time.
///
/// Order numbers are strictly increasing for the lifetime of a store and
/// are never reused, even after the entry they belonged to is deleted.
/// They double as the store's primary key.
///
/// Callers never construct these for new entries; `QueueRepository::enqueue`
/// is the only allocation path.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OrderNumber(u64);

impl OrderNumber {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
