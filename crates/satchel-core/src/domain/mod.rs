//! Domain model (order keys, entries, the attendance payload).

mod attendance;
mod entry;
mod order;

pub use attendance::{ActorKind, AttendanceKind, AttendanceMark, RegistrationMode};
pub use entry::{QueueEntry, QueuePayload};
pub use order::OrderNumber;
