//! satchel-core
//!
//! A durable, concurrency-bounded submission queue: domain work-items
//! are persisted locally so they survive reloads and crashes, then
//! driven to a remote endpoint with bounded parallelism, fixed-delay
//! retry, and per-item cancellation.
//!
//! Module map:
//! - **domain**: order keys, queue entries, the attendance payload
//! - **repository**: persistence port + in-memory and SQLite adapters
//! - **processor**: execution port + the HTTP delivery adapter
//! - **queue**: the orchestrator (worker lanes, retry, lifecycle)
//!
//! Delivery semantics are at-least-once: the store is the single source
//! of truth for what is pending, claims are in-memory only, and a crash
//! between a confirmed delivery and the local delete re-delivers on the
//! next run.

pub mod domain;
pub mod error;
pub mod processor;
pub mod queue;
pub mod repository;

pub use domain::{
    ActorKind, AttendanceKind, AttendanceMark, OrderNumber, QueueEntry, QueuePayload,
    RegistrationMode,
};
pub use error::SatchelError;
pub use processor::{HttpProcessor, ItemProcessor};
pub use queue::{Lifecycle, PermanentFailure, QueueConfig, SubmissionQueue};
pub use repository::{MemoryRepository, QueueRepository, SqliteRepository};
