//! Lifecycle state machine for the orchestrator.

/// Orchestrator lifecycle.
///
/// Transitions:
/// - Stopped -> Running (`start`, or construction with `auto_start`)
/// - Running -> Draining -> Stopped (`drain`)
/// - Running -> Stopped (`stop`; in-flight lanes settle, then exit)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// No lanes are claiming. Enqueues still persist.
    Stopped,

    /// Lanes are claiming and dispatching.
    Running,

    /// Lanes finish their claimed entries but claim nothing new.
    Draining,
}

impl Lifecycle {
    /// May lanes claim new entries in this state?
    pub fn accepts_claims(self) -> bool {
        matches!(self, Lifecycle::Running)
    }
}

/// Value carried on the lifecycle watch channel.
///
/// The generation counter fences lane cohorts: each `start` bumps it, so
/// a lane from an earlier cohort exits even if the state reads Running
/// again by the time it looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct LifecycleSignal {
    pub(super) state: Lifecycle,
    pub(super) generation: u64,
}
