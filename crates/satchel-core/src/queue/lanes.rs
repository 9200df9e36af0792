//! Worker lanes: claim, dispatch, settle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify, mpsc, watch};
use tokio::time::Instant;

use crate::domain::{OrderNumber, QueueEntry, QueuePayload};
use crate::error::SatchelError;
use crate::processor::ItemProcessor;
use crate::queue::config::QueueConfig;
use crate::queue::failure::PermanentFailure;
use crate::queue::state::LifecycleSignal;
use crate::repository::QueueRepository;

/// Transient dispatch state shared by every lane of one queue.
///
/// None of this is persisted. After a crash the table is rebuilt empty,
/// every stored entry becomes eligible again, and delivery degrades to
/// at-least-once.
pub(super) struct LaneTable {
    state: Mutex<DispatchState>,

    /// Wakes one idle lane when new work may be available.
    notify: Notify,
}

#[derive(Default)]
struct DispatchState {
    /// Entries currently owned by a lane.
    claimed: HashSet<OrderNumber>,

    /// Failed attempts per entry.
    attempts: HashMap<OrderNumber, u32>,

    /// Entries waiting out a retry delay, by eligibility deadline.
    backoff: HashMap<OrderNumber, Instant>,
}

impl LaneTable {
    pub(super) fn new() -> Self {
        Self {
            state: Mutex::new(DispatchState::default()),
            notify: Notify::new(),
        }
    }

    pub(super) fn notify_one(&self) {
        self.notify.notify_one();
    }
}

/// Everything one lane needs, cloned per lane at spawn time.
pub(super) struct LaneContext<T: QueuePayload> {
    pub(super) lane_id: usize,
    pub(super) repository: Arc<dyn QueueRepository<T>>,
    pub(super) processor: Arc<dyn ItemProcessor<T>>,
    pub(super) config: QueueConfig,
    pub(super) table: Arc<LaneTable>,
    pub(super) failures: mpsc::UnboundedSender<PermanentFailure<T>>,
}

/// One lane: claim the oldest eligible entry, dispatch it, settle the
/// result, repeat until the lifecycle says otherwise.
pub(super) async fn lane_loop<T: QueuePayload>(
    ctx: LaneContext<T>,
    generation: u64,
    mut lifecycle: watch::Receiver<LifecycleSignal>,
) {
    loop {
        {
            // A dropped sender means the queue itself is gone.
            if lifecycle.has_changed().is_err() {
                break;
            }
            let signal = *lifecycle.borrow();
            if !signal.state.accepts_claims() || signal.generation != generation {
                break;
            }
        }

        let claim = match claim_next(&ctx).await {
            Ok(claim) => claim,
            Err(err) => {
                tracing::warn!(lane = ctx.lane_id, error = %err, "claim scan failed");
                let retry_at = Instant::now() + ctx.config.retry_delay;
                idle(&ctx.table, &mut lifecycle, Some(retry_at)).await;
                continue;
            }
        };

        let Some(entry) = claim else {
            let deadline = earliest_backoff(&ctx.table).await;
            idle(&ctx.table, &mut lifecycle, deadline).await;
            continue;
        };

        tracing::debug!(lane = ctx.lane_id, order = %entry.order_number(), "dispatching");
        let result = ctx.processor.process(&entry).await;
        settle(&ctx, entry, result).await;
    }

    tracing::debug!(lane = ctx.lane_id, "lane stopped");
}

/// Claim the smallest unclaimed order number whose backoff (if any) has
/// elapsed. The claimed entry is refetched before dispatch: the ordered
/// scan may predate another lane's delete, and an explicit `update` may
/// have replaced the payload.
async fn claim_next<T: QueuePayload>(
    ctx: &LaneContext<T>,
) -> Result<Option<QueueEntry<T>>, SatchelError> {
    loop {
        let entries = ctx.repository.ordered_entries().await?;

        let candidate = {
            let mut guard = ctx.table.state.lock().await;
            let state = &mut *guard;
            let now = Instant::now();

            // Drop bookkeeping for entries deleted behind our back
            // (external delete, clear_all). In-flight entries are still
            // stored, so their counters survive this.
            let live: HashSet<OrderNumber> =
                entries.iter().map(|e| e.order_number()).collect();
            state.backoff.retain(|n, _| live.contains(n));
            let claimed = &state.claimed;
            state
                .attempts
                .retain(|n, _| live.contains(n) || claimed.contains(n));

            let mut picked = None;
            for entry in &entries {
                let n = entry.order_number();
                if state.claimed.contains(&n) {
                    continue;
                }
                if let Some(deadline) = state.backoff.get(&n)
                    && *deadline > now
                {
                    continue;
                }
                state.backoff.remove(&n);
                state.claimed.insert(n);
                picked = Some(n);
                break;
            }
            picked
        };

        let Some(order_number) = candidate else {
            return Ok(None);
        };

        match ctx.repository.get(order_number).await {
            Ok(Some(fresh)) => return Ok(Some(fresh)),
            Ok(None) => {
                // Deleted between scan and refetch; rescan for the next one.
                let mut state = ctx.table.state.lock().await;
                state.claimed.remove(&order_number);
                state.attempts.remove(&order_number);
            }
            Err(err) => {
                let mut state = ctx.table.state.lock().await;
                state.claimed.remove(&order_number);
                return Err(err);
            }
        }
    }
}

/// Earliest backoff deadline, if any entry is waiting one out.
async fn earliest_backoff(table: &LaneTable) -> Option<Instant> {
    let state = table.state.lock().await;
    state.backoff.values().min().copied()
}

/// Park until new work is signalled, the deadline passes, or the
/// lifecycle changes. Never a busy-wait.
async fn idle(
    table: &LaneTable,
    lifecycle: &mut watch::Receiver<LifecycleSignal>,
    deadline: Option<Instant>,
) {
    match deadline {
        Some(deadline) => {
            tokio::select! {
                _ = lifecycle.changed() => {}
                _ = table.notify.notified() => {}
                _ = tokio::time::sleep_until(deadline) => {}
            }
        }
        None => {
            tokio::select! {
                _ = lifecycle.changed() => {}
                _ = table.notify.notified() => {}
            }
        }
    }
}

/// Apply the attempt's outcome: delete on success, schedule a retry or
/// report a permanent failure otherwise.
async fn settle<T: QueuePayload>(
    ctx: &LaneContext<T>,
    entry: QueueEntry<T>,
    result: Result<(), SatchelError>,
) {
    let order_number = entry.order_number();

    match result {
        Ok(()) => {
            if delete_confirmed(ctx, order_number).await {
                let mut state = ctx.table.state.lock().await;
                state.claimed.remove(&order_number);
                state.attempts.remove(&order_number);
                drop(state);
                tracing::debug!(lane = ctx.lane_id, order = %order_number, "delivered");
            }
            // On an unconfirmed delete the claim stays held: the entry
            // was delivered, and re-posting it from this process is the
            // one duplicate we can still avoid. A restart re-delivers
            // (at-least-once).
        }
        Err(err) => {
            let failed_attempts = {
                let mut state = ctx.table.state.lock().await;
                let count = state.attempts.entry(order_number).or_insert(0);
                *count += 1;
                *count
            };

            if failed_attempts >= ctx.config.max_retries {
                if delete_confirmed(ctx, order_number).await {
                    {
                        let mut state = ctx.table.state.lock().await;
                        state.claimed.remove(&order_number);
                        state.attempts.remove(&order_number);
                        state.backoff.remove(&order_number);
                    }
                    tracing::warn!(
                        lane = ctx.lane_id,
                        order = %order_number,
                        attempts = failed_attempts,
                        error = %err,
                        "permanently failed"
                    );
                    let _ = ctx.failures.send(PermanentFailure {
                        entry,
                        attempts: failed_attempts,
                        error: err.to_string(),
                    });
                }
            } else {
                let eligible_at = Instant::now() + ctx.config.retry_delay;
                {
                    let mut state = ctx.table.state.lock().await;
                    state.backoff.insert(order_number, eligible_at);
                    state.claimed.remove(&order_number);
                }
                tracing::debug!(
                    lane = ctx.lane_id,
                    order = %order_number,
                    attempt = failed_attempts,
                    error = %err,
                    "retry scheduled"
                );
                // An idle lane may be sleeping with no deadline; wake one
                // so it picks up the new backoff deadline.
                ctx.table.notify.notify_one();
            }
        }
    }
}

/// Delete with the store's outcome confirmed. An ambiguous delete (store
/// unavailable) is retried as a delete, never reinterpreted as a
/// failure of the original delivery. Returns false when the store stayed
/// unavailable; the caller then holds the claim.
async fn delete_confirmed<T: QueuePayload>(
    ctx: &LaneContext<T>,
    order_number: OrderNumber,
) -> bool {
    let tries = ctx.config.max_retries.max(1);
    for attempt in 1..=tries {
        match ctx.repository.delete(order_number).await {
            // Ok(false) is fine: already gone means the outcome is known.
            Ok(_) => return true,
            Err(err) => {
                tracing::error!(
                    lane = ctx.lane_id,
                    order = %order_number,
                    attempt,
                    error = %err,
                    "delete failed"
                );
                if attempt < tries {
                    tokio::time::sleep(ctx.config.retry_delay).await;
                }
            }
        }
    }
    false
}
