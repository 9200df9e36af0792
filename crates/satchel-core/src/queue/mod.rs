//! The orchestrator: drives entries from the repository to the processor
//! under a concurrency bound, with retry-with-delay and a controllable
//! lifecycle.

mod config;
mod failure;
mod lanes;
mod state;

pub use config::QueueConfig;
pub use failure::PermanentFailure;
pub use state::Lifecycle;

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

use lanes::{LaneContext, LaneTable, lane_loop};
use state::LifecycleSignal;

use crate::domain::{OrderNumber, QueueEntry, QueuePayload};
use crate::error::SatchelError;
use crate::processor::ItemProcessor;
use crate::repository::QueueRepository;

/// Durable, concurrency-bounded submission queue.
///
/// The repository is the single source of truth for what is still
/// pending; claims and retry counters live in memory only. Up to
/// `concurrency` lanes claim entries in ascending order-number and hand
/// them to the processor. Delivery order across distinct entries is
/// therefore FIFO only at `concurrency = 1`; with more lanes, entries
/// are claimed in order but may complete out of order. Each entry's own
/// retries are always ordered.
///
/// One instance per queue: a deployment with several independent queues
/// (say, one per attendance kind) constructs several instances; there
/// is no global state.
pub struct SubmissionQueue<T: QueuePayload> {
    repository: Arc<dyn QueueRepository<T>>,
    processor: Arc<dyn ItemProcessor<T>>,
    config: QueueConfig,
    table: Arc<LaneTable>,
    lifecycle: watch::Sender<LifecycleSignal>,
    lanes: Mutex<Vec<JoinHandle<()>>>,
    failure_tx: mpsc::UnboundedSender<PermanentFailure<T>>,
    failure_rx: Mutex<Option<mpsc::UnboundedReceiver<PermanentFailure<T>>>>,
}

impl<T: QueuePayload> std::fmt::Debug for SubmissionQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionQueue")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T: QueuePayload> SubmissionQueue<T> {
    /// Build a queue over a repository and a processor. With
    /// `config.auto_start` the queue is Running on return. Must be
    /// called from within a Tokio runtime.
    pub async fn new(
        repository: Arc<dyn QueueRepository<T>>,
        processor: Arc<dyn ItemProcessor<T>>,
        config: QueueConfig,
    ) -> Result<Self, SatchelError> {
        config.validate()?;

        let (lifecycle, _) = watch::channel(LifecycleSignal {
            state: Lifecycle::Stopped,
            generation: 0,
        });
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();

        let queue = Self {
            repository,
            processor,
            config,
            table: Arc::new(LaneTable::new()),
            lifecycle,
            lanes: Mutex::new(Vec::new()),
            failure_tx,
            failure_rx: Mutex::new(Some(failure_rx)),
        };

        if queue.config.auto_start {
            queue.start().await;
        }

        Ok(queue)
    }

    /// Persist a payload and wake a lane. The only external write path
    /// into the queue; returns the assigned order number. Never blocks
    /// longer than the underlying persistence call.
    pub async fn enqueue(&self, payload: T) -> Result<OrderNumber, SatchelError> {
        let order_number = self.repository.enqueue(payload).await?;
        self.table.notify_one();
        Ok(order_number)
    }

    /// All pending entries, ascending by order number.
    pub async fn ordered_entries(&self) -> Result<Vec<QueueEntry<T>>, SatchelError> {
        self.repository.ordered_entries().await
    }

    pub async fn count(&self) -> Result<usize, SatchelError> {
        self.repository.count().await
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.borrow().state
    }

    /// Take the permanent-failure receiver. Yields `Some` exactly once;
    /// the queue keeps emitting regardless of whether anyone listens.
    pub async fn failures(
        &self,
    ) -> Option<mpsc::UnboundedReceiver<PermanentFailure<T>>> {
        self.failure_rx.lock().await.take()
    }

    /// Stopped -> Running. Spawns the lane cohort and returns `true`, or
    /// `false` if already running.
    ///
    /// A `start` immediately after `stop` can briefly overlap with lanes
    /// still settling their final entry; use [`Self::drain`] for a clean
    /// handoff. The claim table is shared across cohorts, so the overlap
    /// never double-delivers.
    pub async fn start(&self) -> bool {
        let mut lanes = self.lanes.lock().await;
        if self.lifecycle.borrow().state == Lifecycle::Running {
            return false;
        }
        lanes.retain(|lane| !lane.is_finished());

        let generation = self.lifecycle.borrow().generation + 1;
        self.lifecycle.send_replace(LifecycleSignal {
            state: Lifecycle::Running,
            generation,
        });
        tracing::debug!(concurrency = self.config.concurrency, "queue started");

        for lane_id in 0..self.config.concurrency {
            let ctx = LaneContext {
                lane_id,
                repository: Arc::clone(&self.repository),
                processor: Arc::clone(&self.processor),
                config: self.config.clone(),
                table: Arc::clone(&self.table),
                failures: self.failure_tx.clone(),
            };
            let receiver = self.lifecycle.subscribe();
            lanes.push(tokio::spawn(lane_loop(ctx, generation, receiver)));
        }
        true
    }

    /// Running -> Stopped. Lanes stop claiming; in-flight attempts are
    /// not cancelled and settle normally. Returns without waiting. To
    /// abort the in-flight network call as well, the caller cancels
    /// through the processor (`cancel_current`).
    pub async fn stop(&self) {
        let stopped = self.lifecycle.send_if_modified(|signal| {
            if signal.state == Lifecycle::Stopped {
                false
            } else {
                signal.state = Lifecycle::Stopped;
                true
            }
        });
        if stopped {
            tracing::debug!("queue stopped");
        }
    }

    /// Running -> Draining -> Stopped. Stops claiming, waits for every
    /// claimed entry to settle, then stops. A claimed entry whose
    /// attempt fails during the drain stays in the store for the next
    /// run.
    pub async fn drain(&self) {
        self.lifecycle.send_if_modified(|signal| {
            if signal.state == Lifecycle::Running {
                signal.state = Lifecycle::Draining;
                true
            } else {
                false
            }
        });

        // The final transition happens under the lane lock so a
        // concurrent start() cannot slip a fresh cohort in between the
        // join and the Stopped flip.
        let mut lanes = self.lanes.lock().await;
        while let Some(lane) = lanes.pop() {
            let _ = lane.await;
        }
        self.lifecycle.send_if_modified(|signal| {
            if signal.state == Lifecycle::Stopped {
                false
            } else {
                signal.state = Lifecycle::Stopped;
                true
            }
        });
        tracing::debug!("queue drained");
    }
}
