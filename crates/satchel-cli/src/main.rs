//! Demo harness: wires a repository, a deliberately flaky processor and
//! the submission queue together, then watches the queue drain.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use satchel_core::{
    ActorKind, AttendanceKind, AttendanceMark, ItemProcessor, MemoryRepository,
    QueueConfig, QueueEntry, QueueRepository, RegistrationMode, SatchelError,
    SqliteRepository, SubmissionQueue,
};

/// Demo knobs, read from the environment the way a worker deployment
/// would. The engine itself takes no environment input.
struct DemoConfig {
    concurrency: usize,
    retry_delay_ms: u64,
    max_retries: u32,
    /// Path to a SQLite file; unset means in-memory.
    db_path: Option<String>,
}

impl DemoConfig {
    fn from_env() -> Self {
        let concurrency = std::env::var("SATCHEL_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(2);
        let retry_delay_ms = std::env::var("SATCHEL_RETRY_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(250);
        let max_retries = std::env::var("SATCHEL_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);
        let db_path = std::env::var("SATCHEL_DB").ok();

        Self {
            concurrency,
            retry_delay_ms,
            max_retries,
            db_path,
        }
    }
}

/// Stand-in for the HTTP processor: fails the first few calls so the
/// retry path is visible, then succeeds.
struct FlakyProcessor {
    remaining_failures: AtomicU32,
}

impl FlakyProcessor {
    fn new(failures: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl ItemProcessor<AttendanceMark> for FlakyProcessor {
    async fn process(&self, entry: &QueueEntry<AttendanceMark>) -> Result<(), SatchelError> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(SatchelError::delivery(
                Some(503),
                format!("intentional failure (left={left})"),
            ));
        }

        tracing::info!(
            student = %entry.payload().student_id,
            order = %entry.order_number(),
            "delivered"
        );
        Ok(())
    }

    fn cancel_current(&self) {
        // Delivery here is instantaneous; there is never anything in
        // flight to abort.
    }
}

fn mark(student_id: &str, mode: RegistrationMode, offset_seconds: i64) -> AttendanceMark {
    AttendanceMark {
        student_id: student_id.to_string(),
        actor_kind: ActorKind::Student,
        attendance_kind: AttendanceKind::SecondaryStudent,
        registration_mode: mode,
        offset_seconds,
        education_level: "secondary".to_string(),
        grade: "3".to_string(),
        section: "B".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<(), SatchelError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,satchel_core=debug".into()),
        )
        .init();

    let demo = DemoConfig::from_env();

    let repository: Arc<dyn QueueRepository<AttendanceMark>> = match &demo.db_path {
        Some(path) => Arc::new(SqliteRepository::open(path).await?),
        None => Arc::new(MemoryRepository::new()),
    };

    let queue = SubmissionQueue::new(
        repository,
        Arc::new(FlakyProcessor::new(2)),
        QueueConfig {
            auto_start: false,
            concurrency: demo.concurrency,
            retry_delay: Duration::from_millis(demo.retry_delay_ms),
            max_retries: demo.max_retries,
        },
    )
    .await?;

    let mut failures = queue
        .failures()
        .await
        .expect("first take of the failure receiver");

    let n = queue
        .enqueue(mark("S1", RegistrationMode::Entry, -120))
        .await?;
    tracing::info!(order = %n, "enqueued S1");
    let n = queue.enqueue(mark("S2", RegistrationMode::Entry, 45)).await?;
    tracing::info!(order = %n, "enqueued S2");
    let n = queue.enqueue(mark("S3", RegistrationMode::Exit, 0)).await?;
    tracing::info!(order = %n, "enqueued S3");

    queue.start().await;

    while queue.count().await? > 0 {
        sleep(Duration::from_millis(50)).await;
    }
    queue.drain().await;

    while let Ok(failure) = failures.try_recv() {
        tracing::warn!(
            student = %failure.entry.payload().student_id,
            attempts = failure.attempts,
            error = %failure.error,
            "permanent failure"
        );
    }

    tracing::info!(pending = queue.count().await?, "queue empty, demo done");
    Ok(())
}
