//! SQLite-backed repository implementation.

use std::marker::PhantomData;
use std::path::Path;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::domain::{OrderNumber, QueueEntry, QueuePayload};
use crate::error::SatchelError;
use crate::repository::QueueRepository;

/// Durable adapter over a single-file SQLite database.
///
/// Layout:
/// - `queue_entries(order_number INTEGER PRIMARY KEY, payload TEXT)`:
///   one row per pending entry, payload as JSON text.
/// - `queue_counter(id = 1, next_order)`: the monotonic allocation
///   counter. Kept separate from the entries table so deletes and
///   `clear_all` never make the counter regress.
///
/// `enqueue` bumps the counter and inserts the row in one transaction,
/// so a failed write leaves both tables untouched.
pub struct SqliteRepository<T> {
    pool: SqlitePool,
    _payload: PhantomData<fn() -> T>,
}

impl<T: QueuePayload> SqliteRepository<T> {
    /// Open (or create) the database at `path` and bootstrap the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SatchelError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        // One connection: SQLite serializes writers anyway, and a single
        // writer keeps enqueue's read-bump-insert transaction free of
        // busy-retry handling.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS queue_entries (
                order_number INTEGER PRIMARY KEY,
                payload TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS queue_counter (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                next_order INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO queue_counter (id, next_order) VALUES (1, 1)")
            .execute(&pool)
            .await?;

        Ok(Self {
            pool,
            _payload: PhantomData,
        })
    }

    fn decode_row(row: &sqlx::sqlite::SqliteRow) -> Result<QueueEntry<T>, SatchelError> {
        let order_number: i64 = row.get("order_number");
        let text: String = row.get("payload");
        let payload: T = serde_json::from_str(&text)?;
        Ok(QueueEntry::new(
            OrderNumber::new(order_number as u64),
            payload,
        ))
    }
}

#[async_trait]
impl<T: QueuePayload> QueueRepository<T> for SqliteRepository<T> {
    async fn enqueue(&self, payload: T) -> Result<OrderNumber, SatchelError> {
        let text = serde_json::to_string(&payload)?;

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT next_order FROM queue_counter WHERE id = 1")
            .fetch_one(&mut *tx)
            .await?;
        let next: i64 = row.get("next_order");

        sqlx::query("UPDATE queue_counter SET next_order = ? WHERE id = 1")
            .bind(next + 1)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO queue_entries (order_number, payload) VALUES (?, ?)")
            .bind(next)
            .bind(text)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(OrderNumber::new(next as u64))
    }

    async fn dequeue_first(&self) -> Result<bool, SatchelError> {
        let mut tx = self.pool.begin().await?;

        let first = sqlx::query("SELECT MIN(order_number) AS n FROM queue_entries")
            .fetch_one(&mut *tx)
            .await?
            .get::<Option<i64>, _>("n");

        let Some(first) = first else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM queue_entries WHERE order_number = ?")
            .bind(first)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn ordered_entries(&self) -> Result<Vec<QueueEntry<T>>, SatchelError> {
        let rows = sqlx::query(
            "SELECT order_number, payload FROM queue_entries ORDER BY order_number ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::decode_row).collect()
    }

    async fn get(
        &self,
        order_number: OrderNumber,
    ) -> Result<Option<QueueEntry<T>>, SatchelError> {
        let row = sqlx::query(
            "SELECT order_number, payload FROM queue_entries WHERE order_number = ?",
        )
        .bind(order_number.get() as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::decode_row).transpose()
    }

    async fn delete(&self, order_number: OrderNumber) -> Result<bool, SatchelError> {
        let result = sqlx::query("DELETE FROM queue_entries WHERE order_number = ?")
            .bind(order_number.get() as i64)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update(&self, entry: &QueueEntry<T>) -> Result<bool, SatchelError> {
        let text = serde_json::to_string(entry.payload())?;

        let result = sqlx::query("UPDATE queue_entries SET payload = ? WHERE order_number = ?")
            .bind(text)
            .bind(entry.order_number().get() as i64)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<usize, SatchelError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM queue_entries")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.get("n");
        Ok(n as usize)
    }

    async fn clear_all(&self) -> Result<usize, SatchelError> {
        let result = sqlx::query("DELETE FROM queue_entries")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn next_order_number(&self) -> Result<OrderNumber, SatchelError> {
        let row = sqlx::query("SELECT next_order FROM queue_counter WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        let next: i64 = row.get("next_order");
        Ok(OrderNumber::new(next as u64))
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::AttendanceMark;
    use crate::domain::{ActorKind, AttendanceKind, RegistrationMode};

    use super::*;

    fn mark(student_id: &str) -> AttendanceMark {
        AttendanceMark {
            student_id: student_id.to_string(),
            actor_kind: ActorKind::Student,
            attendance_kind: AttendanceKind::PrimaryStudent,
            registration_mode: RegistrationMode::Entry,
            offset_seconds: 30,
            education_level: "primary".to_string(),
            grade: "1".to_string(),
            section: "A".to_string(),
        }
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");

        let first_order;
        {
            let repo = SqliteRepository::<AttendanceMark>::open(&path).await.unwrap();
            first_order = repo.enqueue(mark("S1")).await.unwrap();
            repo.enqueue(mark("S2")).await.unwrap();
        }

        let repo = SqliteRepository::<AttendanceMark>::open(&path).await.unwrap();
        let entries = repo.ordered_entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].order_number(), first_order);
        assert_eq!(entries[0].payload().student_id, "S1");
        assert_eq!(entries[1].payload().student_id, "S2");
    }

    #[tokio::test]
    async fn counter_survives_clear_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");

        let last;
        {
            let repo = SqliteRepository::<AttendanceMark>::open(&path).await.unwrap();
            repo.enqueue(mark("S1")).await.unwrap();
            last = repo.enqueue(mark("S2")).await.unwrap();
            assert_eq!(repo.clear_all().await.unwrap(), 2);
            assert_eq!(repo.count().await.unwrap(), 0);
        }

        let repo = SqliteRepository::<AttendanceMark>::open(&path).await.unwrap();
        let next = repo.enqueue(mark("S3")).await.unwrap();
        // Allocation continues past cleared entries, never reusing a number.
        assert!(next > last);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SqliteRepository::<AttendanceMark>::open(dir.path().join("queue.db"))
            .await
            .unwrap();

        let n = repo.enqueue(mark("S1")).await.unwrap();
        assert!(repo.delete(n).await.unwrap());
        assert!(!repo.delete(n).await.unwrap());
    }

    #[tokio::test]
    async fn get_and_update_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SqliteRepository::<AttendanceMark>::open(dir.path().join("queue.db"))
            .await
            .unwrap();

        let n = repo.enqueue(mark("S1")).await.unwrap();
        assert!(repo.get(n).await.unwrap().is_some());

        let mut corrected = mark("S1");
        corrected.offset_seconds = -45;
        assert!(repo.update(&QueueEntry::new(n, corrected.clone())).await.unwrap());

        let fetched = repo.get(n).await.unwrap().unwrap();
        assert_eq!(fetched.payload().offset_seconds, -45);

        repo.delete(n).await.unwrap();
        assert!(repo.get(n).await.unwrap().is_none());
        assert!(!repo.update(&QueueEntry::new(n, corrected)).await.unwrap());
    }

    #[tokio::test]
    async fn dequeue_first_pops_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SqliteRepository::<AttendanceMark>::open(dir.path().join("queue.db"))
            .await
            .unwrap();

        repo.enqueue(mark("S1")).await.unwrap();
        repo.enqueue(mark("S2")).await.unwrap();

        assert!(repo.dequeue_first().await.unwrap());
        let entries = repo.ordered_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload().student_id, "S2");

        assert!(repo.dequeue_first().await.unwrap());
        assert!(!repo.dequeue_first().await.unwrap());
    }
}
