use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Clock, SystemClock};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    DeadLetter, Envelope, MessageId, MessagingError, Result,
    memory::DEFAULT_VISIBILITY_TIMEOUT_SECS, queue::MessageQueue,
};

/// PostgreSQL-backed queue.
///
/// Leasing uses `FOR UPDATE SKIP LOCKED`, so any number of workers (in any
/// number of processes) can poll the same table without two of them
/// leasing the same row at once.
#[derive(Clone)]
pub struct PostgresMessageQueue {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    visibility_timeout: chrono::Duration,
}

impl PostgresMessageQueue {
    /// Creates a new PostgreSQL queue.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
            visibility_timeout: chrono::Duration::seconds(DEFAULT_VISIBILITY_TIMEOUT_SECS),
        }
    }

    /// Uses the given clock for publish times and lease expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets how long a lease lasts before the message is redelivered.
    pub fn with_visibility_timeout(mut self, timeout: chrono::Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_envelope(row: &PgRow) -> Result<Envelope> {
        let attempts: i32 = row.try_get("attempts")?;
        Ok(Envelope {
            id: MessageId::from_uuid(row.try_get::<Uuid, _>("id")?),
            message_type: row.try_get("message_type")?,
            payload: row.try_get("payload")?,
            attempts: u32::try_from(attempts).unwrap_or_default(),
            enqueued_at: row.try_get("enqueued_at")?,
            available_at: row.try_get("available_at")?,
            last_error: row.try_get("last_error")?,
        })
    }

    fn row_to_dead_letter(row: &PgRow) -> Result<DeadLetter> {
        Ok(DeadLetter {
            envelope: Self::row_to_envelope(row)?,
            error: row.try_get("error")?,
            failed_at: row.try_get("failed_at")?,
        })
    }
}

fn attempts_column(attempts: u32) -> i32 {
    i32::try_from(attempts).unwrap_or(i32::MAX)
}

#[async_trait]
impl MessageQueue for PostgresMessageQueue {
    async fn publish(
        &self,
        message_type: &str,
        payload: serde_json::Value,
    ) -> Result<MessageId> {
        let id = MessageId::new();
        let now = self.clock.now();

        sqlx::query(
            r#"
            INSERT INTO message_queue (id, message_type, payload, attempts, enqueued_at, available_at)
            VALUES ($1, $2, $3, 0, $4, $4)
            "#,
        )
        .bind(id.as_uuid())
        .bind(message_type)
        .bind(&payload)
        .bind(now)
        .execute(&self.pool)
        .await?;

        tracing::debug!(message_id = %id, message_type, "message published");
        Ok(id)
    }

    async fn receive(&self) -> Result<Option<Envelope>> {
        let now = self.clock.now();
        let lease_until = now + self.visibility_timeout;

        let row = sqlx::query(
            r#"
            UPDATE message_queue
            SET attempts = attempts + 1, leased_until = $1
            WHERE id = (
                SELECT id FROM message_queue
                WHERE available_at <= $2
                  AND (leased_until IS NULL OR leased_until <= $2)
                ORDER BY available_at ASC, seq ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, message_type, payload, attempts, enqueued_at, available_at, last_error
            "#,
        )
        .bind(lease_until)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_envelope).transpose()
    }

    async fn ack(&self, id: MessageId, attempt: u32) -> Result<()> {
        let result = sqlx::query("DELETE FROM message_queue WHERE id = $1 AND attempts = $2")
            .bind(id.as_uuid())
            .bind(attempts_column(attempt))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(message_id = %id, attempt, "stale lease, ack ignored");
        }
        Ok(())
    }

    async fn retry(
        &self,
        id: MessageId,
        attempt: u32,
        error: &str,
        available_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE message_queue
            SET leased_until = NULL, available_at = $3, last_error = $4
            WHERE id = $1 AND attempts = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(attempts_column(attempt))
        .bind(available_at)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(message_id = %id, attempt, "stale lease, retry ignored");
        }
        Ok(())
    }

    async fn dead_letter(&self, id: MessageId, attempt: u32, error: &str) -> Result<()> {
        let failed_at = self.clock.now();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            DELETE FROM message_queue WHERE id = $1 AND attempts = $2
            RETURNING id, message_type, payload, attempts, enqueued_at, available_at, last_error
            "#,
        )
        .bind(id.as_uuid())
        .bind(attempts_column(attempt))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tracing::debug!(message_id = %id, attempt, "stale lease, dead letter ignored");
            return Ok(());
        };

        let envelope = Self::row_to_envelope(&row)?;

        sqlx::query(
            r#"
            INSERT INTO dead_letters
                (id, message_type, payload, attempts, enqueued_at, available_at, last_error, error, failed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $8)
            "#,
        )
        .bind(envelope.id.as_uuid())
        .bind(&envelope.message_type)
        .bind(&envelope.payload)
        .bind(attempts_column(envelope.attempts))
        .bind(envelope.enqueued_at)
        .bind(envelope.available_at)
        .bind(error)
        .bind(failed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let rows = sqlx::query(
            r#"
            SELECT id, message_type, payload, attempts, enqueued_at, available_at, last_error, error, failed_at
            FROM dead_letters
            ORDER BY failed_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_dead_letter).collect()
    }

    async fn requeue_dead_letter(&self, id: MessageId) -> Result<()> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            DELETE FROM dead_letters WHERE id = $1
            RETURNING id, message_type, payload, enqueued_at
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(MessagingError::MessageNotFound(id))?;

        let message_type: String = row.try_get("message_type")?;
        let payload: serde_json::Value = row.try_get("payload")?;
        let enqueued_at: DateTime<Utc> = row.try_get("enqueued_at")?;

        sqlx::query(
            r#"
            INSERT INTO message_queue (id, message_type, payload, attempts, enqueued_at, available_at)
            VALUES ($1, $2, $3, 0, $4, $5)
            "#,
        )
        .bind(id.as_uuid())
        .bind(message_type)
        .bind(payload)
        .bind(enqueued_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn pending_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM message_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
