//! Transactional outbox.
//!
//! Rows are written by [`crate::repository::ResourceRepository`] in the same
//! transaction as the `last_modified` update and drained by the notifier's
//! publisher. `processed_at` is set at most once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use linkwatch_common::types::{OutboxMessage, OutboxStats};

use crate::StoreError;

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Oldest pending rows, ordered by `created_at` then `id`.
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<OutboxMessage>, StoreError>;

    /// Set `processed_at` if still pending. Returns `false` if the row was
    /// already processed (or does not exist).
    async fn mark_processed(&self, id: i64, at: DateTime<Utc>) -> Result<bool, StoreError>;

    async fn stats(&self) -> Result<OutboxStats, StoreError>;

    /// Delete processed rows older than `cutoff`. Pending rows are never
    /// touched. Returns the number of rows deleted.
    async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[derive(Clone)]
pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<OutboxMessage>, StoreError> {
        let rows = sqlx::query_as::<_, OutboxMessage>(
            r#"
            SELECT id, topic, message_key, payload, created_at, processed_at
            FROM outbox
            WHERE processed_at IS NULL
            ORDER BY created_at, id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn mark_processed(&self, id: i64, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE outbox SET processed_at = $2 WHERE id = $1 AND processed_at IS NULL")
                .bind(id)
                .bind(at)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn stats(&self) -> Result<OutboxStats, StoreError> {
        let (pending, processed, oldest_pending_at): (i64, i64, Option<DateTime<Utc>>) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*) FILTER (WHERE processed_at IS NULL),
                    COUNT(*) FILTER (WHERE processed_at IS NOT NULL),
                    MIN(created_at) FILTER (WHERE processed_at IS NULL)
                FROM outbox
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(OutboxStats {
            pending,
            processed,
            oldest_pending_at,
        })
    }

    async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM outbox WHERE processed_at IS NOT NULL AND processed_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
