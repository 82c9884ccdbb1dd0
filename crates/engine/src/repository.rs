//! Link registry access.
//!
//! The scheduler claims due links through [`ResourceRepository::claim_due`]
//! and the dispatcher records new activity with the `persist_*` operations.
//! Every write after a claim is checked against the version the claim
//! returned.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use linkwatch_common::types::{LinkRow, NewOutboxMessage, TrackedResource};

use crate::StoreError;

#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// Claim up to `limit` links not checked within `staleness`, oldest first.
    ///
    /// Claimed rows have `last_checked` advanced to now and their version
    /// bumped in the same statement, so concurrent claimers never receive the
    /// same row.
    async fn claim_due(&self, staleness: Duration, limit: i64) -> Result<ClaimedBatch, StoreError>;

    /// Record `last_modified` if the link is still at `version`.
    async fn persist_last_modified(
        &self,
        link_id: i64,
        version: i64,
        last_modified: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Record `last_modified` and stage `message` in the outbox atomically.
    ///
    /// Returns the outbox row id. On a version conflict nothing is written.
    async fn persist_last_modified_with_outbox(
        &self,
        link_id: i64,
        version: i64,
        last_modified: DateTime<Utc>,
        message: NewOutboxMessage,
    ) -> Result<i64, StoreError>;

    /// Chat ids subscribed to a link.
    async fn subscribers(&self, link_id: i64) -> Result<BTreeSet<i64>, StoreError>;
}

/// Links taken by one claim.
#[derive(Debug, Clone, Default)]
pub struct ClaimedBatch {
    pub resources: Vec<TrackedResource>,
    /// Claimed rows whose descriptor columns could not be decoded.
    pub malformed: usize,
}

impl ClaimedBatch {
    /// Every claimed row, usable or not.
    pub fn len(&self) -> usize {
        self.resources.len() + self.malformed
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Postgres-backed registry.
#[derive(Clone)]
pub struct PgResourceRepository {
    pool: PgPool,
}

impl PgResourceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Decode claimed rows, counting any whose descriptor columns are unusable.
fn into_batch(rows: Vec<LinkRow>) -> ClaimedBatch {
    let mut batch = ClaimedBatch::default();
    for row in rows {
        let link_id = row.id;
        match TrackedResource::try_from(row) {
            Ok(resource) => batch.resources.push(resource),
            Err(e) => {
                tracing::error!(link_id, error = %e, "Skipping malformed link");
                batch.malformed += 1;
            }
        }
    }
    batch
}

#[async_trait]
impl ResourceRepository for PgResourceRepository {
    async fn claim_due(
        &self,
        staleness: Duration,
        limit: i64,
    ) -> Result<ClaimedBatch, StoreError> {
        let rows: Vec<LinkRow> = sqlx::query_as(
            r#"
            WITH due AS (
                SELECT id, last_checked AS previously_checked
                FROM links
                WHERE last_checked < NOW() - make_interval(secs => $1)
                ORDER BY last_checked, id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            ),
            claimed AS (
                UPDATE links l
                SET last_checked = NOW(), version = l.version + 1
                FROM due
                WHERE l.id = due.id
                RETURNING l.id, l.url, l.link_type, l.owner, l.repo, l.item_number,
                          l.question_id, l.last_modified, l.last_checked, l.version,
                          due.previously_checked
            )
            SELECT id, url, link_type, owner, repo, item_number, question_id,
                   last_modified, last_checked, version
            FROM claimed
            ORDER BY previously_checked, id
            "#,
        )
        .bind(staleness.as_secs_f64())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(claimed = rows.len(), limit, "Claimed due links");
        Ok(into_batch(rows))
    }

    async fn persist_last_modified(
        &self,
        link_id: i64,
        version: i64,
        last_modified: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE links SET last_modified = $3 WHERE id = $1 AND version = $2")
            .bind(link_id)
            .bind(version)
            .bind(last_modified)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::VersionConflict {
                link_id,
                expected: version,
            });
        }
        Ok(())
    }

    async fn persist_last_modified_with_outbox(
        &self,
        link_id: i64,
        version: i64,
        last_modified: DateTime<Utc>,
        message: NewOutboxMessage,
    ) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE links SET last_modified = $3 WHERE id = $1 AND version = $2")
            .bind(link_id)
            .bind(version)
            .bind(last_modified)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::VersionConflict {
                link_id,
                expected: version,
            });
        }

        let outbox_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO outbox (topic, message_key, payload)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(&message.topic)
        .bind(&message.message_key)
        .bind(&message.payload)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(outbox_id)
    }

    async fn subscribers(&self, link_id: i64) -> Result<BTreeSet<i64>, StoreError> {
        let chat_ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT c.chat_id
            FROM chat_links cl
            JOIN chats c ON c.id = cl.chat_id
            WHERE cl.link_id = $1
            "#,
        )
        .bind(link_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(chat_ids.into_iter().collect())
    }
}
