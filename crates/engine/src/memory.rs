//! In-memory registry and outbox.
//!
//! Mirrors the Postgres semantics (claim ordering, version checks, atomic
//! outbox writes, write-once `processed_at`) behind a single mutex. Used by
//! tests and local runs without a database.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use linkwatch_common::types::{NewOutboxMessage, OutboxMessage, OutboxStats, TrackedResource};

use crate::StoreError;
use crate::outbox::OutboxStore;
use crate::repository::{ClaimedBatch, ResourceRepository};

#[derive(Default)]
struct State {
    links: BTreeMap<i64, TrackedResource>,
    subscriptions: HashMap<i64, BTreeSet<i64>>,
    outbox: BTreeMap<i64, OutboxMessage>,
    next_outbox_id: i64,
}

impl State {
    fn check_version(&mut self, link_id: i64, version: i64) -> Result<&mut TrackedResource, StoreError> {
        match self.links.get_mut(&link_id) {
            Some(link) if link.version == version => Ok(link),
            _ => Err(StoreError::VersionConflict {
                link_id,
                expected: version,
            }),
        }
    }

    fn push_outbox(&mut self, message: NewOutboxMessage) -> i64 {
        self.next_outbox_id += 1;
        let id = self.next_outbox_id;
        self.outbox.insert(
            id,
            OutboxMessage {
                id,
                topic: message.topic,
                message_key: message.message_key,
                payload: message.payload,
                created_at: Utc::now(),
                processed_at: None,
            },
        );
        id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_link(&self, resource: TrackedResource) {
        self.state.lock().await.links.insert(resource.id, resource);
    }

    pub async fn subscribe(&self, link_id: i64, chat_id: i64) {
        self.state
            .lock()
            .await
            .subscriptions
            .entry(link_id)
            .or_default()
            .insert(chat_id);
    }

    pub async fn link(&self, link_id: i64) -> Option<TrackedResource> {
        self.state.lock().await.links.get(&link_id).cloned()
    }

    /// Make a link due again regardless of when it was last checked.
    pub async fn expire_link(&self, link_id: i64) {
        if let Some(link) = self.state.lock().await.links.get_mut(&link_id) {
            link.last_checked = DateTime::<Utc>::UNIX_EPOCH;
        }
    }

    /// Stage an outbox row with no link attached, for exercising consumers.
    pub async fn seed_outbox(&self, message: NewOutboxMessage) -> i64 {
        self.state.lock().await.push_outbox(message)
    }

    /// Every outbox row, pending or not, in id order.
    pub async fn outbox(&self) -> Vec<OutboxMessage> {
        self.state.lock().await.outbox.values().cloned().collect()
    }
}

#[async_trait]
impl ResourceRepository for MemoryStore {
    async fn claim_due(
        &self,
        staleness: Duration,
        limit: i64,
    ) -> Result<ClaimedBatch, StoreError> {
        let now = Utc::now();
        let staleness = chrono::Duration::from_std(staleness).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(staleness).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut state = self.state.lock().await;
        let mut due: Vec<&mut TrackedResource> = state
            .links
            .values_mut()
            .filter(|link| link.last_checked < cutoff)
            .collect();
        due.sort_by_key(|link| (link.last_checked, link.id));

        let limit = usize::try_from(limit).unwrap_or(0);
        let resources = due
            .into_iter()
            .take(limit)
            .map(|link| {
                link.last_checked = now;
                link.version += 1;
                link.clone()
            })
            .collect();
        Ok(ClaimedBatch {
            resources,
            malformed: 0,
        })
    }

    async fn persist_last_modified(
        &self,
        link_id: i64,
        version: i64,
        last_modified: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.check_version(link_id, version)?.last_modified = Some(last_modified);
        Ok(())
    }

    async fn persist_last_modified_with_outbox(
        &self,
        link_id: i64,
        version: i64,
        last_modified: DateTime<Utc>,
        message: NewOutboxMessage,
    ) -> Result<i64, StoreError> {
        let mut state = self.state.lock().await;
        state.check_version(link_id, version)?.last_modified = Some(last_modified);
        Ok(state.push_outbox(message))
    }

    async fn subscribers(&self, link_id: i64) -> Result<BTreeSet<i64>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .subscriptions
            .get(&link_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl OutboxStore for MemoryStore {
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<OutboxMessage>, StoreError> {
        let state = self.state.lock().await;
        let mut pending: Vec<OutboxMessage> = state
            .outbox
            .values()
            .filter(|m| m.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|m| (m.created_at, m.id));
        pending.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(pending)
    }

    async fn mark_processed(&self, id: i64, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.outbox.get_mut(&id) {
            Some(message) if message.processed_at.is_none() => {
                message.processed_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn stats(&self) -> Result<OutboxStats, StoreError> {
        let state = self.state.lock().await;
        let mut stats = OutboxStats::default();
        for message in state.outbox.values() {
            if message.is_pending() {
                stats.pending += 1;
                stats.oldest_pending_at = Some(match stats.oldest_pending_at {
                    Some(oldest) => oldest.min(message.created_at),
                    None => message.created_at,
                });
            } else {
                stats.processed += 1;
            }
        }
        Ok(stats)
    }

    async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.outbox.len();
        state
            .outbox
            .retain(|_, m| m.processed_at.is_none_or(|at| at >= cutoff));
        Ok((before - state.outbox.len()) as u64)
    }
}
