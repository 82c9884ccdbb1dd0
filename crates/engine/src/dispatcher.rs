//! Dispatch decision.
//!
//! Given a claimed link and the activity its provider reported:
//! 1. Compare the observed timestamp against the stored `last_modified`
//! 2. Resolve the link's subscribers
//! 3. Persist the new `last_modified` and either deliver directly or stage
//!    the notification in the outbox

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use linkwatch_common::error::AppError;
use linkwatch_common::types::{ActivityDetail, NewOutboxMessage, NotificationEvent, TrackedResource};

use crate::StoreError;
use crate::repository::ResourceRepository;

/// `true` when `observed` is strictly newer than the stored timestamp, or
/// nothing has been stored yet.
pub fn is_new_activity(last_modified: Option<DateTime<Utc>>, observed: DateTime<Utc>) -> bool {
    match last_modified {
        None => true,
        Some(previous) => observed > previous,
    }
}

/// Synchronous delivery target used in direct mode.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &NotificationEvent) -> anyhow::Result<()>;
}

/// POSTs events as JSON to the bot's update endpoint.
pub struct HttpNotificationSink {
    client: reqwest::Client,
    url: String,
}

impl HttpNotificationSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("linkwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationSink for HttpNotificationSink {
    async fn deliver(&self, event: &NotificationEvent) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(event)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

pub enum DeliveryMode {
    /// Persist, then call the sink once. No retry.
    Direct(Arc<dyn NotificationSink>),
    /// Persist and stage in the outbox in one transaction.
    Outbox { topic: String },
}

impl std::fmt::Debug for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryMode::Direct(_) => f.write_str("Direct"),
            DeliveryMode::Outbox { topic } => f.debug_struct("Outbox").field("topic", topic).finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Observed activity is not newer than `last_modified`.
    Unchanged,
    Delivered,
    /// `last_modified` was persisted but the sink call failed.
    DeliveryFailed,
    Enqueued { outbox_id: i64 },
    /// New activity on a link nobody follows; `last_modified` was persisted.
    NoSubscribers,
}

impl DispatchOutcome {
    /// Whether a notification was handed off (delivered or staged).
    pub fn is_notified(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered | DispatchOutcome::Enqueued { .. })
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("link {link_id} was modified concurrently")]
    VersionConflict { link_id: i64 },

    #[error(transparent)]
    Store(StoreError),

    #[error("failed to encode notification: {0}")]
    Encode(#[from] AppError),
}

impl From<StoreError> for DispatchError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::VersionConflict { link_id, .. } => DispatchError::VersionConflict { link_id },
            other => DispatchError::Store(other),
        }
    }
}

pub struct UpdateDispatcher {
    repository: Arc<dyn ResourceRepository>,
    mode: DeliveryMode,
}

impl UpdateDispatcher {
    pub fn new(repository: Arc<dyn ResourceRepository>, mode: DeliveryMode) -> Self {
        Self { repository, mode }
    }

    /// Decide whether `detail` is news for `resource` and act on it.
    pub async fn dispatch(
        &self,
        resource: &TrackedResource,
        detail: &ActivityDetail,
    ) -> Result<DispatchOutcome, DispatchError> {
        if !is_new_activity(resource.last_modified, detail.occurred_at) {
            tracing::debug!(
                link_id = resource.id,
                observed = %detail.occurred_at,
                "No new activity"
            );
            return Ok(DispatchOutcome::Unchanged);
        }

        let subscribers = self.repository.subscribers(resource.id).await?;
        if subscribers.is_empty() {
            self.repository
                .persist_last_modified(resource.id, resource.version, detail.occurred_at)
                .await?;
            tracing::debug!(link_id = resource.id, "New activity on link without subscribers");
            return Ok(DispatchOutcome::NoSubscribers);
        }

        let event = NotificationEvent {
            id: resource.id,
            url: resource.url.clone(),
            description: detail.description.clone(),
            occurred_at: detail.occurred_at,
            subscriber_ids: subscribers,
        };

        match &self.mode {
            DeliveryMode::Direct(sink) => {
                self.repository
                    .persist_last_modified(resource.id, resource.version, detail.occurred_at)
                    .await?;

                match sink.deliver(&event).await {
                    Ok(()) => {
                        tracing::info!(
                            link_id = resource.id,
                            subscribers = event.subscriber_ids.len(),
                            "Update delivered"
                        );
                        Ok(DispatchOutcome::Delivered)
                    }
                    Err(e) => {
                        tracing::warn!(
                            link_id = resource.id,
                            error = %e,
                            "Update delivery failed, not retrying"
                        );
                        Ok(DispatchOutcome::DeliveryFailed)
                    }
                }
            }
            DeliveryMode::Outbox { topic } => {
                let message = NewOutboxMessage::for_event(topic, &event)?;
                let outbox_id = self
                    .repository
                    .persist_last_modified_with_outbox(
                        resource.id,
                        resource.version,
                        detail.occurred_at,
                        message,
                    )
                    .await?;
                tracing::info!(link_id = resource.id, outbox_id, "Update staged in outbox");
                Ok(DispatchOutcome::Enqueued { outbox_id })
            }
        }
    }
}
