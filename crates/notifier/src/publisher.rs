//! Outbox publisher.
//!
//! Drains pending outbox rows to the broker in `created_at` order. A row is
//! marked processed only after the broker acknowledged it, so a crash between
//! the two steps republishes that row once on the next cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use linkwatch_common::config::AppConfig;
use linkwatch_engine::outbox::OutboxStore;

use crate::broker::MessageBroker;

/// Result of one publish cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub fetched: usize,
    pub published: usize,
    /// Published but not marked; these rows will be published again.
    pub mark_failed: usize,
    /// A publish failed and the rest of the batch was left for the next cycle.
    pub halted: bool,
}

pub struct OutboxPublisher {
    store: Arc<dyn OutboxStore>,
    broker: Arc<dyn MessageBroker>,
    batch_size: i64,
    poll_interval: Duration,
}

impl OutboxPublisher {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        broker: Arc<dyn MessageBroker>,
        batch_size: i64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            broker,
            batch_size,
            poll_interval,
        }
    }

    pub fn from_config(
        store: Arc<dyn OutboxStore>,
        broker: Arc<dyn MessageBroker>,
        config: &AppConfig,
    ) -> Self {
        Self::new(
            store,
            broker,
            config.publisher_batch_size,
            Duration::from_millis(config.publisher_poll_interval_ms),
        )
    }

    /// Publish one batch of pending rows.
    pub async fn publish_batch(&self) -> anyhow::Result<PublishReport> {
        let pending = self.store.fetch_pending(self.batch_size).await?;
        let mut report = PublishReport {
            fetched: pending.len(),
            ..Default::default()
        };

        for message in &pending {
            if let Err(e) = self
                .broker
                .publish(&message.topic, &message.message_key, &message.payload)
                .await
            {
                tracing::warn!(
                    outbox_id = message.id,
                    topic = %message.topic,
                    error = %e,
                    "Publish failed, leaving row pending"
                );
                report.halted = true;
                break;
            }
            report.published += 1;

            match self.store.mark_processed(message.id, Utc::now()).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(outbox_id = message.id, "Row already marked processed");
                }
                Err(e) => {
                    tracing::warn!(
                        outbox_id = message.id,
                        error = %e,
                        "Failed to mark row processed, it will be republished"
                    );
                    report.mark_failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Run publish cycles until `shutdown` flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            batch_size = self.batch_size,
            "Outbox publisher started"
        );

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.publish_batch().await {
                        Ok(report) if report.fetched > 0 => {
                            tracing::info!(
                                fetched = report.fetched,
                                published = report.published,
                                mark_failed = report.mark_failed,
                                halted = report.halted,
                                "Publish cycle complete"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Publish cycle failed"),
                    }
                }
            }
        }

        tracing::info!("Outbox publisher stopped");
        Ok(())
    }
}
