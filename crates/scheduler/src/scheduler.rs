use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use linkwatch_common::config::{AppConfig, ProcessorMode};
use linkwatch_common::types::TrackedResource;
use linkwatch_engine::dispatcher::{DispatchError, DispatchOutcome, UpdateDispatcher};
use linkwatch_engine::repository::ResourceRepository;
use linkwatch_providers::{RouteError, UpdateRouter};

/// How a claimed batch is drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// One worker, claim order.
    Sequential,
    /// At most `pool_size` resources in flight.
    Parallel { pool_size: usize },
}

impl ExecutionStrategy {
    pub fn from_config(config: &AppConfig) -> Self {
        match config.processor_mode {
            ProcessorMode::Sequential => ExecutionStrategy::Sequential,
            ProcessorMode::Parallel => ExecutionStrategy::Parallel {
                pool_size: config.processor_pool_size.max(1),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub staleness: Duration,
    pub batch_limit: i64,
    pub resource_timeout: Duration,
    pub strategy: ExecutionStrategy,
}

impl SchedulerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.scheduler_interval_ms),
            staleness: Duration::from_secs(config.staleness_seconds),
            batch_limit: config.batch_limit,
            resource_timeout: Duration::from_secs(config.resource_timeout_secs),
            strategy: ExecutionStrategy::from_config(config),
        }
    }
}

/// Per-batch tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub claimed: usize,
    /// Delivered directly or staged in the outbox.
    pub notified: usize,
    /// No new activity, or new activity on a link without subscribers.
    pub unchanged: usize,
    /// Provider, dispatch or timeout failures plus undecodable registry rows.
    pub failed: usize,
}

impl BatchReport {
    fn record(&mut self, result: &Result<DispatchOutcome, ProcessError>) {
        match result {
            Ok(outcome) if outcome.is_notified() => self.notified += 1,
            Ok(DispatchOutcome::DeliveryFailed) | Err(_) => self.failed += 1,
            Ok(_) => self.unchanged += 1,
        }
    }
}

#[derive(Debug, Error)]
enum ProcessError {
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Periodically claims stale links, asks the router for their latest
/// activity and hands the result to the dispatcher.
pub struct BatchScheduler {
    repository: Arc<dyn ResourceRepository>,
    router: Arc<UpdateRouter>,
    dispatcher: Arc<UpdateDispatcher>,
    settings: SchedulerSettings,
}

impl BatchScheduler {
    pub fn new(
        repository: Arc<dyn ResourceRepository>,
        router: Arc<UpdateRouter>,
        dispatcher: Arc<UpdateDispatcher>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            repository,
            router,
            dispatcher,
            settings,
        }
    }

    /// Run batches on a fixed interval until `shutdown` flips to `true`.
    ///
    /// A batch in flight is always finished; no batch starts after the signal.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_ms = self.settings.interval.as_millis() as u64,
            staleness_secs = self.settings.staleness.as_secs(),
            batch_limit = self.settings.batch_limit,
            strategy = ?self.settings.strategy,
            "Batch scheduler started"
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
                    match self.run_batch().await {
                        Ok(report) if report.claimed > 0 => {
                            tracing::info!(
                                claimed = report.claimed,
                                notified = report.notified,
                                unchanged = report.unchanged,
                                failed = report.failed,
                                "Batch complete"
                            );
                        }
                        Ok(_) => tracing::debug!("No links due"),
                        // Claim failures leave every row untouched; retry next tick.
                        Err(e) => tracing::error!(error = %e, "Batch failed"),
                    }
                }
            }
        }

        tracing::info!("Batch scheduler stopped");
        Ok(())
    }

    /// Claim one batch of due links and process every one of them.
    pub async fn run_batch(&self) -> anyhow::Result<BatchReport> {
        let batch = self
            .repository
            .claim_due(self.settings.staleness, self.settings.batch_limit)
            .await?;

        // Undecodable rows were claimed too; they count against the batch.
        let mut report = BatchReport {
            claimed: batch.len(),
            failed: batch.malformed,
            ..Default::default()
        };
        let claimed = batch.resources;
        if claimed.is_empty() {
            return Ok(report);
        }

        match self.settings.strategy {
            ExecutionStrategy::Sequential => {
                for resource in claimed {
                    let result = self.process(resource).await;
                    report.record(&result);
                }
            }
            ExecutionStrategy::Parallel { pool_size } => {
                let permits = Arc::new(Semaphore::new(pool_size));
                let mut workers = JoinSet::new();

                for resource in claimed {
                    let permit = permits.clone().acquire_owned().await?;
                    let router = self.router.clone();
                    let dispatcher = self.dispatcher.clone();
                    let timeout = self.settings.resource_timeout;
                    workers.spawn(async move {
                        let _permit = permit;
                        process_resource(&router, &dispatcher, resource, timeout).await
                    });
                }

                while let Some(joined) = workers.join_next().await {
                    match joined {
                        Ok(result) => report.record(&result),
                        Err(e) => {
                            tracing::error!(error = %e, "Worker task panicked");
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    async fn process(&self, resource: TrackedResource) -> Result<DispatchOutcome, ProcessError> {
        process_resource(
            &self.router,
            &self.dispatcher,
            resource,
            self.settings.resource_timeout,
        )
        .await
    }
}

/// Provider call plus dispatch for one link, bounded by `timeout`.
///
/// Failures are logged here so the batch can carry on.
async fn process_resource(
    router: &UpdateRouter,
    dispatcher: &UpdateDispatcher,
    resource: TrackedResource,
    timeout: Duration,
) -> Result<DispatchOutcome, ProcessError> {
    let work = async {
        let detail = router.latest_activity(&resource).await?;
        Ok::<_, ProcessError>(dispatcher.dispatch(&resource, &detail).await?)
    };

    let result = match tokio::time::timeout(timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(ProcessError::Timeout(timeout)),
    };

    if let Err(e) = &result {
        tracing::warn!(
            link_id = resource.id,
            link_type = %resource.link_type(),
            url = %resource.url,
            error = %e,
            "Failed to process link"
        );
    }
    result
}
