use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use linkwatch_common::config::{AppConfig, DispatchMode};
use linkwatch_common::db;
use linkwatch_engine::dispatcher::{DeliveryMode, HttpNotificationSink, UpdateDispatcher};
use linkwatch_engine::repository::{PgResourceRepository, ResourceRepository};
use linkwatch_providers::UpdateRouter;
use linkwatch_providers::client::{HttpSourceClient, SourceSettings};
use linkwatch_scheduler::{BatchScheduler, SchedulerSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "linkwatch_scheduler=info,linkwatch_engine=info,linkwatch_providers=info".into()
            }),
        )
        .json()
        .init();

    tracing::info!("LinkWatch scheduler starting...");

    let config = AppConfig::from_env()?;

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await?;

    let github = HttpSourceClient::new(SourceSettings::github(&config))?;
    let stackoverflow = HttpSourceClient::new(SourceSettings::stackoverflow(&config))?;
    let router = Arc::new(UpdateRouter::with_defaults(
        Arc::new(github),
        Arc::new(stackoverflow),
    )?);
    tracing::info!(router = ?router, "Activity providers registered");

    let mode = match config.dispatch_mode {
        DispatchMode::Direct => {
            let url = config
                .bot_updates_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("BOT_UPDATES_URL is required in direct mode"))?;
            let timeout = Duration::from_millis(config.source_read_timeout_ms);
            DeliveryMode::Direct(Arc::new(HttpNotificationSink::new(url, timeout)?))
        }
        DispatchMode::Outbox => DeliveryMode::Outbox {
            topic: config.outbox_topic.clone(),
        },
    };
    tracing::info!(mode = ?mode, "Dispatch mode selected");

    let repository: Arc<dyn ResourceRepository> = Arc::new(PgResourceRepository::new(pool));
    let dispatcher = Arc::new(UpdateDispatcher::new(repository.clone(), mode));
    let scheduler = BatchScheduler::new(
        repository,
        router,
        dispatcher,
        SchedulerSettings::from_config(&config),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, finishing current batch...");
    let _ = shutdown_tx.send(true);

    worker.await??;
    tracing::info!("LinkWatch scheduler stopped.");
    Ok(())
}
