use std::sync::Arc;

use tokio::sync::watch;

use linkwatch_common::config::AppConfig;
use linkwatch_common::db;
use linkwatch_common::redis_pool::create_redis_pool;
use linkwatch_engine::outbox::PgOutboxStore;
use linkwatch_notifier::broker::RedisStreamBroker;
use linkwatch_notifier::publisher::OutboxPublisher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linkwatch_notifier=info,linkwatch_engine=info".into()),
        )
        .json()
        .init();

    tracing::info!("LinkWatch outbox publisher starting...");

    let config = AppConfig::from_env()?;

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await?;

    let redis = create_redis_pool(&config.redis_url).await?;
    let broker = RedisStreamBroker::new(redis, config.broker_stream_maxlen);

    let publisher = OutboxPublisher::from_config(
        Arc::new(PgOutboxStore::new(pool)),
        Arc::new(broker),
        &config,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(async move { publisher.run(shutdown_rx).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, finishing current cycle...");
    let _ = shutdown_tx.send(true);

    worker.await??;
    tracing::info!("LinkWatch outbox publisher stopped.");
    Ok(())
}
