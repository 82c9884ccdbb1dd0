//! One-shot retention job: deletes processed outbox rows older than
//! `OUTBOX_RETENTION_HOURS`. Pending rows are never touched.

use std::time::Duration;

use chrono::Utc;

use linkwatch_common::config::AppConfig;
use linkwatch_common::db;
use linkwatch_engine::outbox::{OutboxStore, PgOutboxStore};
use linkwatch_notifier::retention::purge_cutoff;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linkwatch_outbox_purge=info".into()),
        )
        .init();

    let config = AppConfig::from_env()?;
    let pool = db::create_pool(&config.database_url, 2).await?;
    db::run_migrations(&pool).await?;

    let store = PgOutboxStore::new(pool);
    let cutoff = purge_cutoff(
        Utc::now(),
        Duration::from_secs(config.outbox_retention_hours.saturating_mul(3600)),
    );

    let before = store.stats().await?;
    let deleted = store.purge_processed_before(cutoff).await?;

    tracing::info!(
        deleted,
        cutoff = %cutoff,
        pending = before.pending,
        "Outbox purge complete"
    );
    Ok(())
}
