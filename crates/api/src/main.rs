//! LinkWatch operational API binary entrypoint.

use std::net::SocketAddr;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use linkwatch_common::config::AppConfig;
use linkwatch_common::db::create_pool;
use linkwatch_common::redis_pool::create_redis_pool;

use linkwatch_api::routes::create_router;
use linkwatch_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("linkwatch_api=debug,linkwatch_engine=info,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting LinkWatch API server...");

    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    let redis = create_redis_pool(&config.redis_url).await?;

    let addr: SocketAddr = config.api_bind_addr.parse()?;
    let state = AppState::new(pool, redis);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received shutdown signal, stopping API server...");
        })
        .await?;

    Ok(())
}
