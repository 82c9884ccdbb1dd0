//! Shared application state for the Axum API server.

use std::sync::Arc;

use linkwatch_engine::outbox::{OutboxStore, PgOutboxStore};
use redis::aio::ConnectionManager;
use sqlx::PgPool;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub redis: ConnectionManager,
    pub outbox: Arc<dyn OutboxStore>,
}

impl AppState {
    pub fn new(pool: PgPool, redis: ConnectionManager) -> Self {
        Self {
            outbox: Arc::new(PgOutboxStore::new(pool.clone())),
            pool,
            redis,
        }
    }
}
