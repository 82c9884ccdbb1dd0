use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use linkwatch_common::error::AppError;
use linkwatch_common::types::OutboxStats;
use linkwatch_engine::StoreError;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/outbox/stats", get(outbox_stats))
}

/// GET /api/outbox/stats — backlog size and age of the oldest pending row.
async fn outbox_stats(State(state): State<AppState>) -> Result<Json<OutboxStats>, AppError> {
    let stats = state.outbox.stats().await.map_err(|e| match e {
        StoreError::Database(e) => AppError::Database(e),
        other => AppError::Internal(other.to_string()),
    })?;
    Ok(Json(stats))
}
