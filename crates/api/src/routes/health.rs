//! Health check endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let postgres = sqlx::query("SELECT 1").execute(&state.pool).await;
    if let Err(e) = &postgres {
        tracing::warn!(error = %e, "Postgres health check failed");
    }

    let mut redis = state.redis.clone();
    let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut redis).await;
    if let Err(e) = &pong {
        tracing::warn!(error = %e, "Redis health check failed");
    }

    health_report(postgres.is_ok(), pong.is_ok())
}

fn health_report(postgres_ok: bool, redis_ok: bool) -> (StatusCode, Json<Value>) {
    let check = |ok: bool| if ok { "ok" } else { "unavailable" };
    let healthy = postgres_ok && redis_ok;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if healthy { "ok" } else { "degraded" },
            "service": "linkwatch-api",
            "version": env!("CARGO_PKG_VERSION"),
            "checks": {
                "postgres": check(postgres_ok),
                "redis": check(redis_ok),
            }
        })),
    )
}
