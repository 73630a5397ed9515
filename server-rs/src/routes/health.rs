use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::clock::Clock;
use crate::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let db_ok = match &state.db {
        Some(pool) => Some(
            sqlx::query_scalar::<_, i32>("SELECT 1")
                .fetch_one(pool)
                .await
                .is_ok(),
        ),
        None => None,
    };
    let redis_ok = match &state.cache {
        Some(cache) => Some(cache.health_check().await),
        None => None,
    };

    let healthy = db_ok.unwrap_or(true) && redis_ok.unwrap_or(true);
    Json(json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "postgres": db_ok,
        "redis": redis_ok,
        "timestamp": state.clock.now(),
    }))
}
