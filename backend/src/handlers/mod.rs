pub mod assets;
pub mod contracts;
pub mod email;
pub mod vendors;

use axum::{Json, extract::State};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::AppState;
use crate::database;

/// GET /health — liveness plus a database round trip.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let db_ok = database::health_check(&state.db_pool).await;
    Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "database": if db_ok { "up" } else { "down" },
    }))
}
