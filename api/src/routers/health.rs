use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// Liveness probe.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "taskflow-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness probe: verifies database connectivity.
pub async fn ready(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    match state.db.ping().await {
        Ok(()) => Ok(Json(json!({ "status": "ready", "database": true }))),
        Err(_) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}
