//! TaskFlow notification consumer.
//!
//! Subscribes to the `task-events` and `reminders` topics and materializes
//! notifications into its own store. Consumers of the bus are order-tolerant
//! and expect missing events; the REST API is the source of truth.

pub mod routes;
pub mod store;

use axum::{
    routing::{get, post},
    Router,
};
use serde_json::json;

use crate::routes::NotifyState;

pub fn app(state: NotifyState) -> Router {
    Router::new()
        .route("/health", get(|| async { axum::Json(json!({ "status": "healthy", "service": "taskflow-notify" })) }))
        .route("/events/subscriptions", get(routes::subscriptions))
        .route("/events/task-events", post(routes::task_events))
        .route("/events/reminders", post(routes::reminders))
        .with_state(state)
}
