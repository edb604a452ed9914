//! Pub/sub subscription handlers.
//!
//! The bus delivers published events as POSTs here, possibly wrapped in a
//! CloudEvents envelope: the payload is read from the top-level `data` field
//! when present, else the whole body. Handlers always acknowledge, malformed
//! events included; the bus must never retry into a poison loop, and the
//! REST API remains the source of truth.

use axum::{extract::State, Json};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::store::{NewNotification, NotifyStore};

#[derive(Clone)]
pub struct NotifyState {
    pub store: NotifyStore,
    pub pubsub_name: String,
}

/// Subscription discovery: which topics this service consumes.
pub async fn subscriptions(State(state): State<NotifyState>) -> Json<Value> {
    Json(json!([
        {
            "pubsubname": state.pubsub_name,
            "topic": "task-events",
            "route": "/events/task-events",
        },
        {
            "pubsubname": state.pubsub_name,
            "topic": "reminders",
            "route": "/events/reminders",
        },
    ]))
}

/// Unwrap a possible CloudEvents envelope.
fn unwrap_event(body: &Value) -> &Value {
    match body.get("data") {
        Some(inner) if inner.get("event_type").is_some() => inner,
        _ => body,
    }
}

pub async fn task_events(
    State(state): State<NotifyState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let event = unwrap_event(&body);
    let event_type = event
        .get("event_type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let data = event.get("data").cloned().unwrap_or(Value::Null);

    info!(event_type, "Received task event");

    match notification_from_event(event_type, &data) {
        Some(notification) => match state.store.insert(notification).await {
            Ok(stored) => {
                info!(
                    notification_id = stored.id,
                    user_id = %stored.user_id,
                    "Stored notification"
                );
            }
            Err(e) => warn!(error = %e, "Failed to store notification"),
        },
        None => info!(event_type, "No notification for event"),
    }

    Json(json!({ "status": "SUCCESS" }))
}

pub async fn reminders(
    State(state): State<NotifyState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let event = unwrap_event(&body);
    let event_type = event
        .get("event_type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let data = event.get("data").cloned().unwrap_or(Value::Null);

    if event_type == "reminder.due" {
        let user_id = data
            .get("user_id")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if user_id.is_empty() {
            warn!("Reminder without user_id");
            return Json(json!({ "status": "SUCCESS" }));
        }

        let hours_until = data
            .get("hours_until_due")
            .and_then(Value::as_i64)
            .unwrap_or(24);
        let time_text = match hours_until {
            h if h <= 0 => "very soon".to_string(),
            1 => "in 1 hour".to_string(),
            h => format!("in {h} hours"),
        };
        let title = data
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Task");

        let result = state
            .store
            .insert(NewNotification {
                user_id: user_id.to_string(),
                user_type: "human".to_string(),
                kind: "task_reminder".to_string(),
                title: format!("Task due {time_text}"),
                body: format!("\"{title}\" is approaching its deadline"),
                task_id: data.get("task_id").and_then(Value::as_i64),
                project_id: data.get("project_id").and_then(Value::as_i64),
                actor_id: Some("system".to_string()),
                actor_name: Some("TaskFlow".to_string()),
            })
            .await;

        if let Err(e) = result {
            warn!(error = %e, "Failed to store reminder notification");
        }
    }

    Json(json!({ "status": "SUCCESS" }))
}

/// Derive a notification from an event, or None when nobody should be told.
fn notification_from_event(event_type: &str, data: &Value) -> Option<NewNotification> {
    let user_id = data.get("user_id").and_then(Value::as_str)?;
    if user_id.is_empty() {
        return None;
    }

    let task_title = data
        .get("task_title")
        .and_then(Value::as_str)
        .or_else(|| data.get("task").and_then(|t| t.get("title")).and_then(Value::as_str))
        .or_else(|| data.get("title").and_then(Value::as_str))
        .unwrap_or("Task");
    let task_id = data.get("task_id").and_then(Value::as_i64);
    let project_id = data
        .get("task")
        .and_then(|t| t.get("project_id"))
        .and_then(Value::as_i64)
        .or_else(|| data.get("project_id").and_then(Value::as_i64));
    let actor_id = data
        .get("actor_id")
        .and_then(Value::as_str)
        .map(str::to_string);
    let actor_name = data
        .get("actor_name")
        .and_then(Value::as_str)
        .unwrap_or("Someone")
        .to_string();

    let (kind, title, body) = match event_type {
        "task.created" => (
            "task_assigned",
            "New task assigned to you".to_string(),
            format!("{actor_name} created \"{task_title}\""),
        ),
        "task.completed" => (
            "task_completed",
            "Task completed".to_string(),
            format!("{actor_name} completed \"{task_title}\""),
        ),
        "task.assigned" => (
            "task_assigned",
            "Task assigned to you".to_string(),
            format!("{actor_name} assigned \"{task_title}\" to you"),
        ),
        "task.spawned" => (
            "task_spawned",
            "Recurring task created".to_string(),
            format!("New occurrence of \"{task_title}\" is ready"),
        ),
        "task.deleted" => (
            "task_deleted",
            "Task deleted".to_string(),
            format!("{actor_name} deleted \"{task_title}\""),
        ),
        "task.updated" => {
            let changes = data.get("changes").and_then(Value::as_object)?;
            if changes.is_empty() {
                return None;
            }
            let summary: Vec<String> = changes.keys().take(2).cloned().collect();
            (
                "task_updated",
                "Task updated".to_string(),
                format!(
                    "{actor_name} updated \"{task_title}\" ({})",
                    summary.join(", ")
                ),
            )
        }
        _ => return None,
    };

    Some(NewNotification {
        user_id: user_id.to_string(),
        user_type: "human".to_string(),
        kind: kind.to_string(),
        title,
        body,
        task_id,
        project_id,
        actor_id,
        actor_name: Some(actor_name),
    })
}
