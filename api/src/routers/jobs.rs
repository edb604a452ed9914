//! Scheduler callback ingress.
//!
//! The scheduler sidecar fires registered jobs as POSTs to this endpoint,
//! either with the payload at the top level or wrapped under `data`
//! (CloudEvents style). Callbacks may arrive more than once; the
//! `has_spawned_next` and `reminder_sent` flags make the effects
//! at-most-once. Unknown job types are acknowledged and ignored.

use axum::{extract::State, Json};
use serde_json::{json, Value};
use taskflow_core::{events, models::TaskStatus};
use tracing::{info, warn};

use database::{tasks, workers};

use crate::{error::ApiResult, services::recurring, state::AppState};

pub async fn trigger(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    // Unwrap a possible envelope
    let job_data = body.get("data").cloned().unwrap_or(body);

    let task_id = job_data.get("task_id").and_then(Value::as_i64);
    let job_type = job_data
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    info!(job_type = %job_type, task_id = ?task_id, "Received scheduler trigger");

    let Some(task_id) = task_id else {
        return Ok(Json(json!({ "status": "missing_task_id" })));
    };

    match job_type.as_str() {
        "spawn" => handle_spawn(&state, task_id).await,
        "reminder" => handle_reminder(&state, task_id, &job_data).await,
        other => {
            warn!(job_type = %other, "Unknown job type");
            Ok(Json(json!({ "status": "unknown_type" })))
        }
    }
}

/// Due-date spawn: create the next occurrence of a recurring task.
async fn handle_spawn(state: &AppState, task_id: i64) -> ApiResult<Json<Value>> {
    let mut tx = state.db.begin().await?;

    let Some(task) = tasks::by_id(&mut tx, task_id).await? else {
        info!(task_id, "Spawn trigger for missing task");
        return Ok(Json(json!({ "status": "task_not_found" })));
    };

    if task.has_spawned_next {
        return Ok(Json(json!({ "status": "already_spawned" })));
    }
    // The completion path owns the spawn once the task is done
    if task.status == TaskStatus::Completed {
        return Ok(Json(json!({ "status": "task_already_done" })));
    }

    let Some(actor) = workers::by_id(&mut tx, task.created_by_id).await? else {
        return Ok(Json(json!({ "status": "creator_missing" })));
    };

    let outcome = recurring::create_next_occurrence(&mut tx, &task, &actor, None, None).await?;

    let Some(outcome) = outcome else {
        // At max occurrences: mark the source so the job never refires work
        tasks::mark_spawned(&mut tx, task_id).await?;
        tx.commit().await.map_err(database::common::db_err)?;
        return Ok(Json(json!({ "status": "max_occurrences_reached" })));
    };

    tx.commit().await.map_err(database::common::db_err)?;

    // Post-commit: event plus jobs for the new occurrence
    let recipient = {
        let mut conn = state.db.acquire().await?;
        match outcome.new_task.assignee_id {
            Some(id) => workers::by_id(&mut conn, id)
                .await?
                .map(|w| w.recipient_id())
                .unwrap_or_default(),
            None => String::new(),
        }
    };

    state
        .events
        .publish(
            events::TOPIC_TASK_EVENTS,
            events::task_spawned(
                outcome.new_task.id,
                task_id,
                outcome.new_task.recurrence_root(),
                &recipient,
                &outcome.new_task.title,
                outcome.new_task.project_id,
            ),
        )
        .await;

    if outcome.new_task.recurrence_trigger.schedules_spawn() {
        state.jobs.schedule_spawn(&outcome.new_task).await;
    }
    if outcome.new_task.assignee_id.is_some() && !recipient.is_empty() {
        state
            .jobs
            .schedule_reminder(&outcome.new_task, &recipient)
            .await;
    }

    info!(
        new_task_id = outcome.new_task.id,
        spawned_from = task_id,
        "Scheduler spawn completed"
    );
    Ok(Json(json!({ "status": "spawned", "new_task_id": outcome.new_task.id })))
}

/// Reminder: publish `reminder.due` and set the idempotence flag.
async fn handle_reminder(
    state: &AppState,
    task_id: i64,
    job_data: &Value,
) -> ApiResult<Json<Value>> {
    let user_id = job_data
        .get("user_id")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if user_id.is_empty() {
        warn!(task_id, "Reminder trigger without user_id");
        return Ok(Json(json!({ "status": "no_user" })));
    }

    let mut tx = state.db.begin().await?;
    let Some(task) = tasks::by_id(&mut tx, task_id).await? else {
        info!(task_id, "Reminder trigger for missing task");
        return Ok(Json(json!({ "status": "task_not_found" })));
    };

    if task.status == TaskStatus::Completed {
        return Ok(Json(json!({ "status": "task_already_done" })));
    }
    if task.reminder_sent {
        return Ok(Json(json!({ "status": "already_reminded" })));
    }

    tasks::mark_reminder_sent(&mut tx, task_id).await?;
    tx.commit().await.map_err(database::common::db_err)?;

    let title = job_data
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or(task.title.as_str());
    let due_at = job_data
        .get("due_at")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| task.due_date.map(|d| d.to_rfc3339()))
        .unwrap_or_default();
    let hours_until_due = job_data
        .get("hours_until_due")
        .and_then(Value::as_i64)
        .unwrap_or(24);

    state
        .events
        .publish(
            events::TOPIC_REMINDERS,
            events::reminder_due(
                task_id,
                user_id,
                title,
                &due_at,
                hours_until_due,
                task.project_id,
            ),
        )
        .await;

    info!(task_id, user_id, "Published reminder");
    Ok(Json(json!({ "status": "reminder_sent" })))
}
