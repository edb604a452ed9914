//! Task endpoints: CRUD plus workflow actions.
//!
//! Every mutation commits its audit row in the same transaction; events
//! publish after commit and scheduler registrations follow, both best-effort.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sqlx::SqliteConnection;
use taskflow_core::{
    events,
    models::{
        EntityType, NewTask, SortOrder, Task, TaskFilter, TaskPriority, TaskSort, TaskStatus,
        UpdateTask, Worker,
    },
    TaskflowError, Validator,
};

use database::{audit, tasks, workers};

use crate::{
    error::{ApiError, ApiResult},
    middleware::RequestContext,
    routers::projects::{require_assignee_is_member, require_membership},
    schemas::{AssignUpdate, ProgressUpdate, RejectRequest, StatusUpdate, TaskListItem, TaskRead},
    services::{bootstrap::ensure_user_setup, recurring},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<i64>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    /// Comma-separated, AND logic
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub has_due_date: Option<bool>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

impl TaskListQuery {
    fn into_filter(self) -> Result<TaskFilter, TaskflowError> {
        let status = match self.status.as_deref() {
            None => None,
            Some(raw) => Some(TaskStatus::parse(raw).ok_or_else(|| {
                TaskflowError::Validation(format!("Unknown status '{raw}'"))
            })?),
        };
        let priority = match self.priority.as_deref() {
            None => None,
            Some(raw) => Some(TaskPriority::parse(raw).ok_or_else(|| {
                TaskflowError::Validation(format!("Unknown priority '{raw}'"))
            })?),
        };
        let sort_by = match self.sort_by.as_deref() {
            None | Some("created_at") => TaskSort::CreatedAt,
            Some("due_date") => TaskSort::DueDate,
            Some("priority") => TaskSort::Priority,
            Some("title") => TaskSort::Title,
            Some(raw) => {
                return Err(TaskflowError::Validation(format!(
                    "Unknown sort_by '{raw}'"
                )))
            }
        };
        let sort_order = match self.sort_order.as_deref() {
            None | Some("desc") => SortOrder::Desc,
            Some("asc") => SortOrder::Asc,
            Some(raw) => {
                return Err(TaskflowError::Validation(format!(
                    "Unknown sort_order '{raw}'"
                )))
            }
        };
        let tags = self
            .tags
            .map(|raw| {
                raw.split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(TaskFilter {
            status,
            assignee_id: self.assignee_id,
            priority,
            search: self.search,
            tags,
            has_due_date: self.has_due_date,
            sort_by,
            sort_order,
            limit: self.limit.clamp(1, TaskFilter::MAX_LIMIT),
            offset: self.offset.max(0),
        })
    }
}

async fn list_item(conn: &mut SqliteConnection, task: Task) -> ApiResult<TaskListItem> {
    let assignee_handle = match task.assignee_id {
        Some(id) => workers::by_id(conn, id).await?.map(|w| w.handle),
        None => None,
    };
    let subtask_count = tasks::subtask_count(conn, task.id).await?;
    Ok(TaskListItem {
        id: task.id,
        title: task.title,
        status: task.status,
        priority: task.priority,
        progress_percent: task.progress_percent,
        assignee_id: task.assignee_id,
        assignee_handle,
        due_date: task.due_date,
        created_at: task.created_at,
        parent_task_id: task.parent_task_id,
        subtask_count,
        is_recurring: task.is_recurring,
    })
}

/// Full read shape with embedded subtasks, derived rollup, and spawn count.
async fn task_read(conn: &mut SqliteConnection, task: Task) -> ApiResult<TaskRead> {
    let assignee_handle = match task.assignee_id {
        Some(id) => workers::by_id(conn, id).await?.map(|w| w.handle),
        None => None,
    };
    let subtasks = tasks::subtasks(conn, task.id).await?;
    let spawn_count = if task.is_recurring {
        tasks::spawn_count(conn, task.recurrence_root()).await?
    } else {
        0
    };
    Ok(TaskRead::from_task(task, assignee_handle, subtasks, spawn_count))
}

async fn fetch_task_in_tenant(
    conn: &mut SqliteConnection,
    task_id: i64,
    tenant_id: &str,
) -> Result<Task, TaskflowError> {
    tasks::by_id_in_tenant(conn, task_id, tenant_id)
        .await?
        .ok_or_else(|| TaskflowError::not_found_task(task_id))
}

/// Recipient id for events targeting the current assignee.
async fn assignee_recipient(
    conn: &mut SqliteConnection,
    task: &Task,
) -> ApiResult<Option<String>> {
    match task.assignee_id {
        Some(id) => Ok(workers::by_id(conn, id).await?.map(|w| w.recipient_id())),
        None => Ok(None),
    }
}

/// Post-commit fan-out for a fresh spawn: event plus next-occurrence jobs.
async fn announce_spawn(state: &AppState, source_id: i64, outcome: &recurring::SpawnOutcome) {
    let new_task = &outcome.new_task;

    let recipient = {
        let mut conn = match state.db.acquire().await {
            Ok(conn) => conn,
            Err(_) => return,
        };
        assignee_recipient(&mut conn, new_task)
            .await
            .ok()
            .flatten()
            .unwrap_or_default()
    };

    state
        .events
        .publish(
            events::TOPIC_TASK_EVENTS,
            events::task_spawned(
                new_task.id,
                source_id,
                new_task.recurrence_root(),
                &recipient,
                &new_task.title,
                new_task.project_id,
            ),
        )
        .await;

    if new_task.recurrence_trigger.schedules_spawn() {
        state.jobs.schedule_spawn(new_task).await;
    }
    if new_task.assignee_id.is_some() && !recipient.is_empty() {
        state.jobs.schedule_reminder(new_task, &recipient).await;
    }
}

// User-scoped endpoints

pub async fn list_recent(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<RecentQuery>,
) -> ApiResult<Json<Vec<TaskListItem>>> {
    let worker = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    let mut conn = state.db.acquire().await?;
    let project_ids = database::projects::all_ids_for_worker(&mut conn, worker.id).await?;
    let rows = tasks::recent(&mut conn, &project_ids, query.limit.clamp(1, 50)).await?;

    let mut items = Vec::with_capacity(rows.len());
    for task in rows {
        items.push(list_item(&mut conn, task).await?);
    }
    Ok(Json(items))
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    #[serde(default = "default_recent_limit")]
    pub limit: i64,
}

fn default_recent_limit() -> i64 {
    10
}

// Project-scoped endpoints

pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(project_id): Path<i64>,
    Query(query): Query<TaskListQuery>,
) -> ApiResult<Json<Vec<TaskListItem>>> {
    let worker = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    let mut conn = state.db.acquire().await?;
    require_membership(&mut conn, project_id, &ctx.tenant_id, worker.id).await?;

    let filter = query.into_filter()?;
    let rows = tasks::list(&mut conn, project_id, &filter).await?;

    let mut items = Vec::with_capacity(rows.len());
    for task in rows {
        items.push(list_item(&mut conn, task).await?);
    }
    Ok(Json(items))
}

pub async fn create_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(project_id): Path<i64>,
    Json(body): Json<NewTask>,
) -> ApiResult<(StatusCode, Json<TaskRead>)> {
    let worker = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    Validator::validate_title(&body.title)?;

    let mut tx = state.db.begin().await?;
    require_membership(&mut tx, project_id, &ctx.tenant_id, worker.id).await?;

    let assignee = match body.assignee_id {
        Some(assignee_id) => {
            Some(require_assignee_is_member(&mut tx, project_id, assignee_id).await?)
        }
        None => None,
    };

    if let Some(parent_id) = body.parent_task_id {
        let parent = tasks::by_id(&mut tx, parent_id)
            .await?
            .ok_or_else(|| TaskflowError::Validation(format!("Parent task {parent_id} not found")))?;
        if parent.project_id != project_id {
            return Err(ApiError(TaskflowError::Validation(
                "Parent task must be in the same project".to_string(),
            )));
        }
    }

    let task = tasks::insert(
        &mut tx,
        &tasks::TaskInsert {
            title: body.title.clone(),
            description: body.description.clone(),
            status: TaskStatus::Pending,
            priority: body.priority,
            progress_percent: 0,
            tags: body.tags.clone(),
            due_date: body.due_date,
            project_id,
            assignee_id: body.assignee_id,
            parent_task_id: body.parent_task_id,
            created_by_id: worker.id,
            is_recurring: body.is_recurring,
            recurrence_pattern: body.recurrence_pattern.clone(),
            max_occurrences: body.max_occurrences,
            recurring_root_id: None,
            recurrence_trigger: body.recurrence_trigger,
            clone_subtasks_on_recur: body.clone_subtasks_on_recur,
        },
    )
    .await?;

    audit::append(
        &mut tx,
        audit::AuditRecord {
            entity_type: EntityType::Task,
            entity_id: task.id,
            action: "created",
            actor_id: worker.id,
            actor_kind: worker.kind,
            details: json!({
                "title": task.title,
                "priority": task.priority,
                "assignee_id": task.assignee_id,
                "is_recurring": task.is_recurring,
                "recurrence_pattern": task.recurrence_pattern,
            }),
            client_id: ctx.principal.client_id.as_deref(),
            client_name: ctx.principal.client_name.as_deref(),
        },
    )
    .await?;

    tx.commit().await.map_err(database::common::db_err)?;

    // Post-commit: events, then timed callbacks
    let recipient = assignee
        .as_ref()
        .filter(|a| a.id != worker.id)
        .map(Worker::recipient_id);
    state
        .events
        .publish(
            events::TOPIC_TASK_EVENTS,
            events::task_created(
                &task,
                &ctx.principal.external_id,
                &worker.name,
                recipient.as_deref(),
            ),
        )
        .await;
    state
        .events
        .publish(
            events::TOPIC_TASK_UPDATES,
            events::sync_event(
                "created",
                task.id,
                &ctx.principal.external_id,
                Some(events::task_snapshot(&task)),
            ),
        )
        .await;

    if task.is_recurring && task.recurrence_trigger.schedules_spawn() {
        state.jobs.schedule_spawn(&task).await;
    }
    if let Some(assignee) = &assignee {
        if task.due_date.is_some() {
            state
                .jobs
                .schedule_reminder(&task, &assignee.recipient_id())
                .await;
        }
    }

    let assignee_handle = assignee.map(|w| w.handle);
    Ok((
        StatusCode::CREATED,
        Json(TaskRead::from_task(task, assignee_handle, vec![], 0)),
    ))
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<i64>,
) -> ApiResult<Json<TaskRead>> {
    let worker = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    let mut conn = state.db.acquire().await?;
    let task = fetch_task_in_tenant(&mut conn, task_id, &ctx.tenant_id).await?;
    require_membership(&mut conn, task.project_id, &ctx.tenant_id, worker.id).await?;

    Ok(Json(task_read(&mut conn, task).await?))
}

pub async fn update_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<i64>,
    Json(body): Json<UpdateTask>,
) -> ApiResult<Json<TaskRead>> {
    let worker = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    if let Some(title) = &body.title {
        Validator::validate_title(title)?;
    }

    let mut tx = state.db.begin().await?;
    let task = fetch_task_in_tenant(&mut tx, task_id, &ctx.tenant_id).await?;
    require_membership(&mut tx, task.project_id, &ctx.tenant_id, worker.id).await?;

    // Re-parenting carries the subtree rules: same project, no cycles
    if let Some(parent_id) = body.parent_task_id {
        let parent = tasks::by_id(&mut tx, parent_id)
            .await?
            .ok_or_else(|| TaskflowError::Validation(format!("Parent task {parent_id} not found")))?;
        if parent.project_id != task.project_id {
            return Err(ApiError(TaskflowError::Validation(
                "Parent task must be in the same project".to_string(),
            )));
        }
        if tasks::would_cycle(&mut tx, task_id, parent_id).await? {
            return Err(ApiError(TaskflowError::CycleDetected(parent_id)));
        }
    }

    let mut changes = serde_json::Map::new();
    if let Some(title) = &body.title {
        if *title != task.title {
            changes.insert(
                "title".to_string(),
                json!({ "before": task.title, "after": title }),
            );
        }
    }
    if let Some(description) = &body.description {
        if Some(description) != task.description.as_ref() {
            changes.insert(
                "description".to_string(),
                json!({ "before": task.description, "after": description }),
            );
        }
    }
    if let Some(priority) = body.priority {
        if priority != task.priority {
            changes.insert(
                "priority".to_string(),
                json!({ "before": task.priority, "after": priority }),
            );
        }
    }
    if let Some(tags) = &body.tags {
        if *tags != task.tags {
            changes.insert(
                "tags".to_string(),
                json!({ "before": task.tags, "after": tags }),
            );
        }
    }
    if let Some(due_date) = body.due_date {
        if Some(due_date) != task.due_date {
            changes.insert(
                "due_date".to_string(),
                json!({
                    "before": task.due_date.map(|d| d.to_rfc3339()),
                    "after": due_date.to_rfc3339(),
                }),
            );
        }
    }
    if let Some(parent_id) = body.parent_task_id {
        if Some(parent_id) != task.parent_task_id {
            changes.insert(
                "parent_task_id".to_string(),
                json!({ "before": task.parent_task_id, "after": parent_id }),
            );
        }
    }
    if let Some(is_recurring) = body.is_recurring {
        if is_recurring != task.is_recurring {
            changes.insert(
                "is_recurring".to_string(),
                json!({ "before": task.is_recurring, "after": is_recurring }),
            );
        }
    }
    if let Some(pattern) = &body.recurrence_pattern {
        if Some(pattern) != task.recurrence_pattern.as_ref() {
            changes.insert(
                "recurrence_pattern".to_string(),
                json!({ "before": task.recurrence_pattern, "after": pattern }),
            );
        }
    }
    if let Some(max_occurrences) = body.max_occurrences {
        if Some(max_occurrences) != task.max_occurrences {
            changes.insert(
                "max_occurrences".to_string(),
                json!({ "before": task.max_occurrences, "after": max_occurrences }),
            );
        }
    }

    let task = if changes.is_empty() {
        task
    } else {
        let updated = tasks::update(&mut tx, task_id, &body).await?;
        audit::append(
            &mut tx,
            audit::AuditRecord {
                entity_type: EntityType::Task,
                entity_id: task_id,
                action: "updated",
                actor_id: worker.id,
                actor_kind: worker.kind,
                details: serde_json::Value::Object(changes.clone()),
                client_id: ctx.principal.client_id.as_deref(),
                client_name: ctx.principal.client_name.as_deref(),
            },
        )
        .await?;
        updated
    };

    tx.commit().await.map_err(database::common::db_err)?;

    if !changes.is_empty() {
        let mut conn = state.db.acquire().await?;
        let recipient = assignee_recipient(&mut conn, &task).await?;
        state
            .events
            .publish(
                events::TOPIC_TASK_EVENTS,
                events::task_updated(
                    task.id,
                    &serde_json::Value::Object(changes),
                    &ctx.principal.external_id,
                    &worker.name,
                    recipient.as_deref(),
                ),
            )
            .await;
        state
            .events
            .publish(
                events::TOPIC_TASK_UPDATES,
                events::sync_event(
                    "updated",
                    task.id,
                    &ctx.principal.external_id,
                    Some(events::task_snapshot(&task)),
                ),
            )
            .await;
    }

    let mut conn = state.db.acquire().await?;
    Ok(Json(task_read(&mut conn, task).await?))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let worker = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    let mut tx = state.db.begin().await?;
    let task = fetch_task_in_tenant(&mut tx, task_id, &ctx.tenant_id).await?;
    require_membership(&mut tx, task.project_id, &ctx.tenant_id, worker.id).await?;

    let recipient = assignee_recipient(&mut tx, &task).await?;

    let deleted_ids = tasks::delete_subtree(&mut tx, task_id).await?;
    let subtasks_deleted = deleted_ids.len() as i64 - 1;

    audit::append(
        &mut tx,
        audit::AuditRecord {
            entity_type: EntityType::Task,
            entity_id: task_id,
            action: "deleted",
            actor_id: worker.id,
            actor_kind: worker.kind,
            details: json!({
                "title": task.title,
                "status": task.status,
                "subtasks_deleted": subtasks_deleted,
            }),
            client_id: ctx.principal.client_id.as_deref(),
            client_name: ctx.principal.client_name.as_deref(),
        },
    )
    .await?;

    tx.commit().await.map_err(database::common::db_err)?;

    // Cancel outstanding timed callbacks for the whole subtree
    for id in &deleted_ids {
        state.jobs.cancel_task_jobs(*id).await;
    }

    state
        .events
        .publish(
            events::TOPIC_TASK_EVENTS,
            events::task_deleted(
                task_id,
                &task.title,
                &ctx.principal.external_id,
                &worker.name,
                recipient.as_deref(),
            ),
        )
        .await;
    state
        .events
        .publish(
            events::TOPIC_TASK_UPDATES,
            events::sync_event("deleted", task_id, &ctx.principal.external_id, None),
        )
        .await;

    Ok(Json(json!({ "ok": true, "subtasks_deleted": subtasks_deleted })))
}

// Workflow actions

pub async fn update_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<i64>,
    Json(body): Json<StatusUpdate>,
) -> ApiResult<Json<TaskRead>> {
    let worker = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    let next = TaskStatus::parse(&body.status).ok_or_else(|| {
        TaskflowError::Validation(format!("Unknown status '{}'", body.status))
    })?;

    let mut tx = state.db.begin().await?;
    let task = fetch_task_in_tenant(&mut tx, task_id, &ctx.tenant_id).await?;
    require_membership(&mut tx, task.project_id, &ctx.tenant_id, worker.id).await?;

    if !task.status.can_transition_to(next) {
        return Err(ApiError(TaskflowError::invalid_transition(task.status, next)));
    }

    let now = Utc::now();
    let started_at = if next == TaskStatus::InProgress && task.started_at.is_none() {
        Some(now)
    } else {
        None
    };
    // Reopening keeps completed_at; only a fresh completion stamps it
    let (completed_at, progress) = if next == TaskStatus::Completed {
        (Some(now), Some(100))
    } else {
        (None, None)
    };

    let old_status = task.status;
    let updated = tasks::set_status(&mut tx, task_id, next, started_at, completed_at, progress)
        .await?;

    audit::append(
        &mut tx,
        audit::AuditRecord {
            entity_type: EntityType::Task,
            entity_id: task_id,
            action: "status_changed",
            actor_id: worker.id,
            actor_kind: worker.kind,
            details: json!({ "before": old_status, "after": next }),
            client_id: ctx.principal.client_id.as_deref(),
            client_name: ctx.principal.client_name.as_deref(),
        },
    )
    .await?;

    let spawn_outcome = if next == TaskStatus::Completed
        && updated.is_recurring
        && updated.recurrence_pattern.is_some()
    {
        recurring::create_next_occurrence(
            &mut tx,
            &updated,
            &worker,
            ctx.principal.client_id.as_deref(),
            ctx.principal.client_name.as_deref(),
        )
        .await?
    } else {
        None
    };

    tx.commit().await.map_err(database::common::db_err)?;

    if next == TaskStatus::Completed {
        let creator_recipient = {
            let mut conn = state.db.acquire().await?;
            workers::by_id(&mut conn, updated.created_by_id)
                .await?
                .filter(|creator| creator.id != worker.id)
                .map(|creator| creator.recipient_id())
        };
        state
            .events
            .publish(
                events::TOPIC_TASK_EVENTS,
                events::task_completed(
                    &updated,
                    &ctx.principal.external_id,
                    &worker.name,
                    creator_recipient.as_deref(),
                ),
            )
            .await;
        state
            .events
            .publish(
                events::TOPIC_TASK_UPDATES,
                events::sync_event(
                    "completed",
                    updated.id,
                    &ctx.principal.external_id,
                    Some(events::task_snapshot(&updated)),
                ),
            )
            .await;
    } else {
        let mut conn = state.db.acquire().await?;
        let recipient = assignee_recipient(&mut conn, &updated).await?;
        state
            .events
            .publish(
                events::TOPIC_TASK_EVENTS,
                events::task_updated(
                    updated.id,
                    &json!({ "status": { "before": old_status, "after": next } }),
                    &ctx.principal.external_id,
                    &worker.name,
                    recipient.as_deref(),
                ),
            )
            .await;
        state
            .events
            .publish(
                events::TOPIC_TASK_UPDATES,
                events::sync_event(
                    "updated",
                    updated.id,
                    &ctx.principal.external_id,
                    Some(events::task_snapshot(&updated)),
                ),
            )
            .await;
    }

    if let Some(outcome) = &spawn_outcome {
        announce_spawn(&state, updated.id, outcome).await;
    }

    let mut conn = state.db.acquire().await?;
    Ok(Json(task_read(&mut conn, updated).await?))
}

pub async fn update_progress(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<i64>,
    Json(body): Json<ProgressUpdate>,
) -> ApiResult<Json<TaskRead>> {
    let worker = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    Validator::validate_progress(body.percent)?;

    let mut tx = state.db.begin().await?;
    let task = fetch_task_in_tenant(&mut tx, task_id, &ctx.tenant_id).await?;
    require_membership(&mut tx, task.project_id, &ctx.tenant_id, worker.id).await?;

    if task.status != TaskStatus::InProgress {
        return Err(ApiError(TaskflowError::NotInProgress));
    }

    let old_progress = task.progress_percent;
    let updated = tasks::set_progress(&mut tx, task_id, body.percent).await?;

    audit::append(
        &mut tx,
        audit::AuditRecord {
            entity_type: EntityType::Task,
            entity_id: task_id,
            action: "progress_updated",
            actor_id: worker.id,
            actor_kind: worker.kind,
            details: json!({
                "before": old_progress,
                "after": body.percent,
                "note": body.note,
            }),
            client_id: ctx.principal.client_id.as_deref(),
            client_name: ctx.principal.client_name.as_deref(),
        },
    )
    .await?;

    tx.commit().await.map_err(database::common::db_err)?;

    let mut conn = state.db.acquire().await?;
    Ok(Json(task_read(&mut conn, updated).await?))
}

pub async fn assign_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<i64>,
    Json(body): Json<AssignUpdate>,
) -> ApiResult<Json<TaskRead>> {
    let worker = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    let mut tx = state.db.begin().await?;
    let task = fetch_task_in_tenant(&mut tx, task_id, &ctx.tenant_id).await?;
    require_membership(&mut tx, task.project_id, &ctx.tenant_id, worker.id).await?;

    let assignee =
        require_assignee_is_member(&mut tx, task.project_id, body.assignee_id).await?;

    let old_assignee_id = task.assignee_id;
    let updated = tasks::set_assignee(&mut tx, task_id, body.assignee_id).await?;

    audit::append(
        &mut tx,
        audit::AuditRecord {
            entity_type: EntityType::Task,
            entity_id: task_id,
            action: "assigned",
            actor_id: worker.id,
            actor_kind: worker.kind,
            details: json!({
                "before": old_assignee_id,
                "after": body.assignee_id,
                "assignee_handle": assignee.handle,
            }),
            client_id: ctx.principal.client_id.as_deref(),
            client_name: ctx.principal.client_name.as_deref(),
        },
    )
    .await?;

    tx.commit().await.map_err(database::common::db_err)?;

    let recipient = assignee.recipient_id();
    state
        .events
        .publish(
            events::TOPIC_TASK_EVENTS,
            events::task_assigned(
                updated.id,
                &updated.title,
                &recipient,
                &ctx.principal.external_id,
                &worker.name,
                updated.project_id,
            ),
        )
        .await;

    // Reminders register at assignment time as well as creation
    if updated.due_date.is_some() && !updated.reminder_sent {
        state.jobs.schedule_reminder(&updated, &recipient).await;
    }

    let mut conn = state.db.acquire().await?;
    Ok(Json(task_read(&mut conn, updated).await?))
}

pub async fn create_subtask(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<i64>,
    Json(body): Json<NewTask>,
) -> ApiResult<(StatusCode, Json<TaskRead>)> {
    let worker = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    Validator::validate_title(&body.title)?;

    let mut tx = state.db.begin().await?;
    let parent = fetch_task_in_tenant(&mut tx, task_id, &ctx.tenant_id).await?;
    require_membership(&mut tx, parent.project_id, &ctx.tenant_id, worker.id).await?;

    let assignee = match body.assignee_id {
        Some(assignee_id) => {
            Some(require_assignee_is_member(&mut tx, parent.project_id, assignee_id).await?)
        }
        None => None,
    };

    let subtask = tasks::insert(
        &mut tx,
        &tasks::TaskInsert {
            title: body.title.clone(),
            description: body.description.clone(),
            status: TaskStatus::Pending,
            priority: body.priority,
            progress_percent: 0,
            tags: body.tags.clone(),
            due_date: body.due_date,
            project_id: parent.project_id,
            assignee_id: body.assignee_id,
            parent_task_id: Some(task_id),
            created_by_id: worker.id,
            is_recurring: false,
            recurrence_pattern: None,
            max_occurrences: None,
            recurring_root_id: None,
            recurrence_trigger: Default::default(),
            clone_subtasks_on_recur: false,
        },
    )
    .await?;

    audit::append(
        &mut tx,
        audit::AuditRecord {
            entity_type: EntityType::Task,
            entity_id: subtask.id,
            action: "created",
            actor_id: worker.id,
            actor_kind: worker.kind,
            details: json!({
                "title": subtask.title,
                "parent_task_id": task_id,
                "is_subtask": true,
            }),
            client_id: ctx.principal.client_id.as_deref(),
            client_name: ctx.principal.client_name.as_deref(),
        },
    )
    .await?;

    tx.commit().await.map_err(database::common::db_err)?;

    let assignee_handle = assignee.map(|w| w.handle);
    Ok((
        StatusCode::CREATED,
        Json(TaskRead::from_task(subtask, assignee_handle, vec![], 0)),
    ))
}

pub async fn approve_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<i64>,
) -> ApiResult<Json<TaskRead>> {
    let worker = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    let mut tx = state.db.begin().await?;
    let task = fetch_task_in_tenant(&mut tx, task_id, &ctx.tenant_id).await?;
    require_membership(&mut tx, task.project_id, &ctx.tenant_id, worker.id).await?;

    if task.status != TaskStatus::Review {
        return Err(ApiError(TaskflowError::Validation(
            "Can only approve tasks in 'review' status".to_string(),
        )));
    }

    let updated = tasks::set_status(
        &mut tx,
        task_id,
        TaskStatus::Completed,
        None,
        Some(Utc::now()),
        Some(100),
    )
    .await?;

    audit::append(
        &mut tx,
        audit::AuditRecord {
            entity_type: EntityType::Task,
            entity_id: task_id,
            action: "approved",
            actor_id: worker.id,
            actor_kind: worker.kind,
            details: json!({ "from_status": "review", "to_status": "completed" }),
            client_id: ctx.principal.client_id.as_deref(),
            client_name: ctx.principal.client_name.as_deref(),
        },
    )
    .await?;

    let spawn_outcome = if updated.is_recurring && updated.recurrence_pattern.is_some() {
        recurring::create_next_occurrence(
            &mut tx,
            &updated,
            &worker,
            ctx.principal.client_id.as_deref(),
            ctx.principal.client_name.as_deref(),
        )
        .await?
    } else {
        None
    };

    tx.commit().await.map_err(database::common::db_err)?;

    let creator_recipient = {
        let mut conn = state.db.acquire().await?;
        workers::by_id(&mut conn, updated.created_by_id)
            .await?
            .filter(|creator| creator.id != worker.id)
            .map(|creator| creator.recipient_id())
    };
    state
        .events
        .publish(
            events::TOPIC_TASK_EVENTS,
            events::task_completed(
                &updated,
                &ctx.principal.external_id,
                &worker.name,
                creator_recipient.as_deref(),
            ),
        )
        .await;
    state
        .events
        .publish(
            events::TOPIC_TASK_UPDATES,
            events::sync_event(
                "completed",
                updated.id,
                &ctx.principal.external_id,
                Some(events::task_snapshot(&updated)),
            ),
        )
        .await;

    if let Some(outcome) = &spawn_outcome {
        announce_spawn(&state, updated.id, outcome).await;
    }

    let mut conn = state.db.acquire().await?;
    Ok(Json(task_read(&mut conn, updated).await?))
}

pub async fn reject_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<i64>,
    Json(body): Json<RejectRequest>,
) -> ApiResult<Json<TaskRead>> {
    let worker = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    let mut tx = state.db.begin().await?;
    let task = fetch_task_in_tenant(&mut tx, task_id, &ctx.tenant_id).await?;
    require_membership(&mut tx, task.project_id, &ctx.tenant_id, worker.id).await?;

    if task.status != TaskStatus::Review {
        return Err(ApiError(TaskflowError::Validation(
            "Can only reject tasks in 'review' status".to_string(),
        )));
    }

    let updated =
        tasks::set_status(&mut tx, task_id, TaskStatus::InProgress, None, None, None).await?;

    audit::append(
        &mut tx,
        audit::AuditRecord {
            entity_type: EntityType::Task,
            entity_id: task_id,
            action: "rejected",
            actor_id: worker.id,
            actor_kind: worker.kind,
            details: json!({
                "reason": body.reason,
                "from_status": "review",
                "to_status": "in_progress",
            }),
            client_id: ctx.principal.client_id.as_deref(),
            client_name: ctx.principal.client_name.as_deref(),
        },
    )
    .await?;

    tx.commit().await.map_err(database::common::db_err)?;

    let mut conn = state.db.acquire().await?;
    Ok(Json(task_read(&mut conn, updated).await?))
}
