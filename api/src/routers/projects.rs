//! Project endpoints: tenant-scoped CRUD with owner-only mutation.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;
use taskflow_core::{
    models::{EntityType, MemberRole, NewProject, UpdateProject},
    TaskflowError, Validator,
};

use database::{audit, projects};

use crate::{
    error::{ApiError, ApiResult},
    middleware::RequestContext,
    schemas::ProjectRead,
    services::bootstrap::ensure_user_setup,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn list_projects(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<ProjectRead>>> {
    let worker = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    let mut conn = state.db.acquire().await?;
    let ids = projects::ids_for_worker(&mut conn, worker.id, &ctx.tenant_id).await?;
    let limit = page.limit.clamp(1, 100);
    let rows = projects::list_in_tenant(&mut conn, &ids, limit, page.offset.max(0)).await?;

    let mut response = Vec::with_capacity(rows.len());
    for project in rows {
        let member_count = projects::member_count(&mut conn, project.id).await?;
        let task_count = projects::task_count(&mut conn, project.id).await?;
        response.push(ProjectRead::from_project(project, member_count, task_count));
    }
    Ok(Json(response))
}

pub async fn create_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<NewProject>,
) -> ApiResult<(StatusCode, Json<ProjectRead>)> {
    let worker = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    Validator::validate_slug(&body.slug)?;
    if body.name.trim().is_empty() {
        return Err(ApiError(TaskflowError::Validation(
            "Project name cannot be empty".to_string(),
        )));
    }

    let mut tx = state.db.begin().await?;

    // Uniqueness is per tenant, not global
    if projects::slug_exists(&mut tx, &ctx.tenant_id, &body.slug).await? {
        return Err(ApiError(TaskflowError::Conflict(format!(
            "Project slug '{}' already exists in your organization",
            body.slug
        ))));
    }

    let project = projects::insert(
        &mut tx,
        &ctx.tenant_id,
        &body.slug,
        &body.name,
        body.description.as_deref(),
        &ctx.principal.external_id,
        false,
    )
    .await?;

    projects::add_member(&mut tx, project.id, worker.id, MemberRole::Owner).await?;

    audit::append(
        &mut tx,
        audit::AuditRecord {
            entity_type: EntityType::Project,
            entity_id: project.id,
            action: "created",
            actor_id: worker.id,
            actor_kind: worker.kind,
            details: json!({
                "slug": body.slug,
                "name": body.name,
                "tenant_id": ctx.tenant_id,
            }),
            client_id: ctx.principal.client_id.as_deref(),
            client_name: ctx.principal.client_name.as_deref(),
        },
    )
    .await?;

    tx.commit().await.map_err(database::common::db_err)?;

    Ok((
        StatusCode::CREATED,
        Json(ProjectRead::from_project(project, 1, 0)),
    ))
}

pub async fn get_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(project_id): Path<i64>,
) -> ApiResult<Json<ProjectRead>> {
    let worker = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    let mut conn = state.db.acquire().await?;
    // Cross-tenant reads collapse into not-found
    let project = projects::by_id_in_tenant(&mut conn, project_id, &ctx.tenant_id)
        .await?
        .ok_or_else(|| TaskflowError::not_found_project(project_id))?;

    if projects::membership(&mut conn, project_id, worker.id)
        .await?
        .is_none()
    {
        return Err(ApiError(TaskflowError::Forbidden(
            "Not a member of this project".to_string(),
        )));
    }

    let member_count = projects::member_count(&mut conn, project_id).await?;
    let task_count = projects::task_count(&mut conn, project_id).await?;

    Ok(Json(ProjectRead::from_project(
        project,
        member_count,
        task_count,
    )))
}

pub async fn update_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(project_id): Path<i64>,
    Json(body): Json<UpdateProject>,
) -> ApiResult<Json<ProjectRead>> {
    let worker = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    let mut tx = state.db.begin().await?;
    let project = projects::by_id_in_tenant(&mut tx, project_id, &ctx.tenant_id)
        .await?
        .ok_or_else(|| TaskflowError::not_found_project(project_id))?;

    if project.owner_id != ctx.principal.external_id {
        return Err(ApiError(TaskflowError::Forbidden(
            "Only project owner can update".to_string(),
        )));
    }

    let mut changes = serde_json::Map::new();
    if let Some(name) = &body.name {
        if *name != project.name {
            changes.insert(
                "name".to_string(),
                json!({ "before": project.name, "after": name }),
            );
        }
    }
    if let Some(description) = &body.description {
        if Some(description) != project.description.as_ref() {
            changes.insert(
                "description".to_string(),
                json!({ "before": project.description, "after": description }),
            );
        }
    }

    let project = if changes.is_empty() {
        project
    } else {
        let updated = projects::update(&mut tx, project_id, &body).await?;
        audit::append(
            &mut tx,
            audit::AuditRecord {
                entity_type: EntityType::Project,
                entity_id: project_id,
                action: "updated",
                actor_id: worker.id,
                actor_kind: worker.kind,
                details: serde_json::Value::Object(changes),
                client_id: ctx.principal.client_id.as_deref(),
                client_name: ctx.principal.client_name.as_deref(),
            },
        )
        .await?;
        updated
    };

    let member_count = projects::member_count(&mut tx, project_id).await?;
    let task_count = projects::task_count(&mut tx, project_id).await?;
    tx.commit().await.map_err(database::common::db_err)?;

    Ok(Json(ProjectRead::from_project(
        project,
        member_count,
        task_count,
    )))
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub force: bool,
}

pub async fn delete_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(project_id): Path<i64>,
    Query(query): Query<DeleteQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let worker = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    let mut tx = state.db.begin().await?;
    let project = projects::by_id_in_tenant(&mut tx, project_id, &ctx.tenant_id)
        .await?
        .ok_or_else(|| TaskflowError::not_found_project(project_id))?;

    if project.owner_id != ctx.principal.external_id {
        return Err(ApiError(TaskflowError::Forbidden(
            "Only project owner can delete".to_string(),
        )));
    }
    if project.is_default {
        return Err(ApiError(TaskflowError::CannotDeleteDefault));
    }

    let task_count = projects::task_count(&mut tx, project_id).await?;
    if task_count > 0 && !query.force {
        return Err(ApiError(TaskflowError::HasTasks(task_count)));
    }

    // Remember task ids so outstanding scheduler jobs can be cancelled
    let task_ids: Vec<i64> = {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM tasks WHERE project_id = ?")
            .bind(project_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(database::common::db_err)?;
        rows.into_iter().map(|(id,)| id).collect()
    };

    audit::append(
        &mut tx,
        audit::AuditRecord {
            entity_type: EntityType::Project,
            entity_id: project_id,
            action: "deleted",
            actor_id: worker.id,
            actor_kind: worker.kind,
            details: json!({
                "slug": project.slug,
                "force": query.force,
                "task_count": task_count,
                "tenant_id": ctx.tenant_id,
            }),
            client_id: ctx.principal.client_id.as_deref(),
            client_name: ctx.principal.client_name.as_deref(),
        },
    )
    .await?;

    // Memberships and tasks cascade with the project row
    projects::delete(&mut tx, project_id).await?;
    tx.commit().await.map_err(database::common::db_err)?;

    for task_id in &task_ids {
        state.jobs.cancel_task_jobs(*task_id).await;
    }

    Ok(Json(json!({
        "ok": true,
        "deleted_tasks": if query.force { task_count } else { 0 },
    })))
}

/// Shared guard: project exists in tenant and caller is a member.
pub async fn require_membership(
    conn: &mut sqlx::SqliteConnection,
    project_id: i64,
    tenant_id: &str,
    worker_id: i64,
) -> Result<taskflow_core::models::Project, TaskflowError> {
    let project = projects::by_id_in_tenant(conn, project_id, tenant_id)
        .await?
        .ok_or_else(|| TaskflowError::not_found_project(project_id))?;
    if projects::membership(conn, project_id, worker_id)
        .await?
        .is_none()
    {
        return Err(TaskflowError::Forbidden(
            "Not a member of this project".to_string(),
        ));
    }
    Ok(project)
}

/// Shared guard: assignee must be a member of the task's project.
pub async fn require_assignee_is_member(
    conn: &mut sqlx::SqliteConnection,
    project_id: i64,
    assignee_id: i64,
) -> Result<taskflow_core::models::Worker, TaskflowError> {
    if projects::membership(conn, project_id, assignee_id)
        .await?
        .is_none()
    {
        return Err(TaskflowError::NotAMember(assignee_id));
    }
    database::workers::by_id(conn, assignee_id)
        .await?
        .ok_or_else(|| TaskflowError::not_found_worker(assignee_id))
}
