//! Audit read endpoints. Project members may read task and project trails.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use std::collections::HashMap;
use taskflow_core::models::EntityType;

use database::{audit, tasks, workers};

use crate::{
    error::ApiResult,
    middleware::RequestContext,
    routers::projects::require_membership,
    schemas::AuditRead,
    services::bootstrap::ensure_user_setup,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

async fn with_actor_handles(
    conn: &mut sqlx::SqliteConnection,
    entries: Vec<taskflow_core::models::AuditEntry>,
) -> ApiResult<Vec<AuditRead>> {
    let mut handles: HashMap<i64, Option<String>> = HashMap::new();
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let handle = match handles.get(&entry.actor_id) {
            Some(cached) => cached.clone(),
            None => {
                let handle = workers::by_id(conn, entry.actor_id).await?.map(|w| w.handle);
                handles.insert(entry.actor_id, handle.clone());
                handle
            }
        };
        out.push(AuditRead::from_entry(entry, handle));
    }
    Ok(out)
}

pub async fn task_audit(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(task_id): Path<i64>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditRead>>> {
    let worker = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    let mut conn = state.db.acquire().await?;
    let task = tasks::by_id_in_tenant(&mut conn, task_id, &ctx.tenant_id)
        .await?
        .ok_or_else(|| taskflow_core::TaskflowError::not_found_task(task_id))?;
    require_membership(&mut conn, task.project_id, &ctx.tenant_id, worker.id).await?;

    let limit = query.limit.clamp(1, 100);
    let entries =
        audit::for_entity(&mut conn, EntityType::Task, task_id, limit, query.offset.max(0))
            .await?;
    Ok(Json(with_actor_handles(&mut conn, entries).await?))
}

pub async fn project_audit(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(project_id): Path<i64>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditRead>>> {
    let worker = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    let mut conn = state.db.acquire().await?;
    require_membership(&mut conn, project_id, &ctx.tenant_id, worker.id).await?;

    let limit = query.limit.clamp(1, 100);
    let entries = audit::for_project(&mut conn, project_id, limit, query.offset.max(0)).await?;
    Ok(Json(with_actor_handles(&mut conn, entries).await?))
}
