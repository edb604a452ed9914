//! Project membership endpoints. Owner-only mutation; members may read.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::json;
use taskflow_core::{
    models::{EntityType, MemberRole},
    TaskflowError,
};

use database::{audit, projects, workers};

use crate::{
    error::{ApiError, ApiResult},
    middleware::RequestContext,
    routers::projects::require_membership,
    schemas::{MemberCreate, MemberRead},
    services::bootstrap::ensure_user_setup,
    state::AppState,
};

pub async fn list_members(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(project_id): Path<i64>,
) -> ApiResult<Json<Vec<MemberRead>>> {
    let worker = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    let mut conn = state.db.acquire().await?;
    require_membership(&mut conn, project_id, &ctx.tenant_id, worker.id).await?;

    let members = projects::list_members(&mut conn, project_id).await?;
    Ok(Json(
        members
            .into_iter()
            .map(|(membership, member_worker)| MemberRead {
                id: membership.id,
                worker_id: member_worker.id,
                handle: member_worker.handle,
                name: member_worker.name,
                kind: member_worker.kind,
                role: membership.role,
                joined_at: membership.joined_at,
            })
            .collect(),
    ))
}

pub async fn add_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(project_id): Path<i64>,
    Json(body): Json<MemberCreate>,
) -> ApiResult<(StatusCode, Json<MemberRead>)> {
    let actor = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    let role = match body.role.as_deref() {
        None => MemberRole::Member,
        Some(raw) => MemberRole::parse(raw).ok_or_else(|| {
            TaskflowError::Validation(format!("Unknown member role '{raw}'"))
        })?,
    };

    let mut tx = state.db.begin().await?;
    let project = projects::by_id_in_tenant(&mut tx, project_id, &ctx.tenant_id)
        .await?
        .ok_or_else(|| TaskflowError::not_found_project(project_id))?;

    if project.owner_id != ctx.principal.external_id {
        return Err(ApiError(TaskflowError::Forbidden(
            "Only project owner can add members".to_string(),
        )));
    }

    // Resolve the worker to add: an existing row by id, or a human
    // materialized from an external identity
    let target = match (&body.worker_id, &body.user_id) {
        (Some(worker_id), None) => workers::by_id(&mut tx, *worker_id)
            .await?
            .ok_or_else(|| TaskflowError::not_found_worker(*worker_id))?,
        (None, Some(user_id)) => match workers::by_user_id(&mut tx, user_id).await? {
            Some(existing) => existing,
            None => workers::create_human(&mut tx, user_id, "", "").await?,
        },
        _ => {
            return Err(ApiError(TaskflowError::Validation(
                "Provide exactly one of user_id or worker_id".to_string(),
            )))
        }
    };

    if projects::membership(&mut tx, project_id, target.id)
        .await?
        .is_some()
    {
        return Err(ApiError(TaskflowError::Conflict(format!(
            "Worker {} is already a member",
            target.handle
        ))));
    }

    let membership = projects::add_member(&mut tx, project_id, target.id, role).await?;

    audit::append(
        &mut tx,
        audit::AuditRecord {
            entity_type: EntityType::Project,
            entity_id: project_id,
            action: "member_added",
            actor_id: actor.id,
            actor_kind: actor.kind,
            details: json!({
                "worker_id": target.id,
                "handle": target.handle,
                "role": role.as_str(),
            }),
            client_id: ctx.principal.client_id.as_deref(),
            client_name: ctx.principal.client_name.as_deref(),
        },
    )
    .await?;

    tx.commit().await.map_err(database::common::db_err)?;

    Ok((
        StatusCode::CREATED,
        Json(MemberRead {
            id: membership.id,
            worker_id: target.id,
            handle: target.handle,
            name: target.name,
            kind: target.kind,
            role: membership.role,
            joined_at: membership.joined_at,
        }),
    ))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((project_id, worker_id)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    let actor = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    let mut tx = state.db.begin().await?;
    let project = projects::by_id_in_tenant(&mut tx, project_id, &ctx.tenant_id)
        .await?
        .ok_or_else(|| TaskflowError::not_found_project(project_id))?;

    if project.owner_id != ctx.principal.external_id {
        return Err(ApiError(TaskflowError::Forbidden(
            "Only project owner can remove members".to_string(),
        )));
    }

    let membership = projects::membership(&mut tx, project_id, worker_id)
        .await?
        .ok_or_else(|| {
            TaskflowError::NotFound(format!("Membership of worker {worker_id}"))
        })?;

    if membership.role == MemberRole::Owner {
        let members = projects::list_members(&mut tx, project_id).await?;
        let owner_count = members
            .iter()
            .filter(|(m, _)| m.role == MemberRole::Owner)
            .count();
        if owner_count <= 1 {
            return Err(ApiError(TaskflowError::Validation(
                "Cannot remove the last owner".to_string(),
            )));
        }
    }

    let target = workers::by_id(&mut tx, worker_id).await?;
    projects::remove_member(&mut tx, project_id, worker_id).await?;

    audit::append(
        &mut tx,
        audit::AuditRecord {
            entity_type: EntityType::Project,
            entity_id: project_id,
            action: "member_removed",
            actor_id: actor.id,
            actor_kind: actor.kind,
            details: json!({
                "worker_id": worker_id,
                "handle": target.map(|w| w.handle),
            }),
            client_id: ctx.principal.client_id.as_deref(),
            client_name: ctx.principal.client_name.as_deref(),
        },
    )
    .await?;

    tx.commit().await.map_err(database::common::db_err)?;
    Ok(StatusCode::NO_CONTENT)
}
