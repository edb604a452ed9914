//! Agent worker registration. Agents are created explicitly, unlike humans
//! which materialize on first contact.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::json;
use taskflow_core::{
    models::{AgentFamily, EntityType},
    TaskflowError, Validator,
};

use database::{audit, workers};

use crate::{
    error::{ApiError, ApiResult},
    middleware::RequestContext,
    schemas::{AgentCreate, WorkerRead},
    services::bootstrap::ensure_user_setup,
    state::AppState,
};

pub async fn list_agents(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<Vec<WorkerRead>>> {
    ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    let mut conn = state.db.acquire().await?;
    let agents = workers::list_agents(&mut conn).await?;
    Ok(Json(agents.into_iter().map(WorkerRead::from).collect()))
}

pub async fn register_agent(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<AgentCreate>,
) -> ApiResult<(StatusCode, Json<WorkerRead>)> {
    let actor = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    Validator::validate_handle(&body.handle)?;
    // Agents must carry a family tag
    let family = AgentFamily::parse(&body.agent_family).ok_or_else(|| {
        TaskflowError::Validation(format!("Unknown agent family '{}'", body.agent_family))
    })?;
    if body.name.trim().is_empty() {
        return Err(ApiError(TaskflowError::Validation(
            "Agent name cannot be empty".to_string(),
        )));
    }

    let mut tx = state.db.begin().await?;
    let agent =
        workers::create_agent(&mut tx, &body.handle, &body.name, family, &body.capabilities)
            .await?;

    audit::append(
        &mut tx,
        audit::AuditRecord {
            entity_type: EntityType::Worker,
            entity_id: agent.id,
            action: "created",
            actor_id: actor.id,
            actor_kind: actor.kind,
            details: json!({
                "handle": agent.handle,
                "agent_family": body.agent_family,
                "capabilities": body.capabilities,
            }),
            client_id: ctx.principal.client_id.as_deref(),
            client_name: ctx.principal.client_name.as_deref(),
        },
    )
    .await?;

    tx.commit().await.map_err(database::common::db_err)?;

    Ok((StatusCode::CREATED, Json(WorkerRead::from(agent))))
}

pub async fn delete_agent(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(worker_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let actor = ensure_user_setup(&state.db, &ctx.principal, &ctx.tenant_id).await?;

    let mut tx = state.db.begin().await?;
    let target = workers::by_id(&mut tx, worker_id)
        .await?
        .ok_or_else(|| TaskflowError::not_found_worker(worker_id))?;

    // Blocked while the worker holds memberships
    workers::delete(&mut tx, worker_id).await?;

    audit::append(
        &mut tx,
        audit::AuditRecord {
            entity_type: EntityType::Worker,
            entity_id: worker_id,
            action: "deleted",
            actor_id: actor.id,
            actor_kind: actor.kind,
            details: json!({ "handle": target.handle }),
            client_id: ctx.principal.client_id.as_deref(),
            client_name: ctx.principal.client_name.as_deref(),
        },
    )
    .await?;

    tx.commit().await.map_err(database::common::db_err)?;
    Ok(StatusCode::NO_CONTENT)
}
