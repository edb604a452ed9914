//! First-contact bootstrapping: worker row and default project.
//!
//! Both materializations are idempotent; after the first call they reduce to
//! two indexed lookups per request.

use database::{audit, projects, workers, Database};
use serde_json::json;
use taskflow_core::{
    models::{EntityType, MemberRole, Worker},
    validation::default_project_slug,
    Principal, Result,
};
use tracing::info;

/// Ensure the principal has a Worker row and a default project.
///
/// Returns the caller's worker. The worker commit happens before the default
/// project so a later failure never strands a half-registered identity.
pub async fn ensure_user_setup(db: &Database, principal: &Principal, tenant_id: &str) -> Result<Worker> {
    let worker = get_or_create_worker(db, principal).await?;
    ensure_default_project(db, principal, &worker, tenant_id).await?;
    Ok(worker)
}

async fn get_or_create_worker(db: &Database, principal: &Principal) -> Result<Worker> {
    {
        let mut conn = db.acquire().await?;
        if let Some(worker) = workers::by_user_id(&mut conn, &principal.external_id).await? {
            return Ok(worker);
        }
    }

    let mut tx = db.begin().await?;
    // Re-check inside the transaction; a concurrent request may have won
    if let Some(worker) = workers::by_user_id(&mut tx, &principal.external_id).await? {
        tx.commit().await.map_err(database::common::db_err)?;
        return Ok(worker);
    }

    let worker = workers::create_human(
        &mut tx,
        &principal.external_id,
        &principal.email,
        &principal.name,
    )
    .await?;

    audit::append(
        &mut tx,
        audit::AuditRecord {
            entity_type: EntityType::Worker,
            entity_id: worker.id,
            action: "created",
            actor_id: worker.id,
            actor_kind: worker.kind,
            details: json!({ "handle": worker.handle, "user_id": principal.external_id }),
            client_id: principal.client_id.as_deref(),
            client_name: principal.client_name.as_deref(),
        },
    )
    .await?;

    tx.commit().await.map_err(database::common::db_err)?;
    info!(worker_id = worker.id, handle = %worker.handle, "Materialized worker on first contact");
    Ok(worker)
}

async fn ensure_default_project(
    db: &Database,
    principal: &Principal,
    worker: &Worker,
    tenant_id: &str,
) -> Result<()> {
    {
        let mut conn = db.acquire().await?;
        if projects::default_for_owner(&mut conn, &principal.external_id)
            .await?
            .is_some()
        {
            return Ok(());
        }
    }

    let mut tx = db.begin().await?;
    if projects::default_for_owner(&mut tx, &principal.external_id)
        .await?
        .is_some()
    {
        tx.commit().await.map_err(database::common::db_err)?;
        return Ok(());
    }

    let base_slug = default_project_slug(&principal.external_id);
    let mut slug = base_slug.clone();
    let mut suffix = 1;
    while projects::slug_exists(&mut tx, tenant_id, &slug).await? {
        slug = format!("{base_slug}-{suffix}");
        suffix += 1;
    }

    let project = projects::insert(
        &mut tx,
        tenant_id,
        &slug,
        "Default",
        Some("Your personal task workspace"),
        &principal.external_id,
        true,
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
            details: json!({ "slug": slug, "is_default": true, "tenant_id": tenant_id }),
            client_id: principal.client_id.as_deref(),
            client_name: principal.client_name.as_deref(),
        },
    )
    .await?;

    tx.commit().await.map_err(database::common::db_err)?;
    info!(project_id = project.id, "Materialized default project");
    Ok(())
}
