use chrono::Utc;
use sqlx::SqliteConnection;
use taskflow_core::{
    models::{MemberRole, Project, ProjectMember, UpdateProject, Worker},
    Result, TaskflowError,
};

use crate::common::{db_err, row_to_member, row_to_project, row_to_worker};

pub async fn insert(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    slug: &str,
    name: &str,
    description: Option<&str>,
    owner_id: &str,
    is_default: bool,
) -> Result<Project> {
    let now = Utc::now();
    let row = sqlx::query(
        r#"
        INSERT INTO projects (tenant_id, slug, name, description, owner_id, is_default, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(tenant_id)
    .bind(slug)
    .bind(name)
    .bind(description)
    .bind(owner_id)
    .bind(is_default)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err)?;

    row_to_project(&row)
}

/// Fetch a project within the caller's tenant. Cross-tenant ids come back as
/// None, which the transport reports as not-found.
pub async fn by_id_in_tenant(
    conn: &mut SqliteConnection,
    id: i64,
    tenant_id: &str,
) -> Result<Option<Project>> {
    let row = sqlx::query("SELECT * FROM projects WHERE id = ? AND tenant_id = ?")
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(row_to_project).transpose()
}

pub async fn by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Project>> {
    let row = sqlx::query("SELECT * FROM projects WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(row_to_project).transpose()
}

pub async fn slug_exists(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    slug: &str,
) -> Result<bool> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM projects WHERE tenant_id = ? AND slug = ?")
            .bind(tenant_id)
            .bind(slug)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err)?;
    Ok(row.is_some())
}

pub async fn default_for_owner(
    conn: &mut SqliteConnection,
    owner_id: &str,
) -> Result<Option<Project>> {
    let row = sqlx::query("SELECT * FROM projects WHERE owner_id = ? AND is_default = 1")
        .bind(owner_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(row_to_project).transpose()
}

/// Apply an update; only present fields change. Returns the fresh row.
pub async fn update(
    conn: &mut SqliteConnection,
    id: i64,
    updates: &UpdateProject,
) -> Result<Project> {
    let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new("UPDATE projects SET ");
    let mut any = false;

    if let Some(name) = &updates.name {
        qb.push("name = ").push_bind(name);
        any = true;
    }
    if let Some(description) = &updates.description {
        if any {
            qb.push(", ");
        }
        qb.push("description = ").push_bind(description);
        any = true;
    }
    if any {
        qb.push(", ");
    }
    qb.push("updated_at = ").push_bind(Utc::now());
    qb.push(" WHERE id = ").push_bind(id);
    qb.push(" RETURNING *");

    let row = qb.build().fetch_one(&mut *conn).await.map_err(db_err)?;
    row_to_project(&row)
}

/// Delete a project. Memberships and tasks cascade via foreign keys.
pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    Ok(())
}

pub async fn task_count(conn: &mut SqliteConnection, project_id: i64) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE project_id = ?")
        .bind(project_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)?;
    Ok(row.0)
}

pub async fn member_count(conn: &mut SqliteConnection, project_id: i64) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM project_members WHERE project_id = ?")
        .bind(project_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)?;
    Ok(row.0)
}

/// Project ids within a tenant where the worker is a member.
pub async fn ids_for_worker(
    conn: &mut SqliteConnection,
    worker_id: i64,
    tenant_id: &str,
) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        r#"
        SELECT pm.project_id FROM project_members pm
        JOIN projects p ON p.id = pm.project_id
        WHERE pm.worker_id = ? AND p.tenant_id = ?
        "#,
    )
    .bind(worker_id)
    .bind(tenant_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Project ids where the worker is a member, across all tenants.
pub async fn all_ids_for_worker(
    conn: &mut SqliteConnection,
    worker_id: i64,
) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> =
        sqlx::query_as("SELECT project_id FROM project_members WHERE worker_id = ?")
            .bind(worker_id)
            .fetch_all(&mut *conn)
            .await
            .map_err(db_err)?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn list_in_tenant(
    conn: &mut SqliteConnection,
    ids: &[i64],
    limit: i64,
    offset: i64,
) -> Result<Vec<Project>> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> =
        sqlx::QueryBuilder::new("SELECT * FROM projects WHERE id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    qb.push(") ORDER BY created_at LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows = qb.build().fetch_all(&mut *conn).await.map_err(db_err)?;
    rows.iter().map(row_to_project).collect()
}

// Membership operations

pub async fn membership(
    conn: &mut SqliteConnection,
    project_id: i64,
    worker_id: i64,
) -> Result<Option<ProjectMember>> {
    let row = sqlx::query("SELECT * FROM project_members WHERE project_id = ? AND worker_id = ?")
        .bind(project_id)
        .bind(worker_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(row_to_member).transpose()
}

pub async fn add_member(
    conn: &mut SqliteConnection,
    project_id: i64,
    worker_id: i64,
    role: MemberRole,
) -> Result<ProjectMember> {
    let row = sqlx::query(
        r#"
        INSERT INTO project_members (project_id, worker_id, role, joined_at)
        VALUES (?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(project_id)
    .bind(worker_id)
    .bind(role.as_str())
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err)?;
    row_to_member(&row)
}

pub async fn remove_member(
    conn: &mut SqliteConnection,
    project_id: i64,
    worker_id: i64,
) -> Result<()> {
    let result = sqlx::query("DELETE FROM project_members WHERE project_id = ? AND worker_id = ?")
        .bind(project_id)
        .bind(worker_id)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    if result.rows_affected() == 0 {
        return Err(TaskflowError::NotFound(format!(
            "Membership of worker {worker_id} in project {project_id}"
        )));
    }
    Ok(())
}

/// All members of a project joined with their worker rows.
pub async fn list_members(
    conn: &mut SqliteConnection,
    project_id: i64,
) -> Result<Vec<(ProjectMember, Worker)>> {
    let member_rows =
        sqlx::query("SELECT * FROM project_members WHERE project_id = ? ORDER BY joined_at, id")
            .bind(project_id)
            .fetch_all(&mut *conn)
            .await
            .map_err(db_err)?;
    let members: Vec<ProjectMember> = member_rows
        .iter()
        .map(row_to_member)
        .collect::<Result<_>>()?;

    let mut out = Vec::with_capacity(members.len());
    for member in members {
        let worker_row = sqlx::query("SELECT * FROM workers WHERE id = ?")
            .bind(member.worker_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err)?;
        let worker = row_to_worker(&worker_row)?;
        out.push((member, worker));
    }
    Ok(out)
}
