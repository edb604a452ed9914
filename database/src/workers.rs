use chrono::Utc;
use sqlx::SqliteConnection;
use taskflow_core::{
    models::{AgentFamily, Worker, WorkerKind},
    validation::derive_handle,
    Result, TaskflowError,
};

use crate::common::{db_err, json_list, row_to_worker};

pub async fn by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Worker>> {
    let row = sqlx::query("SELECT * FROM workers WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(row_to_worker).transpose()
}

pub async fn by_user_id(conn: &mut SqliteConnection, user_id: &str) -> Result<Option<Worker>> {
    let row = sqlx::query("SELECT * FROM workers WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(row_to_worker).transpose()
}

pub async fn by_handle(conn: &mut SqliteConnection, handle: &str) -> Result<Option<Worker>> {
    let row = sqlx::query("SELECT * FROM workers WHERE handle = ?")
        .bind(handle)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(row_to_worker).transpose()
}

async fn insert(
    conn: &mut SqliteConnection,
    handle: &str,
    name: &str,
    kind: WorkerKind,
    user_id: Option<&str>,
    agent_family: Option<AgentFamily>,
    capabilities: &[String],
) -> Result<Worker> {
    let row = sqlx::query(
        r#"
        INSERT INTO workers (handle, name, kind, user_id, agent_family, capabilities, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(handle)
    .bind(name)
    .bind(kind.as_str())
    .bind(user_id)
    .bind(agent_family.map(|f| f.as_str()))
    .bind(json_list(capabilities))
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err)?;

    row_to_worker(&row)
}

/// Materialize a human worker for a previously-unseen external identity.
///
/// Derives a handle from the email (or external id), resolving collisions by
/// appending `-1`, `-2`, ... until unique.
pub async fn create_human(
    conn: &mut SqliteConnection,
    external_id: &str,
    email: &str,
    name: &str,
) -> Result<Worker> {
    let base_handle = derive_handle(email, external_id);
    let mut handle = base_handle.clone();
    let mut suffix = 1;
    while by_handle(&mut *conn, &handle).await?.is_some() {
        handle = format!("{base_handle}-{suffix}");
        suffix += 1;
    }

    let display = if name.is_empty() {
        if email.is_empty() {
            external_id
        } else {
            email
        }
    } else {
        name
    };

    insert(
        conn,
        &handle,
        display,
        WorkerKind::Human,
        Some(external_id),
        None,
        &[],
    )
    .await
}

/// Register an agent worker. Agents must carry a family tag.
pub async fn create_agent(
    conn: &mut SqliteConnection,
    handle: &str,
    name: &str,
    family: AgentFamily,
    capabilities: &[String],
) -> Result<Worker> {
    insert(
        conn,
        handle,
        name,
        WorkerKind::Agent,
        None,
        Some(family),
        capabilities,
    )
    .await
}

pub async fn list_agents(conn: &mut SqliteConnection) -> Result<Vec<Worker>> {
    let rows = sqlx::query("SELECT * FROM workers WHERE kind = 'agent' ORDER BY name")
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;
    rows.iter().map(row_to_worker).collect()
}

pub async fn membership_count(conn: &mut SqliteConnection, worker_id: i64) -> Result<i64> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM project_members WHERE worker_id = ?")
            .bind(worker_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err)?;
    Ok(row.0)
}

/// Delete a worker. Blocked while the worker holds any project membership.
pub async fn delete(conn: &mut SqliteConnection, worker_id: i64) -> Result<()> {
    let memberships = membership_count(&mut *conn, worker_id).await?;
    if memberships > 0 {
        return Err(TaskflowError::Conflict(format!(
            "Worker {worker_id} still belongs to {memberships} project(s)"
        )));
    }
    let result = sqlx::query("DELETE FROM workers WHERE id = ?")
        .bind(worker_id)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    if result.rows_affected() == 0 {
        return Err(TaskflowError::not_found_worker(worker_id));
    }
    Ok(())
}
