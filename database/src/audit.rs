//! In-transaction audit append and audit reads.
//!
//! `append` never commits; the caller owns the transaction so the audit row
//! lands atomically with the mutation it records. Rows are immutable: there
//! is no update or delete here.

use chrono::Utc;
use serde_json::Value;
use sqlx::SqliteConnection;
use taskflow_core::{
    models::{AuditEntry, EntityType, WorkerKind},
    Result,
};

use crate::common::{db_err, row_to_audit};

/// Everything needed to record one action.
#[derive(Debug, Clone)]
pub struct AuditRecord<'a> {
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub action: &'a str,
    pub actor_id: i64,
    pub actor_kind: WorkerKind,
    pub details: Value,
    pub client_id: Option<&'a str>,
    pub client_name: Option<&'a str>,
}

pub async fn append(conn: &mut SqliteConnection, record: AuditRecord<'_>) -> Result<AuditEntry> {
    let row = sqlx::query(
        r#"
        INSERT INTO audit_log (entity_type, entity_id, action, actor_id, actor_kind,
                               details, client_id, client_name, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(record.entity_type.as_str())
    .bind(record.entity_id)
    .bind(record.action)
    .bind(record.actor_id)
    .bind(record.actor_kind.as_str())
    .bind(record.details.to_string())
    .bind(record.client_id)
    .bind(record.client_name)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err)?;

    row_to_audit(&row)
}

/// Audit trail for one entity, newest first.
pub async fn for_entity(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    entity_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<AuditEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM audit_log
        WHERE entity_type = ? AND entity_id = ?
        ORDER BY created_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(entity_type.as_str())
    .bind(entity_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;

    rows.iter().map(row_to_audit).collect()
}

/// Audit trail for a project: project entries plus entries for every task it
/// contains, newest first.
pub async fn for_project(
    conn: &mut SqliteConnection,
    project_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<AuditEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM audit_log
        WHERE (entity_type = 'project' AND entity_id = ?)
           OR (entity_type = 'task' AND entity_id IN (SELECT id FROM tasks WHERE project_id = ?))
        ORDER BY created_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(project_id)
    .bind(project_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;

    rows.iter().map(row_to_audit).collect()
}
