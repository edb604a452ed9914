use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use taskflow_core::{
    models::{
        AgentFamily, AuditEntry, EntityType, MemberRole, Project, ProjectMember, RecurrenceTrigger,
        Task, TaskPriority, TaskStatus, Worker, WorkerKind,
    },
    Result, TaskflowError,
};

/// Convert a SQLx error into the domain error taxonomy.
///
/// Unique-constraint violations surface as `Conflict` so the transport layer
/// can report duplicate slugs/handles with an explanatory message.
pub fn db_err(err: sqlx::Error) -> TaskflowError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            if message.contains("UNIQUE constraint failed") {
                if message.contains("projects.") {
                    TaskflowError::Conflict(
                        "Project slug already exists in this tenant".to_string(),
                    )
                } else if message.contains("workers.handle") {
                    TaskflowError::Conflict("Worker handle already exists".to_string())
                } else if message.contains("project_members.") {
                    TaskflowError::Conflict("Worker is already a project member".to_string())
                } else {
                    TaskflowError::Conflict(format!("Constraint violation: {message}"))
                }
            } else {
                TaskflowError::Database(format!("Database constraint error: {message}"))
            }
        }
        sqlx::Error::PoolTimedOut => TaskflowError::Database("Connection pool timeout".to_string()),
        sqlx::Error::Io(io_err) => TaskflowError::Database(format!("Database I/O error: {io_err}")),
        _ => TaskflowError::Database(format!("Database operation failed: {err}")),
    }
}

fn parse_json_list(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

pub fn row_to_worker(row: &SqliteRow) -> Result<Worker> {
    let kind_str: String = row.get("kind");
    let kind = WorkerKind::parse(&kind_str)
        .ok_or_else(|| TaskflowError::Database(format!("Invalid worker kind: {kind_str}")))?;

    let agent_family: Option<String> = row.get("agent_family");
    let agent_family = agent_family.as_deref().and_then(AgentFamily::parse);

    let created_at: DateTime<Utc> = row.get("created_at");

    Ok(Worker {
        id: row.get("id"),
        handle: row.get("handle"),
        name: row.get("name"),
        kind,
        user_id: row.get("user_id"),
        agent_family,
        capabilities: parse_json_list(row.try_get("capabilities").ok()),
        created_at,
    })
}

pub fn row_to_project(row: &SqliteRow) -> Result<Project> {
    let created_at: DateTime<Utc> = row.get("created_at");
    let updated_at: DateTime<Utc> = row.get("updated_at");

    Ok(Project {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        slug: row.get("slug"),
        name: row.get("name"),
        description: row.get("description"),
        owner_id: row.get("owner_id"),
        is_default: row.get("is_default"),
        created_at,
        updated_at,
    })
}

pub fn row_to_member(row: &SqliteRow) -> Result<ProjectMember> {
    let role_str: String = row.get("role");
    let role = MemberRole::parse(&role_str)
        .ok_or_else(|| TaskflowError::Database(format!("Invalid member role: {role_str}")))?;
    let joined_at: DateTime<Utc> = row.get("joined_at");

    Ok(ProjectMember {
        id: row.get("id"),
        project_id: row.get("project_id"),
        worker_id: row.get("worker_id"),
        role,
        joined_at,
    })
}

pub fn row_to_task(row: &SqliteRow) -> Result<Task> {
    let status_str: String = row.get("status");
    let status = TaskStatus::parse(&status_str)
        .ok_or_else(|| TaskflowError::Database(format!("Invalid task status: {status_str}")))?;

    let priority_str: String = row.get("priority");
    let priority = TaskPriority::parse(&priority_str).ok_or_else(|| {
        TaskflowError::Database(format!("Invalid task priority: {priority_str}"))
    })?;

    let trigger_str: String = row.get("recurrence_trigger");
    let recurrence_trigger = RecurrenceTrigger::parse(&trigger_str).ok_or_else(|| {
        TaskflowError::Database(format!("Invalid recurrence trigger: {trigger_str}"))
    })?;

    Ok(Task {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        status,
        priority,
        progress_percent: row.get("progress_percent"),
        tags: parse_json_list(row.try_get("tags").ok()),
        due_date: row.get("due_date"),
        project_id: row.get("project_id"),
        assignee_id: row.get("assignee_id"),
        parent_task_id: row.get("parent_task_id"),
        created_by_id: row.get("created_by_id"),
        is_recurring: row.get("is_recurring"),
        recurrence_pattern: row.get("recurrence_pattern"),
        max_occurrences: row.get("max_occurrences"),
        recurring_root_id: row.get("recurring_root_id"),
        recurrence_trigger,
        clone_subtasks_on_recur: row.get("clone_subtasks_on_recur"),
        has_spawned_next: row.get("has_spawned_next"),
        reminder_sent: row.get("reminder_sent"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

pub fn row_to_audit(row: &SqliteRow) -> Result<AuditEntry> {
    let entity_str: String = row.get("entity_type");
    let entity_type = EntityType::parse(&entity_str)
        .ok_or_else(|| TaskflowError::Database(format!("Invalid entity type: {entity_str}")))?;

    let actor_str: String = row.get("actor_kind");
    let actor_kind = WorkerKind::parse(&actor_str)
        .ok_or_else(|| TaskflowError::Database(format!("Invalid actor kind: {actor_str}")))?;

    let details_raw: String = row.get("details");
    let details =
        serde_json::from_str(&details_raw).unwrap_or(serde_json::Value::Object(Default::default()));

    Ok(AuditEntry {
        id: row.get("id"),
        entity_type,
        entity_id: row.get("entity_id"),
        action: row.get("action"),
        actor_id: row.get("actor_id"),
        actor_kind,
        details,
        client_id: row.get("client_id"),
        client_name: row.get("client_name"),
        created_at: row.get("created_at"),
    })
}

/// Serialize a string list for a JSON text column.
pub fn json_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}
