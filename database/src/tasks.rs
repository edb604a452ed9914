use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use taskflow_core::{
    models::{
        RecurrenceTrigger, SortOrder, Task, TaskFilter, TaskPriority, TaskSort, TaskStatus,
        UpdateTask,
    },
    Result, TaskflowError,
};

use crate::common::{db_err, json_list, row_to_task};

/// Full column set for a new task row. Spawn and clone paths need control
/// over every recurrence field, so this is broader than the API-facing DTO.
#[derive(Debug, Clone)]
pub struct TaskInsert {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub progress_percent: i32,
    pub tags: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub project_id: i64,
    pub assignee_id: Option<i64>,
    pub parent_task_id: Option<i64>,
    pub created_by_id: i64,
    pub is_recurring: bool,
    pub recurrence_pattern: Option<String>,
    pub max_occurrences: Option<i64>,
    pub recurring_root_id: Option<i64>,
    pub recurrence_trigger: RecurrenceTrigger,
    pub clone_subtasks_on_recur: bool,
}

impl TaskInsert {
    /// A fresh pending task in a project.
    pub fn new(project_id: i64, created_by_id: i64, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            progress_percent: 0,
            tags: vec![],
            due_date: None,
            project_id,
            assignee_id: None,
            parent_task_id: None,
            created_by_id,
            is_recurring: false,
            recurrence_pattern: None,
            max_occurrences: None,
            recurring_root_id: None,
            recurrence_trigger: RecurrenceTrigger::OnComplete,
            clone_subtasks_on_recur: false,
        }
    }
}

pub async fn insert(conn: &mut SqliteConnection, task: &TaskInsert) -> Result<Task> {
    let now = Utc::now();
    let row = sqlx::query(
        r#"
        INSERT INTO tasks (
            title, description, status, priority, progress_percent, tags, due_date,
            project_id, assignee_id, parent_task_id, created_by_id,
            is_recurring, recurrence_pattern, max_occurrences, recurring_root_id,
            recurrence_trigger, clone_subtasks_on_recur, has_spawned_next, reminder_sent,
            created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.status.as_str())
    .bind(task.priority.as_str())
    .bind(task.progress_percent)
    .bind(json_list(&task.tags))
    .bind(task.due_date)
    .bind(task.project_id)
    .bind(task.assignee_id)
    .bind(task.parent_task_id)
    .bind(task.created_by_id)
    .bind(task.is_recurring)
    .bind(&task.recurrence_pattern)
    .bind(task.max_occurrences)
    .bind(task.recurring_root_id)
    .bind(task.recurrence_trigger.as_str())
    .bind(task.clone_subtasks_on_recur)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err)?;

    row_to_task(&row)
}

pub async fn by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Task>> {
    let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(row_to_task).transpose()
}

/// Fetch a task whose project lives in the caller's tenant. Cross-tenant ids
/// come back as None.
pub async fn by_id_in_tenant(
    conn: &mut SqliteConnection,
    id: i64,
    tenant_id: &str,
) -> Result<Option<Task>> {
    let row = sqlx::query(
        r#"
        SELECT t.* FROM tasks t
        JOIN projects p ON p.id = t.project_id
        WHERE t.id = ? AND p.tenant_id = ?
        "#,
    )
    .bind(id)
    .bind(tenant_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_err)?;
    row.as_ref().map(row_to_task).transpose()
}

/// Direct subtasks of a parent, oldest first.
pub async fn subtasks(conn: &mut SqliteConnection, parent_id: i64) -> Result<Vec<Task>> {
    let rows = sqlx::query("SELECT * FROM tasks WHERE parent_task_id = ? ORDER BY created_at, id")
        .bind(parent_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;
    rows.iter().map(row_to_task).collect()
}

pub async fn subtask_count(conn: &mut SqliteConnection, parent_id: i64) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE parent_task_id = ?")
        .bind(parent_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)?;
    Ok(row.0)
}

/// List tasks in a project with filtering, search, sorting, and pagination.
///
/// Tag filtering uses JSON-text containment with AND logic: the row must
/// match every requested tag.
pub async fn list(
    conn: &mut SqliteConnection,
    project_id: i64,
    filter: &TaskFilter,
) -> Result<Vec<Task>> {
    let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> =
        sqlx::QueryBuilder::new("SELECT * FROM tasks WHERE project_id = ");
    qb.push_bind(project_id);

    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(assignee_id) = filter.assignee_id {
        qb.push(" AND assignee_id = ").push_bind(assignee_id);
    }
    if let Some(priority) = filter.priority {
        qb.push(" AND priority = ").push_bind(priority.as_str());
    }
    if let Some(search) = &filter.search {
        qb.push(" AND LOWER(title) LIKE ")
            .push_bind(format!("%{}%", search.to_lowercase()));
    }
    for tag in &filter.tags {
        qb.push(" AND tags LIKE ")
            .push_bind(format!("%\"{tag}\"%"));
    }
    if let Some(has_due) = filter.has_due_date {
        if has_due {
            qb.push(" AND due_date IS NOT NULL");
        } else {
            qb.push(" AND due_date IS NULL");
        }
    }

    match (filter.sort_by, filter.sort_order) {
        (TaskSort::Priority, order) => {
            // Rank critical first; desc means most urgent first
            qb.push(
                " ORDER BY CASE priority WHEN 'critical' THEN 0 WHEN 'high' THEN 1 \
                 WHEN 'medium' THEN 2 WHEN 'low' THEN 3 ELSE 4 END",
            );
            if order == SortOrder::Asc {
                qb.push(" DESC");
            }
        }
        (TaskSort::DueDate, SortOrder::Asc) => {
            qb.push(" ORDER BY due_date IS NULL, due_date ASC");
        }
        (TaskSort::DueDate, SortOrder::Desc) => {
            qb.push(" ORDER BY due_date IS NOT NULL, due_date DESC");
        }
        (TaskSort::Title, SortOrder::Asc) => {
            qb.push(" ORDER BY title ASC");
        }
        (TaskSort::Title, SortOrder::Desc) => {
            qb.push(" ORDER BY title DESC");
        }
        (TaskSort::CreatedAt, SortOrder::Asc) => {
            qb.push(" ORDER BY created_at ASC, id ASC");
        }
        (TaskSort::CreatedAt, SortOrder::Desc) => {
            qb.push(" ORDER BY created_at DESC, id DESC");
        }
    }

    let limit = filter.limit.clamp(1, TaskFilter::MAX_LIMIT);
    qb.push(" LIMIT ").push_bind(limit);
    qb.push(" OFFSET ").push_bind(filter.offset.max(0));

    let rows = qb.build().fetch_all(&mut *conn).await.map_err(db_err)?;
    rows.iter().map(row_to_task).collect()
}

/// Most recent tasks across a set of projects, newest first.
pub async fn recent(
    conn: &mut SqliteConnection,
    project_ids: &[i64],
    limit: i64,
) -> Result<Vec<Task>> {
    if project_ids.is_empty() {
        return Ok(vec![]);
    }
    let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> =
        sqlx::QueryBuilder::new("SELECT * FROM tasks WHERE project_id IN (");
    let mut separated = qb.separated(", ");
    for id in project_ids {
        separated.push_bind(id);
    }
    qb.push(") ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(limit);

    let rows = qb.build().fetch_all(&mut *conn).await.map_err(db_err)?;
    rows.iter().map(row_to_task).collect()
}

/// Apply an update; only present fields change. Returns the fresh row.
pub async fn update(
    conn: &mut SqliteConnection,
    id: i64,
    updates: &UpdateTask,
) -> Result<Task> {
    let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new("UPDATE tasks SET ");
    let mut any = false;

    macro_rules! push_field {
        ($field:expr, $value:expr) => {
            if any {
                qb.push(", ");
            }
            qb.push($field).push_bind($value);
            any = true;
        };
    }

    if let Some(title) = &updates.title {
        push_field!("title = ", title);
    }
    if let Some(description) = &updates.description {
        push_field!("description = ", description);
    }
    if let Some(priority) = updates.priority {
        push_field!("priority = ", priority.as_str());
    }
    if let Some(tags) = &updates.tags {
        push_field!("tags = ", json_list(tags));
    }
    if let Some(due_date) = updates.due_date {
        push_field!("due_date = ", due_date);
    }
    if let Some(parent_task_id) = updates.parent_task_id {
        push_field!("parent_task_id = ", parent_task_id);
    }
    if let Some(is_recurring) = updates.is_recurring {
        push_field!("is_recurring = ", is_recurring);
    }
    if let Some(pattern) = &updates.recurrence_pattern {
        push_field!("recurrence_pattern = ", pattern);
    }
    if let Some(max_occurrences) = updates.max_occurrences {
        push_field!("max_occurrences = ", max_occurrences);
    }

    if any {
        qb.push(", ");
    }
    qb.push("updated_at = ").push_bind(Utc::now());
    qb.push(" WHERE id = ").push_bind(id);
    qb.push(" RETURNING *");

    let row = qb.build().fetch_one(&mut *conn).await.map_err(db_err)?;
    row_to_task(&row)
}

/// Write a status change together with its timestamp side effects.
pub async fn set_status(
    conn: &mut SqliteConnection,
    id: i64,
    status: TaskStatus,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    progress_percent: Option<i32>,
) -> Result<Task> {
    let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new("UPDATE tasks SET ");
    qb.push("status = ").push_bind(status.as_str());
    if let Some(started) = started_at {
        qb.push(", started_at = ").push_bind(started);
    }
    if let Some(completed) = completed_at {
        qb.push(", completed_at = ").push_bind(completed);
    }
    if let Some(progress) = progress_percent {
        qb.push(", progress_percent = ").push_bind(progress);
    }
    qb.push(", updated_at = ").push_bind(Utc::now());
    qb.push(" WHERE id = ").push_bind(id);
    qb.push(" RETURNING *");

    let row = qb.build().fetch_one(&mut *conn).await.map_err(db_err)?;
    row_to_task(&row)
}

pub async fn set_progress(conn: &mut SqliteConnection, id: i64, percent: i32) -> Result<Task> {
    let row = sqlx::query(
        "UPDATE tasks SET progress_percent = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(percent)
    .bind(Utc::now())
    .bind(id)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err)?;
    row_to_task(&row)
}

pub async fn set_assignee(
    conn: &mut SqliteConnection,
    id: i64,
    assignee_id: i64,
) -> Result<Task> {
    let row =
        sqlx::query("UPDATE tasks SET assignee_id = ?, updated_at = ? WHERE id = ? RETURNING *")
            .bind(assignee_id)
            .bind(Utc::now())
            .bind(id)
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err)?;
    row_to_task(&row)
}

/// Mark a recurring task as having spawned its successor.
pub async fn mark_spawned(conn: &mut SqliteConnection, id: i64) -> Result<()> {
    sqlx::query("UPDATE tasks SET has_spawned_next = 1, updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    Ok(())
}

/// Mark a task as reminded so a redelivered callback is a no-op.
pub async fn mark_reminder_sent(conn: &mut SqliteConnection, id: i64) -> Result<()> {
    sqlx::query("UPDATE tasks SET reminder_sent = 1, updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    Ok(())
}

/// Count of tasks in a recurrence chain: the root itself plus every task
/// pointing at it.
pub async fn spawn_count(conn: &mut SqliteConnection, root_id: i64) -> Result<i64> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE id = ? OR recurring_root_id = ?")
            .bind(root_id)
            .bind(root_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err)?;
    Ok(row.0)
}

/// Walk up the parent chain to decide whether re-parenting `task_id` under
/// `parent_id` would create a cycle. Bounded by the visited set.
pub async fn would_cycle(
    conn: &mut SqliteConnection,
    task_id: i64,
    parent_id: i64,
) -> Result<bool> {
    if task_id == parent_id {
        return Ok(true);
    }

    let mut visited = std::collections::HashSet::new();
    visited.insert(task_id);
    let mut current = Some(parent_id);

    while let Some(id) = current {
        if !visited.insert(id) {
            return Ok(true);
        }
        current = match by_id(&mut *conn, id).await? {
            Some(task) => task.parent_task_id,
            None => None,
        };
    }
    Ok(false)
}

/// Recursively delete a task's subtree, then the task itself. Depth-first,
/// post-order. Returns all deleted ids (root last) so the caller can cancel
/// outstanding scheduler jobs; the subtask count is `len() - 1`.
pub async fn delete_subtree(conn: &mut SqliteConnection, id: i64) -> Result<Vec<i64>> {
    let mut deleted = Vec::new();
    delete_children(conn, id, &mut deleted).await?;

    let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    if result.rows_affected() == 0 {
        return Err(TaskflowError::not_found_task(id));
    }
    deleted.push(id);
    Ok(deleted)
}

async fn delete_children(
    conn: &mut SqliteConnection,
    parent_id: i64,
    deleted: &mut Vec<i64>,
) -> Result<()> {
    let child_ids: Vec<(i64,)> = sqlx::query_as("SELECT id FROM tasks WHERE parent_task_id = ?")
        .bind(parent_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;

    for (child_id,) in child_ids {
        Box::pin(delete_children(conn, child_id, deleted)).await?;
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(child_id)
            .execute(&mut *conn)
            .await
            .map_err(db_err)?;
        deleted.push(child_id);
    }
    Ok(())
}
