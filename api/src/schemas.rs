//! Response DTOs for the REST surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskflow_core::models::{
    rollup_progress, AgentFamily, AuditEntry, MemberRole, Project, RecurrenceTrigger, Task,
    TaskPriority, TaskStatus, Worker, WorkerKind,
};

#[derive(Debug, Serialize)]
pub struct ProjectRead {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub is_default: bool,
    pub tenant_id: String,
    pub member_count: i64,
    pub task_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectRead {
    pub fn from_project(project: Project, member_count: i64, task_count: i64) -> Self {
        Self {
            id: project.id,
            slug: project.slug,
            name: project.name,
            description: project.description,
            owner_id: project.owner_id,
            is_default: project.is_default,
            tenant_id: project.tenant_id,
            member_count,
            task_count,
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskRead {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub progress_percent: i32,
    /// Mean of direct subtasks' progress, derived at read time
    pub rollup_progress: i32,
    pub tags: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub is_recurring: bool,
    pub recurrence_pattern: Option<String>,
    pub max_occurrences: Option<i64>,
    pub recurring_root_id: Option<i64>,
    pub recurrence_trigger: RecurrenceTrigger,
    pub clone_subtasks_on_recur: bool,
    pub has_spawned_next: bool,
    pub spawn_count: i64,
    pub project_id: i64,
    pub assignee_id: Option<i64>,
    pub assignee_handle: Option<String>,
    pub parent_task_id: Option<i64>,
    pub created_by_id: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub subtasks: Vec<TaskRead>,
}

impl TaskRead {
    /// Build the read shape. `subtasks` embeds one level deep and feeds the
    /// derived rollup; `spawn_count` is computed by the caller for recurring
    /// tasks.
    pub fn from_task(
        task: Task,
        assignee_handle: Option<String>,
        subtasks: Vec<Task>,
        spawn_count: i64,
    ) -> Self {
        let progresses: Vec<i32> = subtasks.iter().map(|t| t.progress_percent).collect();
        let rollup = rollup_progress(&progresses);
        Self {
            id: task.id,
            title: task.title,
            description: task.description,
            status: task.status,
            priority: task.priority,
            progress_percent: task.progress_percent,
            rollup_progress: rollup,
            tags: task.tags,
            due_date: task.due_date,
            is_recurring: task.is_recurring,
            recurrence_pattern: task.recurrence_pattern,
            max_occurrences: task.max_occurrences,
            recurring_root_id: task.recurring_root_id,
            recurrence_trigger: task.recurrence_trigger,
            clone_subtasks_on_recur: task.clone_subtasks_on_recur,
            has_spawned_next: task.has_spawned_next,
            spawn_count,
            project_id: task.project_id,
            assignee_id: task.assignee_id,
            assignee_handle,
            parent_task_id: task.parent_task_id,
            created_by_id: task.created_by_id,
            started_at: task.started_at,
            completed_at: task.completed_at,
            created_at: task.created_at,
            updated_at: task.updated_at,
            subtasks: subtasks
                .into_iter()
                .map(|t| TaskRead::from_task(t, None, vec![], 0))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskListItem {
    pub id: i64,
    pub title: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub progress_percent: i32,
    pub assignee_id: Option<i64>,
    pub assignee_handle: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub parent_task_id: Option<i64>,
    pub subtask_count: i64,
    pub is_recurring: bool,
}

#[derive(Debug, Serialize)]
pub struct MemberRead {
    pub id: i64,
    pub worker_id: i64,
    pub handle: String,
    pub name: String,
    pub kind: WorkerKind,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct WorkerRead {
    pub id: i64,
    pub handle: String,
    pub name: String,
    pub kind: WorkerKind,
    pub agent_family: Option<AgentFamily>,
    pub capabilities: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Worker> for WorkerRead {
    fn from(worker: Worker) -> Self {
        Self {
            id: worker.id,
            handle: worker.handle,
            name: worker.name,
            kind: worker.kind,
            agent_family: worker.agent_family,
            capabilities: worker.capabilities,
            created_at: worker.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditRead {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: i64,
    pub action: String,
    pub actor_id: i64,
    pub actor_handle: Option<String>,
    pub actor_kind: WorkerKind,
    pub details: Value,
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditRead {
    pub fn from_entry(entry: AuditEntry, actor_handle: Option<String>) -> Self {
        Self {
            id: entry.id,
            entity_type: entry.entity_type.as_str().to_string(),
            entity_id: entry.entity_id,
            action: entry.action,
            actor_id: entry.actor_id,
            actor_handle,
            actor_kind: entry.actor_kind,
            details: entry.details,
            client_id: entry.client_id,
            client_name: entry.client_name,
            created_at: entry.created_at,
        }
    }
}

// Request bodies

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ProgressUpdate {
    pub percent: i32,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignUpdate {
    pub assignee_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct MemberCreate {
    /// External identity of a human to add; a worker row is materialized
    /// when one does not exist yet
    #[serde(default)]
    pub user_id: Option<String>,
    /// Existing worker id (typically an agent)
    #[serde(default)]
    pub worker_id: Option<i64>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AgentCreate {
    pub handle: String,
    pub name: String,
    pub agent_family: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}
