//! Typed events published on the pub/sub bus.
//!
//! Three logical topics carry the fabric: `task-events` for CRUD and
//! lifecycle, `reminders` for scheduler-driven reminders, and `task-updates`
//! for real-time client sync. Publishing is best-effort and happens after the
//! local transaction commits; consumers must tolerate missing events and
//! reconcile via the REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::Task;

/// All task CRUD and lifecycle events.
pub const TOPIC_TASK_EVENTS: &str = "task-events";
/// Scheduler-driven reminder triggers.
pub const TOPIC_REMINDERS: &str = "reminders";
/// Real-time client sync fan-out.
pub const TOPIC_TASK_UPDATES: &str = "task-updates";

/// Wire envelope for every published event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Serializable task snapshot embedded in mutation events.
pub fn task_snapshot(task: &Task) -> Value {
    json!({
        "id": task.id,
        "title": task.title,
        "description": task.description,
        "status": task.status,
        "priority": task.priority,
        "progress_percent": task.progress_percent,
        "tags": task.tags,
        "due_date": task.due_date.map(|d| d.to_rfc3339()),
        "project_id": task.project_id,
        "assignee_id": task.assignee_id,
        "parent_task_id": task.parent_task_id,
        "is_recurring": task.is_recurring,
        "recurrence_pattern": task.recurrence_pattern,
    })
}

/// `task.created` on `task-events`. `user_id` is the assignee when it differs
/// from the creator, else None.
pub fn task_created(
    task: &Task,
    actor_id: &str,
    actor_name: &str,
    user_id: Option<&str>,
) -> EventEnvelope {
    EventEnvelope::new(
        "task.created",
        json!({
            "task_id": task.id,
            "user_id": user_id,
            "actor_id": actor_id,
            "actor_name": actor_name,
            "task": task_snapshot(task),
        }),
    )
}

/// `task.updated` on `task-events`, carrying the before/after change map.
pub fn task_updated(
    task_id: i64,
    changes: &Value,
    actor_id: &str,
    actor_name: &str,
    user_id: Option<&str>,
) -> EventEnvelope {
    EventEnvelope::new(
        "task.updated",
        json!({
            "task_id": task_id,
            "user_id": user_id,
            "actor_id": actor_id,
            "actor_name": actor_name,
            "changes": changes,
        }),
    )
}

/// `task.deleted` on `task-events`.
pub fn task_deleted(
    task_id: i64,
    title: &str,
    actor_id: &str,
    actor_name: &str,
    user_id: Option<&str>,
) -> EventEnvelope {
    EventEnvelope::new(
        "task.deleted",
        json!({
            "task_id": task_id,
            "title": title,
            "user_id": user_id,
            "actor_id": actor_id,
            "actor_name": actor_name,
        }),
    )
}

/// `task.completed` on `task-events`. `user_id` is the task creator when it
/// differs from the actor.
pub fn task_completed(
    task: &Task,
    actor_id: &str,
    actor_name: &str,
    creator_id: Option<&str>,
) -> EventEnvelope {
    EventEnvelope::new(
        "task.completed",
        json!({
            "task_id": task.id,
            "user_id": creator_id,
            "actor_id": actor_id,
            "actor_name": actor_name,
            "task": task_snapshot(task),
            "is_recurring": task.is_recurring,
        }),
    )
}

/// `task.assigned` on `task-events`; `user_id` is the new assignee.
pub fn task_assigned(
    task_id: i64,
    task_title: &str,
    assignee_user_id: &str,
    actor_id: &str,
    actor_name: &str,
    project_id: i64,
) -> EventEnvelope {
    EventEnvelope::new(
        "task.assigned",
        json!({
            "task_id": task_id,
            "task_title": task_title,
            "user_id": assignee_user_id,
            "actor_id": actor_id,
            "actor_name": actor_name,
            "project_id": project_id,
        }),
    )
}

/// `task.spawned` on `task-events`; emitted when a recurring task creates its
/// successor. `user_id` is the current assignee.
pub fn task_spawned(
    task_id: i64,
    spawned_from: i64,
    recurring_root: i64,
    user_id: &str,
    task_title: &str,
    project_id: i64,
) -> EventEnvelope {
    EventEnvelope::new(
        "task.spawned",
        json!({
            "task_id": task_id,
            "spawned_from": spawned_from,
            "recurring_root": recurring_root,
            "user_id": user_id,
            "task_title": task_title,
            "project_id": project_id,
        }),
    )
}

/// `reminder.due` on `reminders`; fired by the scheduler callback.
pub fn reminder_due(
    task_id: i64,
    user_id: &str,
    title: &str,
    due_at: &str,
    hours_until_due: i64,
    project_id: i64,
) -> EventEnvelope {
    EventEnvelope::new(
        "reminder.due",
        json!({
            "task_id": task_id,
            "user_id": user_id,
            "title": title,
            "due_at": due_at,
            "hours_until_due": hours_until_due,
            "project_id": project_id,
        }),
    )
}

/// `sync.*` mirror events on `task-updates` for real-time clients.
pub fn sync_event(
    action: &str,
    task_id: i64,
    user_id: &str,
    task_data: Option<Value>,
) -> EventEnvelope {
    EventEnvelope::new(
        format!("sync.{action}"),
        json!({
            "task_id": task_id,
            "user_id": user_id,
            "action": action,
            "task": task_data,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecurrenceTrigger, TaskPriority, TaskStatus};

    fn sample_task() -> Task {
        Task {
            id: 5,
            title: "Ship it".to_string(),
            description: Some("final pass".to_string()),
            status: TaskStatus::Pending,
            priority: TaskPriority::High,
            progress_percent: 0,
            tags: vec!["release".to_string()],
            due_date: None,
            project_id: 2,
            assignee_id: Some(3),
            parent_task_id: None,
            created_by_id: 1,
            is_recurring: false,
            recurrence_pattern: None,
            max_occurrences: None,
            recurring_root_id: None,
            recurrence_trigger: RecurrenceTrigger::OnComplete,
            clone_subtasks_on_recur: false,
            has_spawned_next: false,
            reminder_sent: false,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_task_created_payload() {
        let task = sample_task();
        let event = task_created(&task, "user-1", "Sarah", Some("user-2"));
        assert_eq!(event.event_type, "task.created");
        assert_eq!(event.data["task_id"], 5);
        assert_eq!(event.data["user_id"], "user-2");
        assert_eq!(event.data["task"]["title"], "Ship it");
        assert_eq!(event.data["task"]["status"], "pending");
    }

    #[test]
    fn test_task_created_without_recipient() {
        let task = sample_task();
        let event = task_created(&task, "user-1", "Sarah", None);
        assert!(event.data["user_id"].is_null());
    }

    #[test]
    fn test_sync_event_type() {
        let event = sync_event("completed", 5, "user-1", None);
        assert_eq!(event.event_type, "sync.completed");
        assert_eq!(event.data["action"], "completed");
    }

    #[test]
    fn test_reminder_due_payload() {
        let event = reminder_due(5, "user-2", "Ship it", "2025-01-01T00:00:00Z", 24, 2);
        assert_eq!(event.event_type, "reminder.due");
        assert_eq!(event.data["hours_until_due"], 24);
    }
}
