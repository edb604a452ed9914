//! Recurring-task spawning and subtree cloning.
//!
//! Both the completion path and the scheduler callback funnel through
//! [`create_next_occurrence`]. The caller owns the transaction; audit rows
//! for the spawn and every clone land atomically with the new rows. The
//! `has_spawned_next` flag on the source task makes redelivered callbacks
//! and re-completions no-ops.

use chrono::Utc;
use serde_json::json;
use sqlx::SqliteConnection;
use taskflow_core::{
    models::{EntityType, Task, TaskStatus, Worker},
    next_due, Result,
};
use tracing::info;

use database::{audit, tasks};

pub struct SpawnOutcome {
    pub new_task: Task,
    pub cloned_subtasks: i64,
}

/// Create the next occurrence of a recurring task, if one is owed.
///
/// Returns None when the source already spawned or the chain reached
/// `max_occurrences`. The source task is marked `has_spawned_next` on
/// success.
pub async fn create_next_occurrence(
    conn: &mut SqliteConnection,
    source: &Task,
    actor: &Worker,
    client_id: Option<&str>,
    client_name: Option<&str>,
) -> Result<Option<SpawnOutcome>> {
    if source.has_spawned_next {
        return Ok(None);
    }
    let Some(pattern) = source.recurrence_pattern.as_deref() else {
        return Ok(None);
    };

    let root_id = source.recurrence_root();

    if let Some(max) = source.max_occurrences {
        let count = tasks::spawn_count(&mut *conn, root_id).await?;
        if count >= max {
            info!(task_id = source.id, max, "Recurrence chain at max occurrences");
            return Ok(None);
        }
    }

    // Base is the original due date when set, else the completion instant
    let base = source.due_date.unwrap_or_else(Utc::now);
    let due = next_due(pattern, base);

    let new_task = tasks::insert(
        &mut *conn,
        &tasks::TaskInsert {
            title: source.title.clone(),
            description: source.description.clone(),
            status: TaskStatus::Pending,
            priority: source.priority,
            progress_percent: 0,
            tags: source.tags.clone(),
            due_date: Some(due),
            project_id: source.project_id,
            assignee_id: source.assignee_id,
            parent_task_id: source.parent_task_id,
            created_by_id: actor.id,
            is_recurring: true,
            recurrence_pattern: source.recurrence_pattern.clone(),
            max_occurrences: source.max_occurrences,
            recurring_root_id: Some(root_id),
            recurrence_trigger: source.recurrence_trigger,
            clone_subtasks_on_recur: source.clone_subtasks_on_recur,
        },
    )
    .await?;

    let cloned_subtasks = if source.clone_subtasks_on_recur {
        clone_subtasks(conn, source.id, &new_task, actor, client_id, client_name).await?
    } else {
        0
    };

    tasks::mark_spawned(&mut *conn, source.id).await?;

    audit::append(
        &mut *conn,
        audit::AuditRecord {
            entity_type: EntityType::Task,
            entity_id: new_task.id,
            action: "spawned_recurring",
            actor_id: actor.id,
            actor_kind: actor.kind,
            details: json!({
                "title": new_task.title,
                "spawned_from": source.id,
                "recurring_root": root_id,
                "recurrence_pattern": pattern,
                "next_due": due.to_rfc3339(),
                "cloned_subtasks": cloned_subtasks,
            }),
            client_id,
            client_name,
        },
    )
    .await?;

    info!(
        new_task_id = new_task.id,
        spawned_from = source.id,
        "Spawned recurring successor"
    );

    Ok(Some(SpawnOutcome {
        new_task,
        cloned_subtasks,
    }))
}

/// Deep-clone the subtree under `source_parent_id` onto `new_parent`,
/// resetting state and stripping recurrence from the clones. One audit entry
/// per clone. Returns the number of clones, nested included.
async fn clone_subtasks(
    conn: &mut SqliteConnection,
    source_parent_id: i64,
    new_parent: &Task,
    actor: &Worker,
    client_id: Option<&str>,
    client_name: Option<&str>,
) -> Result<i64> {
    let children = tasks::subtasks(&mut *conn, source_parent_id).await?;
    let mut cloned = 0;

    for child in children {
        let clone = tasks::insert(
            &mut *conn,
            &tasks::TaskInsert {
                title: child.title.clone(),
                description: child.description.clone(),
                status: TaskStatus::Pending,
                priority: child.priority,
                progress_percent: 0,
                tags: child.tags.clone(),
                due_date: child.due_date,
                project_id: new_parent.project_id,
                assignee_id: child.assignee_id,
                parent_task_id: Some(new_parent.id),
                created_by_id: actor.id,
                is_recurring: false,
                recurrence_pattern: None,
                max_occurrences: None,
                recurring_root_id: None,
                recurrence_trigger: Default::default(),
                clone_subtasks_on_recur: false,
            },
        )
        .await?;
        cloned += 1;

        audit::append(
            &mut *conn,
            audit::AuditRecord {
                entity_type: EntityType::Task,
                entity_id: clone.id,
                action: "cloned_subtask",
                actor_id: actor.id,
                actor_kind: actor.kind,
                details: json!({
                    "title": clone.title,
                    "cloned_from": child.id,
                    "parent_task_id": new_parent.id,
                }),
                client_id,
                client_name,
            },
        )
        .await?;

        cloned +=
            Box::pin(clone_subtasks(conn, child.id, &clone, actor, client_id, client_name))
                .await?;
    }

    Ok(cloned)
}
