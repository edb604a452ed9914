//! Scheduler adapter: one-shot timed callbacks via the scheduler sidecar.
//!
//! Jobs are named deterministically per task (`spawn-task-<id>`,
//! `reminder-task-<id>`); re-registering a name replaces the job. The sidecar
//! fires the callback as a POST to `/api/jobs/trigger` with the payload
//! echoed under `data`. Registration and cancellation failures are logged
//! and never fail the user-facing request.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use taskflow_core::models::Task;
use tracing::{info, warn};

#[derive(Clone)]
pub struct JobScheduler {
    http: reqwest::Client,
    endpoint: String,
}

impl JobScheduler {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    pub fn spawn_job_name(task_id: i64) -> String {
        format!("spawn-task-{task_id}")
    }

    pub fn reminder_job_name(task_id: i64) -> String {
        format!("reminder-task-{task_id}")
    }

    /// Register a one-shot job. `due_time` goes out as RFC3339.
    pub async fn schedule(&self, job_name: &str, due_time: DateTime<Utc>, data: Value) -> bool {
        let url = format!("{}/v1.0-alpha1/jobs/{job_name}", self.endpoint);
        let payload = json!({
            "dueTime": due_time.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            "data": data,
        });

        match self.http.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!(job_name, due_time = %due_time, "Scheduled job");
                true
            }
            Ok(response) => {
                warn!(job_name, status = %response.status(), "Job registration rejected");
                false
            }
            Err(e) => {
                warn!(job_name, error = %e, "Job registration failed");
                false
            }
        }
    }

    /// Cancel a job by name. A missing job counts as cancelled.
    pub async fn cancel(&self, job_name: &str) -> bool {
        let url = format!("{}/v1.0-alpha1/jobs/{job_name}", self.endpoint);
        match self.http.delete(&url).send().await {
            Ok(response)
                if response.status().is_success() || response.status().as_u16() == 500 =>
            {
                info!(job_name, "Cancelled job");
                true
            }
            Ok(response) => {
                warn!(job_name, status = %response.status(), "Job cancellation rejected");
                false
            }
            Err(e) => {
                warn!(job_name, error = %e, "Job cancellation failed");
                false
            }
        }
    }

    /// Register the due-date spawn callback for a recurring task. Skipped
    /// when the due date has already passed: the completion path owns the
    /// spawn then.
    pub async fn schedule_spawn(&self, task: &Task) -> bool {
        let Some(due_date) = task.due_date else {
            return false;
        };
        if due_date <= Utc::now() {
            info!(task_id = task.id, "Due date already passed, not scheduling spawn");
            return false;
        }
        self.schedule(
            &Self::spawn_job_name(task.id),
            due_date,
            json!({ "type": "spawn", "task_id": task.id }),
        )
        .await
    }

    /// Register the reminder callback at `due_date - 24h`. When the due date
    /// is already within 24 hours the reminder fires immediately and
    /// `hours_until_due` carries the rounded remaining hours.
    pub async fn schedule_reminder(&self, task: &Task, user_id: &str) -> bool {
        let Some(due_date) = task.due_date else {
            return false;
        };

        let now = Utc::now();
        let reminder_at = due_date - chrono::Duration::hours(24);
        let (fire_at, hours_until_due) = if reminder_at <= now {
            let remaining = due_date - now;
            let hours = (remaining.num_minutes() as f64 / 60.0).round() as i64;
            (now, hours)
        } else {
            (reminder_at, 24)
        };

        self.schedule(
            &Self::reminder_job_name(task.id),
            fire_at,
            json!({
                "type": "reminder",
                "task_id": task.id,
                "user_id": user_id,
                "title": task.title,
                "project_id": task.project_id,
                "due_at": due_date.to_rfc3339(),
                "hours_until_due": hours_until_due,
            }),
        )
        .await
    }

    /// Cancel both outstanding jobs for a task, e.g. on delete.
    pub async fn cancel_task_jobs(&self, task_id: i64) {
        self.cancel(&Self::spawn_job_name(task_id)).await;
        self.cancel(&Self::reminder_job_name(task_id)).await;
    }
}
