//! Notification store: the consumer's own database, separate from the task
//! service's store. Missing events are expected; this table is a projection,
//! not a source of truth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Row, SqlitePool,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: i64,
    pub user_id: String,
    pub user_type: String,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub task_id: Option<i64>,
    pub project_id: Option<i64>,
    pub actor_id: Option<String>,
    pub actor_name: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// A notification to insert, before the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: String,
    pub user_type: String,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub task_id: Option<i64>,
    pub project_id: Option<i64>,
    pub actor_id: Option<String>,
    pub actor_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NotifyStore {
    pool: SqlitePool,
}

impl NotifyStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let in_memory = database_url.contains(":memory:");
        let options = SqliteConnectOptions::new()
            .filename(if in_memory {
                ":memory:".to_string()
            } else {
                database_url.replace("sqlite://", "")
            })
            .create_if_missing(true)
            .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new();
        if in_memory {
            pool_options = pool_options.max_connections(1);
        }

        let pool = pool_options.connect_with(options).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn insert(&self, new: NewNotification) -> anyhow::Result<Notification> {
        let row = sqlx::query(
            r#"
            INSERT INTO notifications (user_id, user_type, kind, title, body, task_id,
                                       project_id, actor_id, actor_name, read, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
            RETURNING *
            "#,
        )
        .bind(&new.user_id)
        .bind(&new.user_type)
        .bind(&new.kind)
        .bind(&new.title)
        .bind(&new.body)
        .bind(new.task_id)
        .bind(new.project_id)
        .bind(&new.actor_id)
        .bind(&new.actor_name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(Self::from_row(&row))
    }

    pub async fn list_for_user(&self, user_id: &str) -> anyhow::Result<Vec<Notification>> {
        let rows = sqlx::query(
            "SELECT * FROM notifications WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(Self::from_row).collect())
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Notification {
        Notification {
            id: row.get("id"),
            user_id: row.get("user_id"),
            user_type: row.get("user_type"),
            kind: row.get("kind"),
            title: row.get("title"),
            body: row.get("body"),
            task_id: row.get("task_id"),
            project_id: row.get("project_id"),
            actor_id: row.get("actor_id"),
            actor_name: row.get("actor_name"),
            read: row.get("read"),
            created_at: row.get("created_at"),
        }
    }
}
