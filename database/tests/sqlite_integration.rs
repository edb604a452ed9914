//! Store-level integration tests against an in-memory SQLite database.

use database::{audit, projects, tasks, workers, Database};
use serde_json::json;
use taskflow_core::models::{
    AgentFamily, EntityType, MemberRole, TaskFilter, TaskStatus, WorkerKind,
};

async fn setup() -> Database {
    let db = Database::connect(":memory:").await.expect("connect");
    db.migrate().await.expect("migrate");
    db
}

#[tokio::test]
async fn test_worker_handle_collision_suffixes() {
    let db = setup().await;
    let mut conn = db.acquire().await.unwrap();

    let first = workers::create_human(&mut conn, "user-1", "jane.doe@example.com", "Jane")
        .await
        .unwrap();
    assert_eq!(first.handle, "@jane-doe");
    assert_eq!(first.kind, WorkerKind::Human);

    let second = workers::create_human(&mut conn, "user-2", "jane_doe@other.com", "Jane 2")
        .await
        .unwrap();
    assert_eq!(second.handle, "@jane-doe-1");

    let third = workers::create_human(&mut conn, "user-3", "jane.doe@third.com", "Jane 3")
        .await
        .unwrap();
    assert_eq!(third.handle, "@jane-doe-2");
}

#[tokio::test]
async fn test_worker_delete_blocked_by_membership() {
    let db = setup().await;
    let mut conn = db.acquire().await.unwrap();

    let worker = workers::create_human(&mut conn, "user-1", "a@example.com", "A")
        .await
        .unwrap();
    let project = projects::insert(&mut conn, "t1", "p1", "P1", None, "user-1", false)
        .await
        .unwrap();
    projects::add_member(&mut conn, project.id, worker.id, MemberRole::Owner)
        .await
        .unwrap();

    assert!(workers::delete(&mut conn, worker.id).await.is_err());

    projects::remove_member(&mut conn, project.id, worker.id)
        .await
        .unwrap();
    workers::delete(&mut conn, worker.id).await.unwrap();
}

#[tokio::test]
async fn test_slug_unique_per_tenant_not_global() {
    let db = setup().await;
    let mut conn = db.acquire().await.unwrap();

    projects::insert(&mut conn, "tenant-a", "roadmap", "A", None, "u1", false)
        .await
        .unwrap();
    // Same slug in another tenant is fine
    projects::insert(&mut conn, "tenant-b", "roadmap", "B", None, "u2", false)
        .await
        .unwrap();
    // Duplicate within the tenant is a conflict
    let dup = projects::insert(&mut conn, "tenant-a", "roadmap", "A2", None, "u1", false).await;
    assert!(matches!(
        dup,
        Err(taskflow_core::TaskflowError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_cross_tenant_read_is_none() {
    let db = setup().await;
    let mut conn = db.acquire().await.unwrap();

    let project = projects::insert(&mut conn, "t1", "s", "A", None, "u1", false)
        .await
        .unwrap();
    assert!(projects::by_id_in_tenant(&mut conn, project.id, "t1")
        .await
        .unwrap()
        .is_some());
    assert!(projects::by_id_in_tenant(&mut conn, project.id, "t2")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_task_create_read_round_trip() {
    let db = setup().await;
    let mut conn = db.acquire().await.unwrap();

    let worker = workers::create_human(&mut conn, "user-1", "a@example.com", "A")
        .await
        .unwrap();
    let project = projects::insert(&mut conn, "t1", "p1", "P1", None, "user-1", false)
        .await
        .unwrap();

    let mut insert = tasks::TaskInsert::new(project.id, worker.id, "Write docs");
    insert.tags = vec!["docs".to_string(), "q3".to_string()];
    let created = tasks::insert(&mut conn, &insert).await.unwrap();

    let fetched = tasks::by_id(&mut conn, created.id).await.unwrap().unwrap();
    assert_eq!(fetched, created);
    assert_eq!(fetched.status, TaskStatus::Pending);
    assert_eq!(fetched.progress_percent, 0);
    assert_eq!(fetched.tags, vec!["docs", "q3"]);
}

#[tokio::test]
async fn test_tag_filter_uses_and_logic() {
    let db = setup().await;
    let mut conn = db.acquire().await.unwrap();

    let worker = workers::create_human(&mut conn, "user-1", "a@example.com", "A")
        .await
        .unwrap();
    let project = projects::insert(&mut conn, "t1", "p1", "P1", None, "user-1", false)
        .await
        .unwrap();

    let mut a = tasks::TaskInsert::new(project.id, worker.id, "both");
    a.tags = vec!["x".to_string(), "y".to_string()];
    tasks::insert(&mut conn, &a).await.unwrap();

    let mut b = tasks::TaskInsert::new(project.id, worker.id, "only-x");
    b.tags = vec!["x".to_string()];
    tasks::insert(&mut conn, &b).await.unwrap();

    let filter = TaskFilter {
        tags: vec!["x".to_string(), "y".to_string()],
        limit: 50,
        ..Default::default()
    };
    let found = tasks::list(&mut conn, project.id, &filter).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].title, "both");
}

#[tokio::test]
async fn test_cycle_detection_walks_parent_chain() {
    let db = setup().await;
    let mut conn = db.acquire().await.unwrap();

    let worker = workers::create_human(&mut conn, "user-1", "a@example.com", "A")
        .await
        .unwrap();
    let project = projects::insert(&mut conn, "t1", "p1", "P1", None, "user-1", false)
        .await
        .unwrap();

    let a = tasks::insert(&mut conn, &tasks::TaskInsert::new(project.id, worker.id, "A"))
        .await
        .unwrap();
    let mut b_insert = tasks::TaskInsert::new(project.id, worker.id, "B");
    b_insert.parent_task_id = Some(a.id);
    let b = tasks::insert(&mut conn, &b_insert).await.unwrap();
    let mut c_insert = tasks::TaskInsert::new(project.id, worker.id, "C");
    c_insert.parent_task_id = Some(b.id);
    let c = tasks::insert(&mut conn, &c_insert).await.unwrap();

    // A under C closes the loop
    assert!(tasks::would_cycle(&mut conn, a.id, c.id).await.unwrap());
    // A task is trivially its own ancestor
    assert!(tasks::would_cycle(&mut conn, a.id, a.id).await.unwrap());
    // Sibling re-parenting is fine
    assert!(!tasks::would_cycle(&mut conn, c.id, a.id).await.unwrap());
}

#[tokio::test]
async fn test_delete_subtree_post_order() {
    let db = setup().await;
    let mut conn = db.acquire().await.unwrap();

    let worker = workers::create_human(&mut conn, "user-1", "a@example.com", "A")
        .await
        .unwrap();
    let project = projects::insert(&mut conn, "t1", "p1", "P1", None, "user-1", false)
        .await
        .unwrap();

    let a = tasks::insert(&mut conn, &tasks::TaskInsert::new(project.id, worker.id, "A"))
        .await
        .unwrap();
    let mut b_insert = tasks::TaskInsert::new(project.id, worker.id, "B");
    b_insert.parent_task_id = Some(a.id);
    let b = tasks::insert(&mut conn, &b_insert).await.unwrap();
    let mut c_insert = tasks::TaskInsert::new(project.id, worker.id, "C");
    c_insert.parent_task_id = Some(a.id);
    let c = tasks::insert(&mut conn, &c_insert).await.unwrap();
    let mut d_insert = tasks::TaskInsert::new(project.id, worker.id, "D");
    d_insert.parent_task_id = Some(b.id);
    let d = tasks::insert(&mut conn, &d_insert).await.unwrap();

    let deleted = tasks::delete_subtree(&mut conn, a.id).await.unwrap();
    assert_eq!(deleted.len(), 4);
    // Root comes last; D (deepest under B) before B
    assert_eq!(*deleted.last().unwrap(), a.id);
    let d_pos = deleted.iter().position(|&id| id == d.id).unwrap();
    let b_pos = deleted.iter().position(|&id| id == b.id).unwrap();
    assert!(d_pos < b_pos);

    for id in [a.id, b.id, c.id, d.id] {
        assert!(tasks::by_id(&mut conn, id).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn test_spawn_count_includes_root() {
    let db = setup().await;
    let mut conn = db.acquire().await.unwrap();

    let worker = workers::create_human(&mut conn, "user-1", "a@example.com", "A")
        .await
        .unwrap();
    let project = projects::insert(&mut conn, "t1", "p1", "P1", None, "user-1", false)
        .await
        .unwrap();

    let mut root_insert = tasks::TaskInsert::new(project.id, worker.id, "R");
    root_insert.is_recurring = true;
    root_insert.recurrence_pattern = Some("daily".to_string());
    let root = tasks::insert(&mut conn, &root_insert).await.unwrap();

    assert_eq!(tasks::spawn_count(&mut conn, root.id).await.unwrap(), 1);

    let mut succ_insert = tasks::TaskInsert::new(project.id, worker.id, "R");
    succ_insert.is_recurring = true;
    succ_insert.recurrence_pattern = Some("daily".to_string());
    succ_insert.recurring_root_id = Some(root.id);
    tasks::insert(&mut conn, &succ_insert).await.unwrap();

    assert_eq!(tasks::spawn_count(&mut conn, root.id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_audit_append_and_ordering() {
    let db = setup().await;
    let mut conn = db.acquire().await.unwrap();

    let worker = workers::create_human(&mut conn, "user-1", "a@example.com", "A")
        .await
        .unwrap();
    let project = projects::insert(&mut conn, "t1", "p1", "P1", None, "user-1", false)
        .await
        .unwrap();
    let task = tasks::insert(&mut conn, &tasks::TaskInsert::new(project.id, worker.id, "T"))
        .await
        .unwrap();

    for action in ["created", "status_changed", "approved"] {
        audit::append(
            &mut conn,
            audit::AuditRecord {
                entity_type: EntityType::Task,
                entity_id: task.id,
                action,
                actor_id: worker.id,
                actor_kind: WorkerKind::Human,
                details: json!({}),
                client_id: None,
                client_name: None,
            },
        )
        .await
        .unwrap();
    }

    let entries = audit::for_entity(&mut conn, EntityType::Task, task.id, 50, 0)
        .await
        .unwrap();
    assert_eq!(entries.len(), 3);
    // Newest first
    assert_eq!(entries[0].action, "approved");
    assert_eq!(entries[2].action, "created");

    // Project view includes the task's entries
    let project_entries = audit::for_project(&mut conn, project.id, 50, 0).await.unwrap();
    assert_eq!(project_entries.len(), 3);
}

#[tokio::test]
async fn test_agent_registration() {
    let db = setup().await;
    let mut conn = db.acquire().await.unwrap();

    let agent = workers::create_agent(
        &mut conn,
        "@claude-code",
        "Claude Code",
        AgentFamily::Claude,
        &["code".to_string(), "review".to_string()],
    )
    .await
    .unwrap();

    assert_eq!(agent.kind, WorkerKind::Agent);
    assert_eq!(agent.agent_family, Some(AgentFamily::Claude));

    let agents = workers::list_agents(&mut conn).await.unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].capabilities, vec!["code", "review"]);
}
