//! Consumer tests: deliver events over HTTP and check the stored
//! notifications.

use serde_json::{json, Value};
use taskflow_notify::{app, routes::NotifyState, store::NotifyStore};

async fn spawn_service() -> (String, NotifyStore) {
    let store = NotifyStore::connect(":memory:").await.expect("connect");
    store.migrate().await.expect("migrate");

    let state = NotifyState {
        store: store.clone(),
        pubsub_name: "taskflow-pubsub".to_string(),
    };
    let router = app(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{addr}"), store)
}

#[tokio::test]
async fn subscriptions_advertise_both_topics() {
    let (base, _store) = spawn_service().await;
    let subs: Vec<Value> = reqwest::get(format!("{base}/events/subscriptions"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let topics: Vec<&str> = subs.iter().map(|s| s["topic"].as_str().unwrap()).collect();
    assert_eq!(topics, vec!["task-events", "reminders"]);
}

#[tokio::test]
async fn assigned_event_creates_notification() {
    let (base, store) = spawn_service().await;

    let response = reqwest::Client::new()
        .post(format!("{base}/events/task-events"))
        .json(&json!({
            "event_type": "task.assigned",
            "data": {
                "task_id": 9,
                "task_title": "Review PR",
                "user_id": "user-2",
                "actor_id": "user-1",
                "actor_name": "Sarah",
                "project_id": 4,
            },
            "timestamp": "2025-06-01T12:00:00Z",
        }))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "SUCCESS");

    let stored = store.list_for_user("user-2").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].kind, "task_assigned");
    assert_eq!(stored[0].task_id, Some(9));
    assert!(stored[0].body.contains("Sarah"));
}

#[tokio::test]
async fn cloudevents_wrapped_payload_is_unwrapped() {
    let (base, store) = spawn_service().await;

    reqwest::Client::new()
        .post(format!("{base}/events/task-events"))
        .json(&json!({
            "specversion": "1.0",
            "type": "io.taskflow.event",
            "data": {
                "event_type": "task.spawned",
                "data": {
                    "task_id": 11,
                    "task_title": "Daily standup",
                    "user_id": "user-3",
                    "spawned_from": 10,
                    "recurring_root": 10,
                },
                "timestamp": "2025-06-01T12:00:00Z",
            },
        }))
        .send()
        .await
        .unwrap();

    let stored = store.list_for_user("user-3").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].kind, "task_spawned");
}

#[tokio::test]
async fn reminder_due_creates_reminder_notification() {
    let (base, store) = spawn_service().await;

    reqwest::Client::new()
        .post(format!("{base}/events/reminders"))
        .json(&json!({
            "event_type": "reminder.due",
            "data": {
                "task_id": 5,
                "user_id": "user-4",
                "title": "File taxes",
                "due_at": "2025-04-15T00:00:00Z",
                "hours_until_due": 24,
                "project_id": 2,
            },
            "timestamp": "2025-04-14T00:00:00Z",
        }))
        .send()
        .await
        .unwrap();

    let stored = store.list_for_user("user-4").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].kind, "task_reminder");
    assert_eq!(stored[0].title, "Task due in 24 hours");
}

#[tokio::test]
async fn malformed_events_are_acknowledged() {
    let (base, _store) = spawn_service().await;

    let response = reqwest::Client::new()
        .post(format!("{base}/events/task-events"))
        .json(&json!({ "unexpected": "shape" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "SUCCESS");
}
