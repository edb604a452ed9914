//! End-to-end tool-call tests: a dev-mode REST API and the tool server in
//! front of it, driven over the JSON transport.

use serde_json::{json, Value};
use taskflow_mcp::{build_state, config::Config, server};

async fn spawn_rest_api() -> String {
    let mut api_config = taskflow_api::config::Config::from_env().expect("api config");
    api_config.idp.dev_mode = true;
    api_config.idp.sso_url = "http://127.0.0.1:1".to_string();
    api_config.sidecar.endpoint = "http://127.0.0.1:1".to_string();

    let db = database::Database::connect(":memory:").await.expect("db");
    db.migrate().await.expect("migrate");

    let state = taskflow_api::build_state(&api_config, db);
    let router = taskflow_api::app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn spawn_tool_server(api_url: &str) -> String {
    let mut config = Config::from_env().expect("mcp config");
    config.api.url = api_url.to_string();
    config.idp.dev_mode = true;
    config.idp.sso_url = "http://127.0.0.1:1".to_string();

    let state = build_state(&config);
    let router = server::app(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn setup() -> (String, reqwest::Client) {
    let api = spawn_rest_api().await;
    let mcp = spawn_tool_server(&api).await;
    (mcp, reqwest::Client::new())
}

async fn rpc(client: &reqwest::Client, base: &str, method: &str, params: Value) -> Value {
    let response = client
        .post(format!("{base}/mcp"))
        .header("X-User-ID", "agent-user")
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        }))
        .send()
        .await
        .expect("rpc call");
    assert_eq!(response.status(), 200);
    response.json().await.expect("rpc body")
}

async fn default_project_id(client: &reqwest::Client, base: &str) -> i64 {
    let response = rpc(client, base, "list-projects", json!({})).await;
    let projects = response["result"].as_array().expect("projects array");
    assert!(!projects.is_empty(), "bootstrap creates a default project");
    projects[0]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn tools_list_advertises_the_registry() {
    let (base, client) = setup().await;
    let response = rpc(&client, &base, "tools/list", json!({})).await;
    let tools = response["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 9);
    assert!(tools.iter().any(|t| t["name"] == "add-task"));
    let add_task = tools.iter().find(|t| t["name"] == "add-task").unwrap();
    assert_eq!(add_task["inputSchema"]["type"], "object");
}

#[tokio::test]
async fn add_then_get_task_through_tools() {
    let (base, client) = setup().await;
    let project_id = default_project_id(&client, &base).await;

    let created = rpc(
        &client,
        &base,
        "tools/call",
        json!({
            "name": "add-task",
            "arguments": { "project_id": project_id, "title": "From agent" },
        }),
    )
    .await;
    assert_eq!(created["result"]["status"], "created");
    let task_id = created["result"]["task_id"].as_i64().unwrap();

    let fetched = rpc(
        &client,
        &base,
        "get-task",
        json!({ "task_id": task_id }),
    )
    .await;
    assert_eq!(fetched["result"]["title"], "From agent");
    assert_eq!(fetched["result"]["status"], "pending");
}

#[tokio::test]
async fn status_transition_and_progress_through_tools() {
    let (base, client) = setup().await;
    let project_id = default_project_id(&client, &base).await;

    let created = rpc(
        &client,
        &base,
        "add-task",
        json!({ "project_id": project_id, "title": "Lifecycle" }),
    )
    .await;
    let task_id = created["result"]["task_id"].as_i64().unwrap();

    let moved = rpc(
        &client,
        &base,
        "update-status",
        json!({ "task_id": task_id, "status": "in_progress" }),
    )
    .await;
    assert_eq!(moved["result"]["status"], "in_progress");

    let progressed = rpc(
        &client,
        &base,
        "update-progress",
        json!({ "task_id": task_id, "percent": 40 }),
    )
    .await;
    assert_eq!(progressed["result"]["progress_percent"], 40);

    // Domain errors surface as structured tool errors, not transport errors
    let invalid = rpc(
        &client,
        &base,
        "update-status",
        json!({ "task_id": task_id, "status": "pending" }),
    )
    .await;
    assert_eq!(invalid["result"]["error"], true);
    assert_eq!(invalid["result"]["status_code"], 400);
}

#[tokio::test]
async fn schema_validation_rejects_bad_arguments() {
    let (base, client) = setup().await;

    // Missing required parameter
    let missing = rpc(&client, &base, "add-task", json!({ "title": "x" })).await;
    assert_eq!(missing["result"]["error"], true);
    assert!(missing["result"]["message"]
        .as_str()
        .unwrap()
        .contains("project_id"));

    // Wrong type
    let wrong = rpc(
        &client,
        &base,
        "update-progress",
        json!({ "task_id": 1, "percent": "half" }),
    )
    .await;
    assert_eq!(wrong["result"]["error"], true);
    assert_eq!(wrong["result"]["status_code"], 400);
}

#[tokio::test]
async fn unknown_method_is_a_protocol_error() {
    let (base, client) = setup().await;
    let response = rpc(&client, &base, "compact-database", json!({})).await;
    assert_eq!(response["error"]["code"], -32601);
}

#[tokio::test]
async fn discovery_documents_are_public() {
    let (base, client) = setup().await;

    let auth_meta: Value = client
        .get(format!("{base}/.well-known/oauth-authorization-server"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(auth_meta["code_challenge_methods_supported"][0], "S256");
    assert!(auth_meta["grant_types_supported"]
        .as_array()
        .unwrap()
        .iter()
        .any(|g| g == "authorization_code"));

    let resource_meta: Value = client
        .get(format!("{base}/.well-known/oauth-protected-resource/mcp"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resource_meta["bearer_methods_supported"][0], "header");

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
}
