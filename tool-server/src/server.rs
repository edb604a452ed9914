//! JSON-over-HTTP tool transport.
//!
//! Stateless: every request authenticates independently, dispatch is a
//! registry lookup plus schema validation, and tool failures come back as
//! structured `{error, message, status_code}` objects rather than transport
//! errors.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use taskflow_auth::{
    authorization_server_metadata, bearer_challenge, parse_bearer, protected_resource_metadata,
    AuthError, IdentityVerifier,
};

use crate::{
    api_client::{ApiClient, ApiError},
    context::{current, with_context, Credential, ToolContext},
    registry,
};

#[derive(Clone)]
pub struct McpState {
    pub client: ApiClient,
    pub verifier: Arc<IdentityVerifier>,
    pub dev_mode: bool,
    pub resource_url: String,
}

pub fn app(state: McpState) -> Router {
    Router::new()
        .route("/mcp", post(rpc_handler))
        .route("/health", get(health_handler))
        .route(
            "/.well-known/oauth-authorization-server",
            get(authorization_server_handler),
        )
        .route(
            "/.well-known/oauth-authorization-server/mcp",
            get(authorization_server_handler),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            get(protected_resource_handler),
        )
        .route(
            "/.well-known/oauth-protected-resource/mcp",
            get(protected_resource_handler),
        )
        .layer(from_fn_with_state(state.clone(), authenticate))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

fn is_public(path: &str) -> bool {
    matches!(
        path,
        "/health"
            | "/.well-known/oauth-authorization-server"
            | "/.well-known/oauth-authorization-server/mcp"
            | "/.well-known/oauth-protected-resource"
            | "/.well-known/oauth-protected-resource/mcp"
    )
}

/// Authentication middleware. Installs the task-local caller context for the
/// duration of the handler; the scope clears it on every exit path.
async fn authenticate(State(state): State<McpState>, request: Request, next: Next) -> Response {
    if is_public(request.uri().path()) {
        return next.run(request).await;
    }

    let headers = request.headers().clone();

    let ctx = if state.dev_mode {
        let user_id = headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("dev-user")
            .to_string();
        let tenant_header = headers
            .get("x-tenant-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        ToolContext {
            principal: state.verifier.dev_principal(Some(&user_id)),
            credential: Credential::Dev { user_id },
            tenant_header,
        }
    } else {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_bearer)
            .map(str::to_string);

        let Some(token) = token else {
            return challenge_response(
                &state,
                AuthError::MissingCredential("Missing Authorization header".to_string()),
            );
        };

        match state.verifier.verify(&token).await {
            Ok(principal) => ToolContext {
                principal,
                credential: Credential::Bearer(token),
                tenant_header: None,
            },
            Err(err) => return challenge_response(&state, err),
        }
    };

    with_context(ctx, next.run(request)).await
}

/// 401 with a bearer challenge naming the discovery URIs, so clients can
/// self-configure. IdP outages surface as 503 instead.
fn challenge_response(state: &McpState, err: AuthError) -> Response {
    let config = state.verifier.config();

    if let AuthError::IdpUnavailable(_) = err {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "idp_unavailable",
                "error_description": err.to_string(),
            })),
        )
            .into_response();
    }

    warn!(error = %err, "Tool call rejected");
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, bearer_challenge(config))],
        Json(json!({
            "error": "unauthorized",
            "error_description": err.to_string(),
            "auth_uri": config.device_authorization_url(),
        })),
    )
        .into_response()
}

async fn health_handler(State(state): State<McpState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "taskflow-mcp",
        "auth_mode": if state.dev_mode { "dev" } else { "oauth" },
    }))
}

async fn authorization_server_handler(State(state): State<McpState>) -> Json<Value> {
    Json(authorization_server_metadata(state.verifier.config()))
}

async fn protected_resource_handler(State(state): State<McpState>) -> Json<Value> {
    Json(protected_resource_metadata(
        state.verifier.config(),
        &state.resource_url,
    ))
}

fn success_response(id: Option<Value>, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn protocol_error(id: Option<Value>, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

/// Structured tool failure, returned as a result rather than a transport
/// error so agents can read it.
fn tool_error(message: &str, status_code: u16) -> Value {
    json!({ "error": true, "message": message, "status_code": status_code })
}

impl From<ApiError> for Value {
    fn from(err: ApiError) -> Value {
        tool_error(&err.message, err.status_code)
    }
}

/// JSON-RPC endpoint. Accepts `tools/list`, `tools/call` with
/// `{name, arguments}`, and tool names invoked directly as methods.
async fn rpc_handler(State(state): State<McpState>, Json(request): Json<Value>) -> Json<Value> {
    let id = request.get("id").cloned();

    let Some(method) = request.get("method").and_then(Value::as_str) else {
        return Json(protocol_error(
            id,
            -32600,
            "Missing or invalid 'method' field",
        ));
    };
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    let response = match method {
        "tools/list" => {
            let tools: Vec<Value> = registry::TOOLS
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "inputSchema": registry::input_schema(tool),
                    })
                })
                .collect();
            success_response(id, json!({ "tools": tools }))
        }
        "tools/call" => {
            let Some(name) = params.get("name").and_then(Value::as_str) else {
                return Json(protocol_error(id, -32602, "Missing tool name"));
            };
            let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
            let result = call_tool(&state, name, arguments).await;
            success_response(id, result)
        }
        name if registry::find(name).is_some() => {
            let result = call_tool(&state, name, params).await;
            success_response(id, result)
        }
        other => protocol_error(id, -32601, &format!("Unknown method: {other}")),
    };

    Json(response)
}

/// Look the tool up, validate arguments against its schema, then dispatch.
async fn call_tool(state: &McpState, name: &str, arguments: Value) -> Value {
    let Some(spec) = registry::find(name) else {
        return tool_error(&format!("Unknown tool: {name}"), 400);
    };

    let args: Map<String, Value> = match arguments {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        _ => return tool_error("Tool arguments must be an object", 400),
    };

    if let Err(message) = registry::validate_args(spec, &args) {
        return tool_error(&message, 400);
    }

    let Some(ctx) = current() else {
        return tool_error("No authenticated caller", 401);
    };

    info!(tool = name, caller = %ctx.principal.external_id, "Dispatching tool call");

    match dispatch(state, &ctx, name, &args).await {
        Ok(result) => result,
        Err(err) => err.into(),
    }
}

fn arg_i64(args: &Map<String, Value>, name: &str) -> i64 {
    args.get(name).and_then(Value::as_i64).unwrap_or_default()
}

/// Body for the REST call: the declared optional fields that were provided.
fn passthrough_body(args: &Map<String, Value>, fields: &[&str]) -> Value {
    let mut body = Map::new();
    for field in fields {
        if let Some(value) = args.get(*field) {
            if !value.is_null() {
                body.insert(field.to_string(), value.clone());
            }
        }
    }
    Value::Object(body)
}

async fn dispatch(
    state: &McpState,
    ctx: &ToolContext,
    name: &str,
    args: &Map<String, Value>,
) -> Result<Value, ApiError> {
    match name {
        "add-task" => {
            let project_id = arg_i64(args, "project_id");
            let body = passthrough_body(
                args,
                &[
                    "title",
                    "description",
                    "priority",
                    "assignee_id",
                    "due_date",
                    "tags",
                    "is_recurring",
                    "recurrence_pattern",
                    "max_occurrences",
                ],
            );
            let task = state
                .client
                .post(ctx, &format!("/api/projects/{project_id}/tasks"), body)
                .await?;
            Ok(json!({
                "task_id": task.get("id"),
                "status": "created",
                "title": task.get("title"),
            }))
        }
        "list-tasks" => {
            let project_id = arg_i64(args, "project_id");
            let mut query = Vec::new();
            for field in ["status", "priority", "search", "tags"] {
                if let Some(value) = args.get(field).and_then(Value::as_str) {
                    query.push(format!("{field}={value}"));
                }
            }
            for field in ["assignee_id", "limit", "offset"] {
                if let Some(value) = args.get(field).and_then(Value::as_i64) {
                    query.push(format!("{field}={value}"));
                }
            }
            let path = if query.is_empty() {
                format!("/api/projects/{project_id}/tasks")
            } else {
                format!("/api/projects/{project_id}/tasks?{}", query.join("&"))
            };
            state.client.get(ctx, &path).await
        }
        "get-task" => {
            let task_id = arg_i64(args, "task_id");
            state.client.get(ctx, &format!("/api/tasks/{task_id}")).await
        }
        "update-task" => {
            let task_id = arg_i64(args, "task_id");
            let body = passthrough_body(
                args,
                &["title", "description", "priority", "tags", "due_date"],
            );
            let task = state
                .client
                .put(ctx, &format!("/api/tasks/{task_id}"), body)
                .await?;
            Ok(json!({
                "task_id": task.get("id"),
                "status": "updated",
                "title": task.get("title"),
            }))
        }
        "delete-task" => {
            let task_id = arg_i64(args, "task_id");
            let result = state
                .client
                .delete(ctx, &format!("/api/tasks/{task_id}"))
                .await?;
            Ok(json!({
                "task_id": task_id,
                "status": "deleted",
                "subtasks_deleted": result.get("subtasks_deleted"),
            }))
        }
        "update-status" => {
            let task_id = arg_i64(args, "task_id");
            let body = passthrough_body(args, &["status"]);
            let task = state
                .client
                .patch(ctx, &format!("/api/tasks/{task_id}/status"), body)
                .await?;
            Ok(json!({
                "task_id": task.get("id"),
                "status": task.get("status"),
                "title": task.get("title"),
            }))
        }
        "update-progress" => {
            let task_id = arg_i64(args, "task_id");
            let body = passthrough_body(args, &["percent", "note"]);
            let task = state
                .client
                .patch(ctx, &format!("/api/tasks/{task_id}/progress"), body)
                .await?;
            Ok(json!({
                "task_id": task.get("id"),
                "status": "progress_updated",
                "progress_percent": task.get("progress_percent"),
            }))
        }
        "assign-task" => {
            let task_id = arg_i64(args, "task_id");
            let body = passthrough_body(args, &["assignee_id"]);
            let task = state
                .client
                .patch(ctx, &format!("/api/tasks/{task_id}/assign"), body)
                .await?;
            Ok(json!({
                "task_id": task.get("id"),
                "status": "assigned",
                "assignee_handle": task.get("assignee_handle"),
            }))
        }
        "list-projects" => {
            let mut query = Vec::new();
            for field in ["limit", "offset"] {
                if let Some(value) = args.get(field).and_then(Value::as_i64) {
                    query.push(format!("{field}={value}"));
                }
            }
            let path = if query.is_empty() {
                "/api/projects".to_string()
            } else {
                format!("/api/projects?{}", query.join("&"))
            };
            state.client.get(ctx, &path).await
        }
        // find() succeeded, so the registry and this match are out of sync
        other => Ok(tool_error(&format!("Tool not wired: {other}"), 500)),
    }
}
