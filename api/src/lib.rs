//! TaskFlow REST API service.
//!
//! Routers for projects, members, tasks, agents, audit, and the scheduler
//! callback ingress; services for bootstrapping, event publishing, and job
//! scheduling. The binary in `main.rs` wires configuration, telemetry, and
//! graceful shutdown around [`app`].

pub mod config;
pub mod error;
pub mod middleware;
pub mod routers;
pub mod schemas;
pub mod services;
pub mod state;
pub mod telemetry;

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use database::Database;
use taskflow_auth::IdentityVerifier;

use crate::{
    config::Config,
    services::{events::EventPublisher, jobs::JobScheduler},
    state::AppState,
};

/// Build the shared state from configuration and a connected database.
pub fn build_state(config: &Config, db: Database) -> AppState {
    AppState {
        db,
        verifier: Arc::new(IdentityVerifier::new(config.idp.to_idp_config())),
        events: EventPublisher::new(&config.sidecar.endpoint, &config.sidecar.pubsub_name),
        jobs: JobScheduler::new(&config.sidecar.endpoint),
        dev_mode: config.idp.dev_mode,
    }
}

/// Assemble the router. Authentication wraps every route; the public set is
/// carved out inside the middleware.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routers::health::health))
        .route("/health/ready", get(routers::health::ready))
        .route(
            "/api/projects",
            get(routers::projects::list_projects).post(routers::projects::create_project),
        )
        .route(
            "/api/projects/:project_id",
            get(routers::projects::get_project)
                .put(routers::projects::update_project)
                .delete(routers::projects::delete_project),
        )
        .route(
            "/api/projects/:project_id/members",
            get(routers::members::list_members).post(routers::members::add_member),
        )
        .route(
            "/api/projects/:project_id/members/:worker_id",
            delete(routers::members::remove_member),
        )
        .route(
            "/api/projects/:project_id/tasks",
            get(routers::tasks::list_tasks).post(routers::tasks::create_task),
        )
        .route(
            "/api/projects/:project_id/audit",
            get(routers::audit::project_audit),
        )
        .route("/api/tasks/recent", get(routers::tasks::list_recent))
        .route(
            "/api/tasks/:task_id",
            get(routers::tasks::get_task)
                .put(routers::tasks::update_task)
                .delete(routers::tasks::delete_task),
        )
        .route("/api/tasks/:task_id/status", patch(routers::tasks::update_status))
        .route(
            "/api/tasks/:task_id/progress",
            patch(routers::tasks::update_progress),
        )
        .route("/api/tasks/:task_id/assign", patch(routers::tasks::assign_task))
        .route(
            "/api/tasks/:task_id/subtasks",
            post(routers::tasks::create_subtask),
        )
        .route("/api/tasks/:task_id/approve", post(routers::tasks::approve_task))
        .route("/api/tasks/:task_id/reject", post(routers::tasks::reject_task))
        .route("/api/tasks/:task_id/audit", get(routers::audit::task_audit))
        .route(
            "/api/agents",
            get(routers::agents::list_agents).post(routers::agents::register_agent),
        )
        .route("/api/agents/:worker_id", delete(routers::agents::delete_agent))
        .route("/api/jobs/trigger", post(routers::jobs::trigger))
        .layer(from_fn_with_state(state.clone(), middleware::authenticate))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
