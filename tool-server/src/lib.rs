//! TaskFlow tool-calling server.
//!
//! Exposes the task operations to agent clients over a stateless JSON
//! transport: a static tool registry, per-request authentication with a
//! task-local caller slot, OAuth discovery documents at well-known paths,
//! and a REST client that forwards the caller's own credential.

pub mod api_client;
pub mod config;
pub mod context;
pub mod registry;
pub mod server;

use std::sync::Arc;

use taskflow_auth::IdentityVerifier;

use crate::{api_client::ApiClient, config::Config, server::McpState};

/// Build the shared state from configuration.
pub fn build_state(config: &Config) -> McpState {
    McpState {
        client: ApiClient::new(&config.api.url, config.api.request_timeout),
        verifier: Arc::new(IdentityVerifier::new(config.idp.to_idp_config())),
        dev_mode: config.idp.dev_mode,
        resource_url: config.resource_url(),
    }
}
