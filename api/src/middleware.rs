//! Per-request authentication and tenant resolution.
//!
//! The middleware authenticates every request outside the public set,
//! resolves the tenant, and installs a [`RequestContext`] extension for the
//! handler. The context is request-scoped; nothing global holds the caller
//! identity.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use taskflow_auth::{bearer_challenge, parse_bearer, AuthError};
use taskflow_core::Principal;

use crate::state::AppState;

/// Authenticated caller plus resolved tenant, attached as a request
/// extension.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: Principal,
    pub tenant_id: String,
}

/// Paths served without authentication: liveness/readiness and the scheduler
/// callback ingress (reached by the co-located sidecar).
fn is_public(path: &str) -> bool {
    matches!(path, "/health" | "/health/ready" | "/api/jobs/trigger")
}

pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if is_public(&path) {
        return next.run(request).await;
    }

    let headers = request.headers().clone();
    let dev_user = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let dev_tenant = headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let principal = if state.dev_mode {
        state.verifier.dev_principal(dev_user.as_deref())
    } else {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_bearer);

        let token = match token {
            Some(token) => token.to_string(),
            None => {
                return unauthorized_response(
                    &state,
                    AuthError::MissingCredential(
                        "Missing or malformed Authorization header".to_string(),
                    ),
                )
            }
        };

        match state.verifier.verify(&token).await {
            Ok(principal) => principal,
            Err(err) => return unauthorized_response(&state, err),
        }
    };

    let tenant_id = principal.resolve_tenant(dev_tenant.as_deref(), state.dev_mode);
    request.extensions_mut().insert(RequestContext {
        principal,
        tenant_id,
    });

    next.run(request).await
}

fn unauthorized_response(state: &AppState, err: AuthError) -> Response {
    let status_code = match err {
        AuthError::IdpUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::UNAUTHORIZED,
    };

    tracing::warn!(error = %err, "Authentication failed");

    let body = Json(json!({
        "error": err.to_string(),
        "status_code": status_code.as_u16(),
    }));

    if status_code == StatusCode::UNAUTHORIZED {
        let challenge = bearer_challenge(state.verifier.config());
        (
            status_code,
            [(header::WWW_AUTHENTICATE, challenge)],
            body,
        )
            .into_response()
    } else {
        (status_code, body).into_response()
    }
}
