//! HTTP client for the TaskFlow REST API.
//!
//! Presents the caller's own credential on every outbound call: the original
//! bearer token, or the trusted dev headers in development mode. The client
//! is pooled per process; dropping the request future (inbound cancellation)
//! drops the in-flight outbound call with it.

use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::context::{Credential, ToolContext};

/// Failure from the REST API, carrying the envelope's message and status.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status_code: u16,
    pub message: String,
}

impl ApiError {
    fn unreachable(err: &reqwest::Error) -> Self {
        Self {
            status_code: 503,
            message: format!("TaskFlow API unreachable: {err}"),
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into(),
            http,
        }
    }

    pub async fn get(&self, ctx: &ToolContext, path: &str) -> Result<Value, ApiError> {
        self.request(ctx, Method::GET, path, None).await
    }

    pub async fn post(
        &self,
        ctx: &ToolContext,
        path: &str,
        body: Value,
    ) -> Result<Value, ApiError> {
        self.request(ctx, Method::POST, path, Some(body)).await
    }

    pub async fn put(
        &self,
        ctx: &ToolContext,
        path: &str,
        body: Value,
    ) -> Result<Value, ApiError> {
        self.request(ctx, Method::PUT, path, Some(body)).await
    }

    pub async fn patch(
        &self,
        ctx: &ToolContext,
        path: &str,
        body: Value,
    ) -> Result<Value, ApiError> {
        self.request(ctx, Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, ctx: &ToolContext, path: &str) -> Result<Value, ApiError> {
        self.request(ctx, Method::DELETE, path, None).await
    }

    async fn request(
        &self,
        ctx: &ToolContext,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{path}", self.base_url);
        debug!(method = %method, url = %url, "Calling TaskFlow API");

        let mut request = self.http.request(method, &url);
        request = match &ctx.credential {
            Credential::Bearer(token) => request.bearer_auth(token),
            Credential::Dev { user_id } => {
                let mut req = request.header("X-User-ID", user_id);
                if let Some(tenant) = &ctx.tenant_header {
                    req = req.header("X-Tenant-ID", tenant);
                }
                req
            }
        };
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::unreachable(&e))?;
        let status = response.status();

        if status.as_u16() == 204 {
            return Ok(Value::Null);
        }

        let payload: Value = response.json().await.unwrap_or(Value::Null);

        if status.is_success() {
            Ok(payload)
        } else {
            let message = payload
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("API returned {status}"));
            Err(ApiError {
                status_code: status.as_u16(),
                message,
            })
        }
    }
}
