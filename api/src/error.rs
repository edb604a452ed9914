use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use taskflow_core::TaskflowError;

/// Transport wrapper translating domain errors into the error envelope
/// `{error, status_code}`.
#[derive(Debug)]
pub struct ApiError(pub TaskflowError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<TaskflowError> for ApiError {
    fn from(err: TaskflowError) -> Self {
        ApiError(err)
    }
}

impl From<taskflow_auth::AuthError> for ApiError {
    fn from(err: taskflow_auth::AuthError) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.0.status_code();
        let status =
            StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code >= 500 {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, "Request rejected");
        }

        let body = Json(json!({
            "error": self.0.to_string(),
            "status_code": status_code,
        }));

        if status_code == 401 {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}
