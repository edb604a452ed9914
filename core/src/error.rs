use crate::models::TaskStatus;
use thiserror::Error;

/// Result type alias for TaskFlow operations
pub type Result<T> = std::result::Result<T, TaskflowError>;

/// Error taxonomy for the TaskFlow platform.
///
/// Each variant maps to the HTTP status code the transport layer reports.
/// Validation and invariant violations are 400; tenant-scoped misses collapse
/// into 404 regardless of whether the entity exists in another tenant;
/// transient upstream failures map to 503.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskflowError {
    /// Malformed input (illegal slug, percent out of range, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Status transition not permitted by the state machine
    #[error("Invalid status transition from '{from}' to '{to}'")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    /// Progress updates require an in_progress task
    #[error("Can only update progress for in_progress tasks")]
    NotInProgress,

    /// Setting this parent would make the task its own ancestor
    #[error("Setting parent task {0} would create a cycle")]
    CycleDetected(i64),

    /// Assignee or parent check failed project membership
    #[error("Worker {0} is not a member of this project")]
    NotAMember(i64),

    /// Default projects cannot be deleted
    #[error("Cannot delete default project")]
    CannotDeleteDefault,

    /// Project still holds tasks and force was not requested
    #[error("Project has {0} tasks. Delete tasks first or use force=true")]
    HasTasks(i64),

    /// Entity absent within the caller's tenant scope
    #[error("{0} not found")]
    NotFound(String),

    /// Authenticated but not permitted (non-owner update, non-member read)
    #[error("{0}")]
    Forbidden(String),

    /// No valid credential presented
    #[error("{0}")]
    Unauthorized(String),

    /// Duplicate slug within tenant, duplicate handle, duplicate membership
    #[error("{0}")]
    Conflict(String),

    /// Identity provider unreachable or failing
    #[error("Authentication service unavailable: {0}")]
    IdpUnavailable(String),

    /// Database failure; transient errors surface here after retry
    #[error("Database error: {0}")]
    Database(String),

    /// Unexpected internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TaskflowError {
    pub fn not_found_task(id: i64) -> Self {
        Self::NotFound(format!("Task {id}"))
    }

    pub fn not_found_project(id: i64) -> Self {
        Self::NotFound(format!("Project {id}"))
    }

    pub fn not_found_worker(id: i64) -> Self {
        Self::NotFound(format!("Worker {id}"))
    }

    pub fn invalid_transition(from: TaskStatus, to: TaskStatus) -> Self {
        Self::InvalidTransition { from, to }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TaskflowError::NotFound(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, TaskflowError::Validation(_))
    }

    /// HTTP status code for the transport layer.
    pub fn status_code(&self) -> u16 {
        match self {
            TaskflowError::Validation(_)
            | TaskflowError::InvalidTransition { .. }
            | TaskflowError::NotInProgress
            | TaskflowError::CycleDetected(_)
            | TaskflowError::NotAMember(_)
            | TaskflowError::CannotDeleteDefault
            | TaskflowError::HasTasks(_)
            | TaskflowError::Conflict(_) => 400,
            TaskflowError::Unauthorized(_) => 401,
            TaskflowError::Forbidden(_) => 403,
            TaskflowError::NotFound(_) => 404,
            TaskflowError::Internal(_) => 500,
            TaskflowError::IdpUnavailable(_) | TaskflowError::Database(_) => 503,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(TaskflowError::not_found_task(42).status_code(), 404);
        assert_eq!(
            TaskflowError::invalid_transition(TaskStatus::Pending, TaskStatus::Completed)
                .status_code(),
            400
        );
        assert_eq!(TaskflowError::NotInProgress.status_code(), 400);
        assert_eq!(TaskflowError::CycleDetected(3).status_code(), 400);
        assert_eq!(
            TaskflowError::Conflict("slug taken".to_string()).status_code(),
            400
        );
        assert_eq!(
            TaskflowError::Forbidden("Only project owner can update".to_string()).status_code(),
            403
        );
        assert_eq!(
            TaskflowError::Unauthorized("missing bearer".to_string()).status_code(),
            401
        );
        assert_eq!(
            TaskflowError::IdpUnavailable("timeout".to_string()).status_code(),
            503
        );
        assert_eq!(
            TaskflowError::Database("pool gone".to_string()).status_code(),
            503
        );
    }

    #[test]
    fn test_error_display() {
        let err = TaskflowError::invalid_transition(TaskStatus::Pending, TaskStatus::Completed);
        assert_eq!(
            err.to_string(),
            "Invalid status transition from 'pending' to 'completed'"
        );

        let err = TaskflowError::not_found_project(9);
        assert_eq!(err.to_string(), "Project 9 not found");
        assert!(err.is_not_found());
    }
}
