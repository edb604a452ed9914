use crate::error::{Result, TaskflowError};

/// Input validation for TaskFlow entities.
pub struct Validator;

impl Validator {
    /// Validate a project slug.
    ///
    /// Slugs must be 1-100 characters of lowercase letters, digits, and
    /// hyphens. Uniqueness is per tenant and checked at the store layer.
    pub fn validate_slug(slug: &str) -> Result<()> {
        if slug.is_empty() {
            return Err(TaskflowError::Validation(
                "Project slug cannot be empty".to_string(),
            ));
        }
        if slug.len() > 100 {
            return Err(TaskflowError::Validation(
                "Project slug must be at most 100 characters".to_string(),
            ));
        }
        let valid = slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid {
            return Err(TaskflowError::Validation(
                "Project slug can only contain lowercase letters, numbers, and hyphens"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Validate a worker handle.
    ///
    /// Handles start with `@` followed by up to 49 characters of lowercase
    /// letters, digits, hyphens, and underscores.
    pub fn validate_handle(handle: &str) -> Result<()> {
        if !handle.starts_with('@') {
            return Err(TaskflowError::Validation(
                "Worker handle must start with '@'".to_string(),
            ));
        }
        let body = &handle[1..];
        if body.is_empty() {
            return Err(TaskflowError::Validation(
                "Worker handle cannot be empty".to_string(),
            ));
        }
        if handle.len() > 50 {
            return Err(TaskflowError::Validation(
                "Worker handle must be at most 50 characters".to_string(),
            ));
        }
        let valid = body
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
        if !valid {
            return Err(TaskflowError::Validation(
                "Worker handle can only contain lowercase letters, numbers, hyphens, and underscores".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate a task title: non-empty, at most 500 characters.
    pub fn validate_title(title: &str) -> Result<()> {
        if title.trim().is_empty() {
            return Err(TaskflowError::Validation(
                "Task title cannot be empty".to_string(),
            ));
        }
        if title.chars().count() > 500 {
            return Err(TaskflowError::Validation(
                "Task title must be at most 500 characters".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate a progress percentage, 0-100 inclusive.
    pub fn validate_progress(percent: i32) -> Result<()> {
        if !(0..=100).contains(&percent) {
            return Err(TaskflowError::Validation(format!(
                "Progress must be between 0 and 100, got {percent}"
            )));
        }
        Ok(())
    }
}

/// Derive a candidate worker handle from an identity.
///
/// Uses the email local part, lowercased, with `.` and `_` replaced by `-`;
/// falls back to `@user-<first 8 of external id>` when the email is absent.
/// Collision suffixing happens at the store layer.
pub fn derive_handle(email: &str, external_id: &str) -> String {
    let local = email.split('@').next().unwrap_or("");
    if local.is_empty() {
        let prefix: String = external_id.chars().take(8).collect();
        return format!("@user-{}", prefix.to_lowercase());
    }
    let body: String = local
        .to_lowercase()
        .chars()
        .map(|c| if c == '.' || c == '_' { '-' } else { c })
        .collect();
    format!("@{body}")
}

/// Derive the default-project slug for an external identity.
pub fn default_project_slug(external_id: &str) -> String {
    let prefix: String = external_id.chars().take(8).collect();
    format!("default-{}", prefix.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_slug() {
        assert!(Validator::validate_slug("roadmap").is_ok());
        assert!(Validator::validate_slug("q3-2025").is_ok());
        assert!(Validator::validate_slug("").is_err());
        assert!(Validator::validate_slug("Roadmap").is_err());
        assert!(Validator::validate_slug("road map").is_err());
        assert!(Validator::validate_slug("road_map").is_err());
        assert!(Validator::validate_slug(&"a".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_handle() {
        assert!(Validator::validate_handle("@sarah").is_ok());
        assert!(Validator::validate_handle("@claude-code").is_ok());
        assert!(Validator::validate_handle("@dev_bot2").is_ok());
        assert!(Validator::validate_handle("sarah").is_err());
        assert!(Validator::validate_handle("@").is_err());
        assert!(Validator::validate_handle("@Sarah").is_err());
        assert!(Validator::validate_handle(&format!("@{}", "x".repeat(50))).is_err());
    }

    #[test]
    fn test_validate_progress_bounds() {
        assert!(Validator::validate_progress(0).is_ok());
        assert!(Validator::validate_progress(100).is_ok());
        assert!(Validator::validate_progress(-1).is_err());
        assert!(Validator::validate_progress(101).is_err());
    }

    #[test]
    fn test_derive_handle_from_email() {
        assert_eq!(derive_handle("Jane.Doe@example.com", "u-1"), "@jane-doe");
        assert_eq!(derive_handle("dev_ops@example.com", "u-1"), "@dev-ops");
    }

    #[test]
    fn test_derive_handle_without_email() {
        assert_eq!(derive_handle("", "ABCDEFGH1234"), "@user-abcdefgh");
    }

    #[test]
    fn test_default_project_slug() {
        assert_eq!(default_project_slug("User1234xyz"), "default-user1234");
    }
}
