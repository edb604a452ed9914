use taskflow_core::TaskflowError;
use thiserror::Error;

/// Typed failures from credential verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Token header names a key id absent from the JWKS
    #[error("Token signing key not found in JWKS")]
    SigningKeyUnknown,

    /// Signed token past its expiry
    #[error("Token expired")]
    TokenExpired,

    /// Credential is not a parseable token
    #[error("Token malformed: {0}")]
    TokenMalformed(String),

    /// Credential parsed but failed verification
    #[error("Token invalid or expired: {0}")]
    TokenInvalid(String),

    /// No credential presented, or the header shape is wrong
    #[error("{0}")]
    MissingCredential(String),

    /// The identity provider could not be reached or is failing
    #[error("Authentication service unavailable: {0}")]
    IdpUnavailable(String),
}

impl From<AuthError> for TaskflowError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::IdpUnavailable(msg) => TaskflowError::IdpUnavailable(msg),
            other => TaskflowError::Unauthorized(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idp_unavailable_maps_to_503() {
        let err: TaskflowError = AuthError::IdpUnavailable("timeout".to_string()).into();
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_token_failures_map_to_401() {
        for err in [
            AuthError::SigningKeyUnknown,
            AuthError::TokenExpired,
            AuthError::TokenMalformed("not a token".to_string()),
            AuthError::TokenInvalid("bad signature".to_string()),
            AuthError::MissingCredential("no header".to_string()),
        ] {
            let mapped: TaskflowError = err.into();
            assert_eq!(mapped.status_code(), 401);
        }
    }
}
