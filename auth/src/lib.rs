//! TaskFlow Identity Verifier
//!
//! Validates the three coexisting credential shapes (signed tokens, opaque
//! tokens, `tf_` API keys) against the external identity provider, caches
//! verification keys process-wide, and produces the canonical [`Principal`]
//! consumed by the REST and tool servers.
//!
//! [`Principal`]: taskflow_core::principal::Principal

pub mod error;
pub mod jwks;
pub mod verifier;

pub use error::AuthError;
pub use jwks::{Jwk, Jwks, JwksCache, JWKS_CACHE_TTL};
pub use verifier::{
    authorization_server_metadata, bearer_challenge, parse_bearer, protected_resource_metadata,
    IdentityVerifier, IdpConfig,
};
