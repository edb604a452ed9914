//! Credential verification against the external identity provider.
//!
//! Three credential shapes coexist on the same `Authorization: Bearer`
//! header: signed tokens verified locally against cached JWKS, opaque tokens
//! verified via the IdP userinfo endpoint, and long-lived `tf_` API keys
//! verified via the IdP key-verify endpoint.

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use taskflow_core::principal::{CredentialKind, Principal};
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::jwks::JwksCache;

/// Identity-provider endpoints and the development bypass identity.
#[derive(Debug, Clone)]
pub struct IdpConfig {
    /// Base URL of the identity provider
    pub sso_url: String,
    /// When set, verification is bypassed with a canned principal
    pub dev_mode: bool,
    pub dev_user_id: String,
    pub dev_user_email: String,
    pub dev_user_name: String,
}

impl IdpConfig {
    pub fn jwks_url(&self) -> String {
        format!("{}/api/auth/jwks", self.sso_url)
    }

    pub fn userinfo_url(&self) -> String {
        format!("{}/api/auth/oauth2/userinfo", self.sso_url)
    }

    pub fn api_key_verify_url(&self) -> String {
        format!("{}/api/api-key/verify", self.sso_url)
    }

    pub fn authorization_url(&self) -> String {
        format!("{}/api/auth/oauth2/authorize", self.sso_url)
    }

    pub fn token_url(&self) -> String {
        format!("{}/api/auth/oauth2/token", self.sso_url)
    }

    pub fn device_authorization_url(&self) -> String {
        format!("{}/api/auth/device/code", self.sso_url)
    }
}

/// Claims we read out of signed tokens and userinfo responses.
#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(default)]
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default)]
    organization_id: Option<String>,
    #[serde(default)]
    organization_ids: Option<Vec<String>>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_name: Option<String>,
}

impl TokenClaims {
    fn into_principal(self, credential: CredentialKind) -> Principal {
        let organization_ids = self.organization_ids.unwrap_or_default();
        let tenant_claim = self.tenant_id.or(self.organization_id);
        Principal {
            external_id: self.sub,
            email: self.email.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            tenant_claim,
            organization_ids,
            client_id: self.client_id,
            client_name: self.client_name,
            credential,
        }
    }
}

/// API-key verification response: `{valid, key: {id, userId, name}}`.
#[derive(Debug, Deserialize)]
struct ApiKeyVerifyResponse {
    #[serde(default)]
    valid: bool,
    #[serde(default)]
    key: Option<ApiKeyInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiKeyInfo {
    #[serde(default)]
    id: String,
    #[serde(rename = "userId", default)]
    user_id: String,
    #[serde(default)]
    name: String,
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn parse_bearer(header: &str) -> Option<&str> {
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// The Identity Verifier.
///
/// Holds the process-wide JWKS cache and a pooled HTTP client with a 10s
/// timeout for IdP calls.
pub struct IdentityVerifier {
    config: IdpConfig,
    http: reqwest::Client,
    jwks: JwksCache,
}

impl IdentityVerifier {
    pub fn new(config: IdpConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        let jwks = JwksCache::new(config.jwks_url(), http.clone());
        Self { config, http, jwks }
    }

    pub fn config(&self) -> &IdpConfig {
        &self.config
    }

    /// Warm the key cache at startup. Skipped in dev mode.
    pub async fn warm_up(&self) {
        if self.config.dev_mode {
            debug!("Dev mode, skipping JWKS warmup");
            return;
        }
        self.jwks.warm_up().await;
    }

    /// Canned principal for development mode. `user_id` overrides the
    /// configured identity when a trusted header provides one.
    pub fn dev_principal(&self, user_id: Option<&str>) -> Principal {
        let id = user_id.unwrap_or(&self.config.dev_user_id).to_string();
        let email = if user_id.is_some() {
            format!("{id}@dev.local")
        } else {
            self.config.dev_user_email.clone()
        };
        Principal {
            external_id: id,
            email,
            name: self.config.dev_user_name.clone(),
            tenant_claim: None,
            organization_ids: vec![],
            client_id: None,
            client_name: None,
            credential: CredentialKind::Dev,
        }
    }

    /// Verify a bearer credential and return the canonical principal.
    ///
    /// `tf_`-prefixed credentials route to API-key verification. Everything
    /// else attempts signed-token verification first and falls back to
    /// opaque-token verification on any failure that is not an IdP outage.
    pub async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        if token.starts_with("tf_") {
            return self.verify_api_key(token).await;
        }

        match self.verify_signed(token).await {
            Ok(principal) => Ok(principal),
            Err(AuthError::IdpUnavailable(msg)) => Err(AuthError::IdpUnavailable(msg)),
            Err(signed_err) => {
                debug!(error = %signed_err, "Signed verification failed, trying opaque token");
                match self.verify_opaque(token).await {
                    Ok(principal) => Ok(principal),
                    Err(AuthError::IdpUnavailable(msg)) => Err(AuthError::IdpUnavailable(msg)),
                    Err(opaque_err) => {
                        warn!(
                            signed = %signed_err,
                            opaque = %opaque_err,
                            "Both signed and opaque verification failed"
                        );
                        Err(AuthError::TokenInvalid(format!(
                            "signed: {signed_err} | opaque: {opaque_err}"
                        )))
                    }
                }
            }
        }
    }

    /// Local verification of a three-segment signed token against JWKS.
    async fn verify_signed(&self, token: &str) -> Result<Principal, AuthError> {
        let header =
            decode_header(token).map_err(|e| AuthError::TokenMalformed(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::TokenMalformed("missing kid".to_string()))?;

        let jwks = self.jwks.keys().await?;
        let jwk = jwks.find(&kid).ok_or(AuthError::SigningKeyUnknown)?;
        let (n, e) = match (&jwk.n, &jwk.e) {
            (Some(n), Some(e)) => (n.as_str(), e.as_str()),
            _ => return Err(AuthError::SigningKeyUnknown),
        };

        let key = DecodingKey::from_rsa_components(n, e)
            .map_err(|e| AuthError::TokenInvalid(format!("bad JWKS key material: {e}")))?;

        let mut validation = Validation::new(Algorithm::RS256);
        // Audience varies by client
        validation.validate_aud = false;

        let data = decode::<TokenClaims>(token, &key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidToken
                | jsonwebtoken::errors::ErrorKind::Base64(_)
                | jsonwebtoken::errors::ErrorKind::Json(_)
                | jsonwebtoken::errors::ErrorKind::Utf8(_) => {
                    AuthError::TokenMalformed(e.to_string())
                }
                _ => AuthError::TokenInvalid(e.to_string()),
            }
        })?;

        let principal = data.claims.into_principal(CredentialKind::SignedToken);
        info!(sub = %principal.external_id, "Authenticated via signed token");
        Ok(principal)
    }

    /// Verification of an opaque token via the IdP userinfo endpoint.
    async fn verify_opaque(&self, token: &str) -> Result<Principal, AuthError> {
        let response = self
            .http
            .get(self.config.userinfo_url())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::IdpUnavailable(e.to_string()))?;

        match response.status().as_u16() {
            200 => {}
            401 => return Err(AuthError::TokenInvalid("userinfo returned 401".to_string())),
            status => {
                return Err(AuthError::IdpUnavailable(format!(
                    "userinfo returned {status}"
                )))
            }
        }

        let claims: TokenClaims = response
            .json()
            .await
            .map_err(|e| AuthError::IdpUnavailable(format!("invalid userinfo body: {e}")))?;

        let principal = claims.into_principal(CredentialKind::OpaqueToken);
        info!(sub = %principal.external_id, "Authenticated via opaque token");
        Ok(principal)
    }

    /// Verification of a `tf_` API key via the IdP verify endpoint.
    async fn verify_api_key(&self, api_key: &str) -> Result<Principal, AuthError> {
        let response = self
            .http
            .post(self.config.api_key_verify_url())
            .json(&serde_json::json!({ "key": api_key }))
            .send()
            .await
            .map_err(|e| AuthError::IdpUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::IdpUnavailable(format!(
                "api-key verify returned {}",
                response.status()
            )));
        }

        let body: ApiKeyVerifyResponse = response
            .json()
            .await
            .map_err(|e| AuthError::IdpUnavailable(format!("invalid verify body: {e}")))?;

        if !body.valid {
            return Err(AuthError::TokenInvalid(
                "API key not valid or expired".to_string(),
            ));
        }

        let key = body.key.unwrap_or(ApiKeyInfo {
            id: String::new(),
            user_id: String::new(),
            name: String::new(),
        });

        info!(user_id = %key.user_id, key_name = %key.name, "Authenticated via API key");

        // Key verification exposes the owner id only; email stays unknown
        Ok(Principal {
            external_id: key.user_id,
            email: String::new(),
            name: String::new(),
            tenant_claim: None,
            organization_ids: vec![],
            client_id: Some(key.id),
            client_name: Some(key.name),
            credential: CredentialKind::ApiKey,
        })
    }
}

/// Authorization-server metadata document (RFC 8414 shape) advertising the
/// external IdP's endpoints. Served read-only at a well-known path.
pub fn authorization_server_metadata(config: &IdpConfig) -> Value {
    serde_json::json!({
        "issuer": config.sso_url,
        "authorization_endpoint": config.authorization_url(),
        "token_endpoint": config.token_url(),
        "device_authorization_endpoint": config.device_authorization_url(),
        "jwks_uri": config.jwks_url(),
        "scopes_supported": ["openid", "profile", "email"],
        "response_types_supported": ["code"],
        "grant_types_supported": [
            "authorization_code",
            "refresh_token",
            "urn:ietf:params:oauth:grant-type:device_code",
        ],
        "code_challenge_methods_supported": ["S256"],
        "token_endpoint_auth_methods_supported": ["none"],
    })
}

/// Protected-resource metadata document (RFC 9728 shape) for a resource URI.
pub fn protected_resource_metadata(config: &IdpConfig, resource: &str) -> Value {
    serde_json::json!({
        "resource": resource,
        "authorization_servers": [config.sso_url],
        "scopes_supported": ["openid", "profile", "email"],
        "bearer_methods_supported": ["header"],
    })
}

/// `WWW-Authenticate` challenge value naming the discovery endpoints so
/// clients can self-configure after a 401.
pub fn bearer_challenge(config: &IdpConfig) -> String {
    format!(
        "Bearer realm=\"taskflow\", authorization_uri=\"{}\", device_authorization_uri=\"{}\"",
        config.authorization_url(),
        config.device_authorization_url()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dev_mode: bool) -> IdpConfig {
        IdpConfig {
            sso_url: "http://127.0.0.1:1".to_string(),
            dev_mode,
            dev_user_id: "dev-user".to_string(),
            dev_user_email: "dev@taskflow.local".to_string(),
            dev_user_name: "Dev User".to_string(),
        }
    }

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer("Bearer abc123"), Some("abc123"));
        assert_eq!(parse_bearer("Bearer  abc123 "), Some("abc123"));
        assert_eq!(parse_bearer("bearer abc123"), None);
        assert_eq!(parse_bearer("Basic abc123"), None);
        assert_eq!(parse_bearer("Bearer "), None);
    }

    #[test]
    fn test_dev_principal_uses_configured_identity() {
        let verifier = IdentityVerifier::new(test_config(true));
        let principal = verifier.dev_principal(None);
        assert_eq!(principal.external_id, "dev-user");
        assert_eq!(principal.email, "dev@taskflow.local");
        assert_eq!(principal.credential, CredentialKind::Dev);
    }

    #[test]
    fn test_dev_principal_header_override() {
        let verifier = IdentityVerifier::new(test_config(true));
        let principal = verifier.dev_principal(Some("alice"));
        assert_eq!(principal.external_id, "alice");
        assert_eq!(principal.email, "alice@dev.local");
    }

    #[tokio::test]
    async fn test_api_key_routes_to_verify_endpoint() {
        // Unreachable IdP: the tf_ route must fail as unavailable, proving it
        // never attempts local verification
        let verifier = IdentityVerifier::new(test_config(false));
        let err = verifier.verify("tf_somekey").await.unwrap_err();
        assert!(matches!(err, AuthError::IdpUnavailable(_)));
    }

    #[tokio::test]
    async fn test_garbage_token_reports_combined_failure() {
        // Not a signed token, and the opaque fallback cannot reach the IdP
        let verifier = IdentityVerifier::new(test_config(false));
        let err = verifier.verify("not-a-token").await.unwrap_err();
        assert!(matches!(err, AuthError::IdpUnavailable(_)));
    }

    #[test]
    fn test_claims_tenant_precedence() {
        let claims = TokenClaims {
            sub: "u1".to_string(),
            email: None,
            name: None,
            tenant_id: None,
            organization_id: Some("org-claim".to_string()),
            organization_ids: Some(vec!["org-list".to_string()]),
            client_id: None,
            client_name: None,
        };
        let principal = claims.into_principal(CredentialKind::SignedToken);
        assert_eq!(principal.tenant_claim.as_deref(), Some("org-claim"));
        assert_eq!(principal.resolve_tenant(None, false), "org-claim");
    }

    #[test]
    fn test_discovery_documents() {
        let config = test_config(false);
        let auth_meta = authorization_server_metadata(&config);
        assert_eq!(auth_meta["code_challenge_methods_supported"][0], "S256");
        assert_eq!(auth_meta["token_endpoint_auth_methods_supported"][0], "none");
        assert!(auth_meta["grant_types_supported"]
            .as_array()
            .unwrap()
            .iter()
            .any(|g| g == "refresh_token"));

        let resource_meta = protected_resource_metadata(&config, "http://localhost:8001/mcp");
        assert_eq!(resource_meta["resource"], "http://localhost:8001/mcp");
        assert_eq!(resource_meta["bearer_methods_supported"][0], "header");
    }

    #[test]
    fn test_bearer_challenge_names_discovery_uris() {
        let challenge = bearer_challenge(&test_config(false));
        assert!(challenge.starts_with("Bearer realm=\"taskflow\""));
        assert!(challenge.contains("/api/auth/oauth2/authorize"));
        assert!(challenge.contains("/api/auth/device/code"));
    }
}
