//! Authenticated caller identity, independent of transport.

use serde::{Deserialize, Serialize};

/// Which credential shape produced the principal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// Three-segment signed token verified locally against JWKS
    SignedToken,
    /// Opaque token verified via the IdP userinfo endpoint
    OpaqueToken,
    /// Long-lived `tf_`-prefixed API key
    ApiKey,
    /// Development-mode bypass
    Dev,
}

/// Canonical identity extracted from a validated credential.
///
/// Transient: lives for the duration of a request and is threaded through
/// handlers explicitly, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Principal {
    /// External identity id (`sub` claim or API-key owner)
    pub external_id: String,
    /// Empty when the credential shape does not expose it (API keys)
    pub email: String,
    pub name: String,
    /// Tenant claim when present (`tenant_id` / `organization_id`)
    pub tenant_claim: Option<String>,
    /// Organization list claim, first entry used as a tenant fallback
    pub organization_ids: Vec<String>,
    /// OAuth client that initiated the call, for the audit trail
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub credential: CredentialKind,
}

/// Fallback tenant used when no claim or header provides one.
pub const DEFAULT_TENANT: &str = "taskflow-default-org-id";

impl Principal {
    /// Resolve the tenant for this request.
    ///
    /// Precedence: tenant/organization claim, then first organization id,
    /// then (dev mode only) the `X-Tenant-ID` header value, then the fixed
    /// fallback tenant.
    pub fn resolve_tenant(&self, dev_header: Option<&str>, dev_mode: bool) -> String {
        if let Some(claim) = &self.tenant_claim {
            let claim = claim.trim();
            if !claim.is_empty() {
                return claim.to_string();
            }
        }
        if let Some(first) = self.organization_ids.first() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
        if dev_mode {
            if let Some(header) = dev_header {
                let header = header.trim();
                if !header.is_empty() {
                    return header.to_string();
                }
            }
        }
        DEFAULT_TENANT.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal() -> Principal {
        Principal {
            external_id: "user-1".to_string(),
            email: "user@example.com".to_string(),
            name: "User".to_string(),
            tenant_claim: None,
            organization_ids: vec![],
            client_id: None,
            client_name: None,
            credential: CredentialKind::SignedToken,
        }
    }

    #[test]
    fn test_tenant_from_claim_wins() {
        let mut p = principal();
        p.tenant_claim = Some("acme".to_string());
        p.organization_ids = vec!["other".to_string()];
        assert_eq!(p.resolve_tenant(Some("header"), true), "acme");
    }

    #[test]
    fn test_tenant_from_organization_list() {
        let mut p = principal();
        p.organization_ids = vec!["org-a".to_string(), "org-b".to_string()];
        assert_eq!(p.resolve_tenant(None, false), "org-a");
    }

    #[test]
    fn test_header_only_in_dev_mode() {
        let p = principal();
        assert_eq!(p.resolve_tenant(Some("t2"), true), "t2");
        assert_eq!(p.resolve_tenant(Some("t2"), false), DEFAULT_TENANT);
    }

    #[test]
    fn test_fallback_tenant() {
        assert_eq!(principal().resolve_tenant(None, true), DEFAULT_TENANT);
    }
}
