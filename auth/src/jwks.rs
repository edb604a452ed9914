//! Process-wide verification-key cache.
//!
//! Keys are fetched from the IdP's `/api/auth/jwks` and reused for one hour.
//! A refresh failure falls back to the stale snapshot when one exists; only
//! the initial fetch with an empty cache surfaces as unavailable. At most one
//! refresh is in flight at a time; concurrent readers see the stale snapshot
//! while it runs.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::AuthError;

pub const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);

/// A single verification key as served by the IdP.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Jwk {
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub kty: Option<String>,
    #[serde(default)]
    pub alg: Option<String>,
    /// RSA modulus, base64url
    #[serde(default)]
    pub n: Option<String>,
    /// RSA exponent, base64url
    #[serde(default)]
    pub e: Option<String>,
}

/// The IdP's key set document.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Jwks {
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Select a key by key id.
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    keys: Jwks,
    fetched_at: Instant,
}

/// Cached JWKS with TTL-based refresh and stale fallback.
#[derive(Debug)]
pub struct JwksCache {
    url: String,
    ttl: Duration,
    http: reqwest::Client,
    snapshot: RwLock<Option<Snapshot>>,
    refresh: Mutex<()>,
}

impl JwksCache {
    pub fn new(jwks_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            url: jwks_url.into(),
            ttl: JWKS_CACHE_TTL,
            http,
            snapshot: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Pre-fetch keys at startup so the first request does not pay the fetch.
    pub async fn warm_up(&self) {
        match self.keys().await {
            Ok(keys) => info!(key_count = keys.keys.len(), "JWKS cache warmed up"),
            Err(e) => warn!(error = %e, "JWKS warmup failed, will retry on first request"),
        }
    }

    /// Current key set, refreshing after TTL expiry.
    pub async fn keys(&self) -> Result<Jwks, AuthError> {
        if let Some(snapshot) = self.snapshot.read().await.as_ref() {
            if snapshot.fetched_at.elapsed() < self.ttl {
                debug!(
                    age_secs = snapshot.fetched_at.elapsed().as_secs(),
                    "Using cached JWKS"
                );
                return Ok(snapshot.keys.clone());
            }
        }

        // Stale or empty: refresh, but never with two fetches in flight.
        let _guard = match self.refresh.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                // Another refresh is running; serve stale keys if we have any
                if let Some(snapshot) = self.snapshot.read().await.as_ref() {
                    return Ok(snapshot.keys.clone());
                }
                self.refresh.lock().await
            }
        };

        // Re-check after acquiring the guard; the previous holder may have
        // refreshed already.
        if let Some(snapshot) = self.snapshot.read().await.as_ref() {
            if snapshot.fetched_at.elapsed() < self.ttl {
                return Ok(snapshot.keys.clone());
            }
        }

        info!(url = %self.url, "Fetching JWKS");
        match self.fetch().await {
            Ok(keys) => {
                info!(key_count = keys.keys.len(), "JWKS fetched");
                let mut slot = self.snapshot.write().await;
                *slot = Some(Snapshot {
                    keys: keys.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(keys)
            }
            Err(e) => {
                // Fail open on refresh: stale keys beat no keys
                if let Some(snapshot) = self.snapshot.read().await.as_ref() {
                    warn!(error = %e, "JWKS refresh failed, using expired cache");
                    return Ok(snapshot.keys.clone());
                }
                warn!(error = %e, "JWKS fetch failed with no cached keys");
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<Jwks, AuthError> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AuthError::IdpUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::IdpUnavailable(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<Jwks>()
            .await
            .map_err(|e| AuthError::IdpUnavailable(format!("Invalid JWKS document: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_key_by_kid() {
        let jwks = Jwks {
            keys: vec![
                Jwk {
                    kid: Some("key-1".to_string()),
                    kty: Some("RSA".to_string()),
                    alg: Some("RS256".to_string()),
                    n: Some("abc".to_string()),
                    e: Some("AQAB".to_string()),
                },
                Jwk {
                    kid: Some("key-2".to_string()),
                    kty: Some("RSA".to_string()),
                    alg: None,
                    n: Some("def".to_string()),
                    e: Some("AQAB".to_string()),
                },
            ],
        };

        assert_eq!(jwks.find("key-2").unwrap().n.as_deref(), Some("def"));
        assert!(jwks.find("key-3").is_none());
    }

    #[test]
    fn test_jwks_parses_unknown_fields() {
        let doc = r#"{"keys":[{"kid":"a","kty":"RSA","use":"sig","n":"mod","e":"AQAB"}]}"#;
        let jwks: Jwks = serde_json::from_str(doc).unwrap();
        assert_eq!(jwks.keys.len(), 1);
        assert_eq!(jwks.keys[0].kid.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_unreachable_idp_with_empty_cache_is_unavailable() {
        let cache = JwksCache::new(
            "http://127.0.0.1:1/api/auth/jwks",
            reqwest::Client::new(),
        );
        let err = cache.keys().await.unwrap_err();
        assert!(matches!(err, AuthError::IdpUnavailable(_)));
    }
}
