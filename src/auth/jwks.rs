//! `JwksClient` port: fetches and caches the external IdP's public keys
//! with TTL, ETag revalidation, and single-flight refresh (conditional GET
//! via `If-None-Match`, stale-while-error fallback, refresh serialized per
//! key so concurrent callers don't stampede the IdP).

use async_trait::async_trait;
use dashmap::DashMap;
use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
    pub n: Option<String>,
    pub e: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

impl JwksDocument {
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }
}

impl Jwk {
    pub fn to_decoding_key(&self) -> Result<DecodingKey, JwksError> {
        match self.kty.as_str() {
            "RSA" => {
                let n = self.n.as_deref().ok_or(JwksError::MalformedKey("missing n"))?;
                let e = self.e.as_deref().ok_or(JwksError::MalformedKey("missing e"))?;
                DecodingKey::from_rsa_components(n, e).map_err(JwksError::Decode)
            }
            other => Err(JwksError::UnsupportedKeyType(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum JwksError {
    #[error("jwks fetch failed: {0}")]
    Fetch(String),
    #[error("jwks response was malformed: {0}")]
    MalformedKey(&'static str),
    #[error("unsupported key type {0:?}")]
    UnsupportedKeyType(String),
    #[error("kid {0:?} not found in jwks")]
    KidNotFound(String),
    #[error("key decoding failed: {0}")]
    Decode(#[source] jsonwebtoken::errors::Error),
}

#[async_trait]
pub trait JwksClient: Send + Sync {
    async fn fetch(&self, issuer_url: &str) -> Result<Arc<JwksDocument>, JwksError>;

    async fn decoding_key(&self, issuer_url: &str, kid: &str) -> Result<DecodingKey, JwksError> {
        let doc = self.fetch(issuer_url).await?;
        doc.find(kid)
            .ok_or_else(|| JwksError::KidNotFound(kid.to_string()))?
            .to_decoding_key()
    }
}

struct CachedEntry {
    document: Arc<JwksDocument>,
    etag: Option<String>,
    fetched_at: Instant,
}

/// `reqwest`-backed client. Refresh for a given issuer is serialized
/// through a per-issuer `tokio::Mutex`, giving single-flight behavior
/// without a separate inflight-tracking map.
pub struct ReqwestJwksClient {
    http: reqwest::Client,
    ttl: Duration,
    stale_grace: Duration,
    entries: DashMap<String, Arc<Mutex<Option<CachedEntry>>>>,
}

impl ReqwestJwksClient {
    pub fn new(http: reqwest::Client, ttl: Duration, stale_grace: Duration) -> Self {
        Self {
            http,
            ttl,
            stale_grace,
            entries: DashMap::new(),
        }
    }

    fn slot(&self, issuer_url: &str) -> Arc<Mutex<Option<CachedEntry>>> {
        self.entries
            .entry(issuer_url.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    async fn refresh(&self, issuer_url: &str, previous_etag: Option<&str>) -> Result<(Arc<JwksDocument>, Option<String>), JwksError> {
        let mut request = self.http.get(issuer_url);
        if let Some(etag) = previous_etag {
            request = request.header(http::header::IF_NONE_MATCH, etag);
        }
        let response = request.send().await.map_err(|e| JwksError::Fetch(e.to_string()))?;

        if response.status() == http::StatusCode::NOT_MODIFIED {
            return Err(JwksError::Fetch("304 with no prior cached document".to_string()));
        }
        if !response.status().is_success() {
            return Err(JwksError::Fetch(format!("status {}", response.status())));
        }

        let etag = response
            .headers()
            .get(http::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let document: JwksDocument = response.json().await.map_err(|e| JwksError::Fetch(e.to_string()))?;
        Ok((Arc::new(document), etag))
    }
}

#[async_trait]
impl JwksClient for ReqwestJwksClient {
    async fn fetch(&self, issuer_url: &str) -> Result<Arc<JwksDocument>, JwksError> {
        let slot = self.slot(issuer_url);
        let mut guard = slot.lock().await;

        if let Some(entry) = guard.as_ref() {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.document.clone());
            }
        }

        let previous_etag = guard.as_ref().and_then(|e| e.etag.clone());
        match self.refresh(issuer_url, previous_etag.as_deref()).await {
            Ok((document, etag)) => {
                *guard = Some(CachedEntry {
                    document: document.clone(),
                    etag,
                    fetched_at: Instant::now(),
                });
                Ok(document)
            }
            Err(e) => {
                // Stale-while-error: serve the last good document within
                // the grace window rather than failing every bearer-token
                // validation because the IdP hiccuped.
                if let Some(entry) = guard.as_ref() {
                    if entry.fetched_at.elapsed() < self.ttl + self.stale_grace {
                        warn!(issuer_url, error = %e, "jwks refresh failed, serving stale keys");
                        return Ok(entry.document.clone());
                    }
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsa_jwk(kid: &str) -> Jwk {
        Jwk {
            kty: "RSA".into(),
            kid: Some(kid.into()),
            alg: Some("RS256".into()),
            n: Some("sXch".into()),
            e: Some("AQAB".into()),
        }
    }

    #[test]
    fn document_finds_key_by_kid() {
        let doc = JwksDocument { keys: vec![rsa_jwk("k1"), rsa_jwk("k2")] };
        assert!(doc.find("k2").is_some());
        assert!(doc.find("missing").is_none());
    }

    #[test]
    fn unsupported_key_type_is_rejected() {
        let jwk = Jwk {
            kty: "oct".into(),
            kid: Some("k1".into()),
            alg: None,
            n: None,
            e: None,
        };
        assert!(matches!(jwk.to_decoding_key(), Err(JwksError::UnsupportedKeyType(_))));
    }
}
