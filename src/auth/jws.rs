//! Short-lived aussie-issued JWS, forwarded to backends as a gateway-signed
//! credential.
//!
//! Issued with a symmetric key under HS256: the aussie token is a
//! gateway-to-backend credential, not a public-facing one, so there is no
//! need for the asymmetric key rotation the external IdP's own JWKS
//! provides for caller-presented bearer tokens (see [`super::jwks`]). This
//! tradeoff is recorded in `DESIGN.md`.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::config::JwsConfig;

/// Claims forwarded from the caller's source identity by default.
pub const DEFAULT_FORWARDED_CLAIMS: &[&str] = &["sub", "email", "name", "groups", "roles", "effective_permissions"];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AussieClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
    #[serde(flatten)]
    pub forwarded: HashMap<String, Value>,
}

#[derive(Debug, Error)]
pub enum JwsError {
    #[error("requested ttl must be >= 1 second")]
    InvalidTtl,
    #[error("token encoding failed: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),
    #[error("token decoding/validation failed: {0}")]
    Decode(#[source] jsonwebtoken::errors::Error),
}

/// Issue a fresh token with `exp = now + min(requested_ttl, maxTokenTtl)`.
/// `requested_ttl` of `None` uses the configured max.
pub fn issue(
    config: &JwsConfig,
    now_epoch: i64,
    subject: &str,
    audience: &str,
    requested_ttl_seconds: Option<i64>,
    forwarded: HashMap<String, Value>,
) -> Result<(String, i64), JwsError> {
    let max_ttl = config.max_token_ttl.as_secs() as i64;
    let ttl = requested_ttl_seconds.map(|t| t.min(max_ttl)).unwrap_or(max_ttl).max(1);

    let exp = now_epoch + ttl;
    let claims = AussieClaims {
        iss: config.issuer.clone(),
        sub: subject.to_string(),
        aud: audience.to_string(),
        exp,
        iat: now_epoch,
        nbf: now_epoch,
        forwarded,
    };

    let mut header = Header::new(jsonwebtoken::Algorithm::HS256);
    header.kid = Some(config.active_kid.clone());

    let token = encode(&header, &claims, &EncodingKey::from_secret(config.signing_key.as_bytes()))
        .map_err(JwsError::Encode)?;

    Ok((token, exp))
}

/// Verify a bearer token issued by this gateway (used for tokens that loop
/// back through, e.g. WebSocket session re-validation). For caller-supplied
/// external bearer tokens use [`super::jwks`] instead.
pub fn verify_own(config: &JwsConfig, token: &str) -> Result<AussieClaims, JwsError> {
    let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.set_issuer(&[config.issuer.clone()]);
    validation.set_audience(&[config.default_audience.clone()]);
    validation.validate_nbf = true;

    let data = decode::<AussieClaims>(
        token,
        &DecodingKey::from_secret(config.signing_key.as_bytes()),
        &validation,
    )
    .map_err(JwsError::Decode)?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    fn config() -> JwsConfig {
        JwsConfig {
            active_kid: "kid-1".into(),
            signing_key: "test-signing-key-at-least-32-bytes-long".into(),
            issuer: "aussie-gateway".into(),
            default_audience: "svc-a".into(),
            max_token_ttl: Duration::from_secs(300),
            require_audience: false,
        }
    }

    /// `jsonwebtoken` validates `exp`/`nbf` against the real wall clock, so
    /// tests anchor to actual current time rather than an arbitrary epoch.
    fn real_now() -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
    }

    #[test]
    fn issued_token_round_trips() {
        let cfg = config();
        let now = real_now();
        let (token, exp) = issue(&cfg, now, "u1", "svc-a", None, HashMap::new()).unwrap();
        assert_eq!(exp, now + 300);
        let claims = verify_own(&cfg, &token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.aud, "svc-a");
    }

    #[test]
    fn ttl_is_clamped_to_max_token_ttl() {
        let cfg = config();
        let now = real_now();
        let (_, exp) = issue(&cfg, now, "u1", "svc-a", Some(10_000), HashMap::new()).unwrap();
        assert_eq!(exp, now + 300);
    }

    #[test]
    fn ttl_floor_is_one_second() {
        let cfg = config();
        let now = real_now();
        let (_, exp) = issue(&cfg, now, "u1", "svc-a", Some(0), HashMap::new()).unwrap();
        assert_eq!(exp, now + 1);
    }

    #[test]
    fn tampered_token_fails_verification() {
        let cfg = config();
        let now = real_now();
        let (token, _) = issue(&cfg, now, "u1", "svc-a", None, HashMap::new()).unwrap();
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(verify_own(&cfg, &tampered).is_err());
    }
}
