//! `AuthPipeline` orchestrator: ties identity extraction, credential
//! validation, permission checks, and token issuance together into a
//! single [`RouteAuthResult`].

use http::HeaderMap;
use jsonwebtoken::{decode_header, Validation};
use serde_json::Value;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use crate::config::{JwsConfig, TrustedProxyConfig};
use crate::primitives::clock::Clock;
use crate::registry::model::RouteLookupResult;

use super::apikey::ApiKeyStore;
use super::identity::{extract_credential, has_conflicting_credentials, ExtractedCredential};
use super::jwks::JwksClient;
use super::jws::{self, DEFAULT_FORWARDED_CLAIMS};
use super::model::{IssuedToken, Principal, PrincipalType, RouteAuthResult};
use super::permissions;
use super::session::SessionStore;

pub struct AuthPipeline {
    pub jws: JwsConfig,
    pub trusted_proxy: TrustedProxyConfig,
    pub session_store: Arc<dyn SessionStore>,
    pub api_key_store: Arc<dyn ApiKeyStore>,
    pub jwks_client: Arc<dyn JwksClient>,
    pub clock: Arc<dyn Clock>,
    /// The external IdP's JWKS endpoint, used to verify caller-presented
    /// bearer tokens.
    pub idp_jwks_url: String,
}

impl AuthPipeline {
    pub async fn authorize(
        &self,
        route: &RouteLookupResult,
        headers: &HeaderMap,
        cookie_header: Option<&str>,
        peer_ip: IpAddr,
    ) -> RouteAuthResult {
        if !route.effective_auth_required() {
            return RouteAuthResult::NotRequired;
        }

        if has_conflicting_credentials(headers, cookie_header) {
            return RouteAuthResult::BadRequest(
                "both a bearer token and a session cookie were presented".to_string(),
            );
        }

        let credential = extract_credential(headers, cookie_header, peer_ip, &self.trusted_proxy);

        let (principal, auth_session_id) = match self.resolve_principal(credential).await {
            Ok(pair) => pair,
            Err(reason) => return RouteAuthResult::Unauthorized(reason),
        };

        if let RouteLookupResult::RouteMatch(route_match) = route {
            let operation_name = route_match.endpoint.operation_name.as_deref();
            if !permissions::check(&principal, route_match.service.permission_policy.as_ref(), operation_name) {
                return RouteAuthResult::Forbidden("insufficient permissions".to_string());
            }
        }

        let audience = match route {
            RouteLookupResult::RouteMatch(m) => m.endpoint.audience.clone(),
            _ => None,
        }
        .unwrap_or_else(|| self.jws.default_audience.clone());

        let forwarded = self.forwarded_claims(&principal);
        let now = self.clock.now_epoch_secs_u64() as i64;
        let (token, exp) = match jws::issue(&self.jws, now, &principal.id, &audience, None, forwarded) {
            Ok(pair) => pair,
            Err(e) => return RouteAuthResult::Unauthorized(format!("token issuance failed: {e}")),
        };

        RouteAuthResult::Authenticated {
            issued: IssuedToken {
                token,
                expires_at: exp,
                session_id: auth_session_id,
                claim_names: DEFAULT_FORWARDED_CLAIMS.iter().map(|s| s.to_string()).collect(),
            },
            principal,
        }
    }

    async fn resolve_principal(&self, credential: ExtractedCredential) -> Result<(Principal, Option<String>), String> {
        match credential {
            ExtractedCredential::SessionCookie(session_id) | ExtractedCredential::SessionHeader(session_id) => {
                self.validate_session(session_id).await
            }
            ExtractedCredential::Bearer(token) => self.validate_bearer(token).await.map(|p| (p, None)),
            ExtractedCredential::ApiKey(raw_key) => self.validate_api_key(raw_key).await.map(|p| (p, None)),
            ExtractedCredential::AnonymousIp(_) => Err("missing credentials".to_string()),
        }
    }

    async fn validate_session(&self, session_id: String) -> Result<(Principal, Option<String>), String> {
        let now = self.clock.now_epoch_seconds();
        let session = self
            .session_store
            .get(&session_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "session not found".to_string())?;

        if session.is_expired(now) || session.is_idle(now) {
            return Err("session expired or idle".to_string());
        }

        let _ = self.session_store.update_last_accessed(&session_id, now).await;

        let mut attributes = HashMap::new();
        for (k, v) in &session.claims {
            if let Value::String(s) = v {
                attributes.insert(k.clone(), s.clone());
            }
        }

        Ok((
            Principal {
                id: session.user_id.clone(),
                name: session.user_id,
                principal_type: PrincipalType::User,
                attributes,
                permissions: None,
            },
            Some(session_id),
        ))
    }

    async fn validate_bearer(&self, token: String) -> Result<Principal, String> {
        let header = decode_header(&token).map_err(|e| e.to_string())?;
        let kid = header.kid.ok_or_else(|| "bearer token missing kid".to_string())?;
        let key = self
            .jwks_client
            .decoding_key(&self.idp_jwks_url, &kid)
            .await
            .map_err(|e| e.to_string())?;

        let mut validation = Validation::new(header.alg);
        validation.validate_nbf = true;
        if !self.jws.require_audience {
            validation.validate_aud = false;
        }

        let data = jsonwebtoken::decode::<HashMap<String, Value>>(&token, &key, &validation)
            .map_err(|e| e.to_string())?;

        let sub = data
            .claims
            .get("sub")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "bearer token missing sub".to_string())?
            .to_string();

        let mut attributes = HashMap::new();
        for (k, v) in &data.claims {
            if let Value::String(s) = v {
                attributes.insert(k.clone(), s.clone());
            }
        }

        Ok(Principal {
            id: sub.clone(),
            name: sub,
            principal_type: PrincipalType::User,
            attributes,
            permissions: None,
        })
    }

    async fn validate_api_key(&self, raw_key: String) -> Result<Principal, String> {
        let record = self
            .api_key_store
            .verify(&raw_key)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "invalid or revoked api key".to_string())?;

        let _ = self.api_key_store.record_use(&record.id).await;

        let mut attributes = HashMap::new();
        attributes.insert("key_id".to_string(), record.id.clone());
        attributes.insert("key_name".to_string(), record.name.clone());

        Ok(Principal {
            id: record.id,
            name: record.name,
            principal_type: PrincipalType::Service,
            attributes,
            permissions: None,
        })
    }

    fn forwarded_claims(&self, principal: &Principal) -> HashMap<String, Value> {
        let mut out = HashMap::new();
        out.insert("sub".to_string(), Value::String(principal.id.clone()));
        for name in DEFAULT_FORWARDED_CLAIMS {
            if *name == "sub" {
                continue;
            }
            if let Some(value) = principal.attributes.get(*name) {
                out.insert((*name).to_string(), Value::String(value.clone()));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::apikey::InMemoryApiKeyStore;
    use crate::auth::jwks::{JwksDocument, JwksError};
    use crate::auth::session::{InMemorySessionStore, Session};
    use crate::primitives::clock::SystemClock;
    use crate::registry::model::{EndpointConfig, EndpointType, RouteMatch, ServiceRegistration, Visibility};
    use async_trait::async_trait;
    use std::time::Duration;

    struct NeverCalledJwks;
    #[async_trait]
    impl JwksClient for NeverCalledJwks {
        async fn fetch(&self, _issuer_url: &str) -> Result<Arc<JwksDocument>, JwksError> {
            Err(JwksError::Fetch("not configured in this test".into()))
        }
    }

    fn pipeline() -> AuthPipeline {
        AuthPipeline {
            jws: JwsConfig {
                active_kid: "k1".into(),
                signing_key: "test-signing-key-at-least-32-bytes-long".into(),
                issuer: "aussie-gateway".into(),
                default_audience: "svc-a".into(),
                max_token_ttl: Duration::from_secs(300),
                require_audience: false,
            },
            trusted_proxy: TrustedProxyConfig::default(),
            session_store: InMemorySessionStore::shared(),
            api_key_store: InMemoryApiKeyStore::shared(),
            jwks_client: Arc::new(NeverCalledJwks),
            clock: Arc::new(SystemClock),
            idp_jwks_url: "https://idp.example.com/jwks".into(),
        }
    }

    fn route_requiring_auth() -> RouteLookupResult {
        let service = ServiceRegistration {
            service_id: "svc-a".into(),
            display_name: None,
            base_url: "http://backend:9000".into(),
            route_prefix: None,
            default_visibility: Visibility::Private,
            default_auth_required: true,
            visibility_rules: vec![],
            endpoints: vec![],
            access_config: None,
            cors_config: None,
            permission_policy: None,
            rate_limit_config: None,
            sampling_config: None,
            version: 1,
        };
        let endpoint = EndpointConfig {
            path: "/x".into(),
            methods: vec!["GET".into()],
            visibility: None,
            auth_required: Some(true),
            path_rewrite: None,
            endpoint_type: EndpointType::Http,
            rate_limit_config: None,
            sampling_config: None,
            audience: None,
            operation_name: None,
        };
        RouteLookupResult::RouteMatch(RouteMatch {
            service,
            endpoint,
            target_path: "/x".into(),
            path_variables: HashMap::new(),
        })
    }

    #[tokio::test]
    async fn missing_credentials_on_protected_route_is_unauthorized() {
        let p = pipeline();
        let route = route_requiring_auth();
        let headers = HeaderMap::new();
        let result = p.authorize(&route, &headers, None, "1.2.3.4".parse().unwrap()).await;
        assert!(matches!(result, RouteAuthResult::Unauthorized(_)));
    }

    #[tokio::test]
    async fn valid_session_cookie_issues_authenticated_token() {
        let p = pipeline();
        p.session_store
            .put(Session {
                session_id: "abc".into(),
                user_id: "u1".into(),
                created_at_epoch: p.clock.now_epoch_seconds(),
                expires_at_epoch: p.clock.now_epoch_seconds() + 3600.0,
                idle_timeout_seconds: 900.0,
                last_accessed_at_epoch: p.clock.now_epoch_seconds(),
                claims: HashMap::new(),
            })
            .await
            .unwrap();

        let route = route_requiring_auth();
        let headers = HeaderMap::new();
        let result = p.authorize(&route, &headers, Some("aussie_session=abc"), "1.2.3.4".parse().unwrap()).await;
        match result {
            RouteAuthResult::Authenticated { issued, principal } => {
                assert_eq!(principal.id, "u1");
                assert!(!issued.token.is_empty());
            }
            other => panic!("expected Authenticated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unrequired_route_skips_auth_entirely() {
        let p = pipeline();
        let mut route = route_requiring_auth();
        if let RouteLookupResult::RouteMatch(m) = &mut route {
            m.service.default_auth_required = false;
            m.endpoint.auth_required = Some(false);
        }
        let headers = HeaderMap::new();
        let result = p.authorize(&route, &headers, None, "1.2.3.4".parse().unwrap()).await;
        assert!(matches!(result, RouteAuthResult::NotRequired));
    }

    #[tokio::test]
    async fn api_key_grants_service_principal() {
        let store = InMemoryApiKeyStore::new();
        store.insert_raw("key-1", "ci bot", "raw-secret");
        let mut p = pipeline();
        p.api_key_store = Arc::new(store);

        let route = route_requiring_auth();
        let mut headers = HeaderMap::new();
        headers.insert("X-API-Key-ID", "raw-secret".parse().unwrap());
        let result = p.authorize(&route, &headers, None, "1.2.3.4".parse().unwrap()).await;
        assert!(matches!(result, RouteAuthResult::Authenticated { .. }));
    }
}
