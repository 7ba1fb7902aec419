//! Main ingress dispatch: path parse -> service lookup -> route match ->
//! visibility/access check -> auth -> rate limit -> (HTTP forward | WS
//! upgrade and relay).
//!
//! Follows the same catch-all-handler shape as a reverse-proxy fallback
//! route (manual `Request` decomposition, `ConnectInfo` extraction,
//! `X-Forwarded-For` composition), generalized from a single fixed
//! downstream to per-route dispatch across the service registry.
//!
//! `admin` and `q` are claimed by literal routes mounted ahead of this
//! catch-all for plain HTTP, but a WebSocket upgrade to an unmounted
//! sub-path under those prefixes still reaches [`handle_ws`], so it repeats
//! the reserved-segment check itself before spending a rate-limit token.
//! `gateway` is excluded from that check: it has no literal route and
//! doubles as the connection-scope rate-limit key used when a WebSocket
//! upgrade targets no specific tenant service; `match_route` still resolves
//! it to `NoMatch` afterward, since no backend is ever registered under
//! that name.

use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::auth::identity::{extract_credential, ExtractedCredential};
use crate::auth::model::RouteAuthResult;
use crate::problem::{ProblemDetails, ProblemType};
use crate::proxy::{ProxyError, ProxyRequest};
use crate::ratelimit::model::{RateLimitDecision, RateLimitKey, Scope};
use crate::primitives::validation::is_reserved_segment;
use crate::registry::matcher::{normalize_remainder, split_service_and_remainder};
use crate::registry::model::{AccessConfig, NoMatchReason, RouteLookupResult, ServiceRegistration, Visibility};
use crate::state::AppState;
use crate::telemetry::{RequestMetric, SecurityEvent, SecurityEventKind};
use crate::wsgateway::{derive_backend_ws_url, is_websocket_upgrade, relay, RelayConfig};

/// Entry point registered as the catch-all `/{serviceId}/{*rest}` route.
pub async fn ingress(State(state): State<AppState>, req: Request) -> Response {
    let start = Instant::now();
    let (mut parts, body) = req.into_parts();
    let peer_ip = peer_ip_of(&parts);

    if is_websocket_upgrade(&parts.headers) {
        return handle_ws(&state, &mut parts, peer_ip).await;
    }

    let body_limit = state.config.limits.max_body_size as usize;
    let body = match axum::body::to_bytes(body, body_limit).await {
        Ok(bytes) => bytes,
        Err(_) => return ProblemDetails::new(ProblemType::PayloadTooLarge, "request body exceeds the configured size limit").into_response(),
    };

    handle_http(&state, parts, body, peer_ip, start).await
}

fn peer_ip_of(parts: &Parts) -> IpAddr {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|c| c.0.ip())
        .unwrap_or_else(|| IpAddr::from([0, 0, 0, 0]))
}

async fn handle_http(state: &AppState, parts: Parts, body: Bytes, peer_ip: IpAddr, start: Instant) -> Response {
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().map(str::to_string);
    let method = parts.method.clone();

    let route = state.registry.match_route(&path, method.as_str()).await;

    if matches!(route, RouteLookupResult::NoMatch(NoMatchReason::ServiceNotFound)) {
        return ProblemDetails::new(ProblemType::ServiceNotFound, format!("no service registered for {path}"))
            .with_instance(path)
            .into_response();
    }

    if let Some(denied) = check_access(&route, &parts.headers, peer_ip) {
        return denied;
    }

    let cookie_header = parts.headers.get(http::header::COOKIE).and_then(|v| v.to_str().ok());
    let auth_result = state.auth.authorize(&route, &parts.headers, cookie_header, peer_ip).await;

    let (bearer_token, api_key_id, api_key_name) = match &auth_result {
        RouteAuthResult::Authenticated { issued, principal } => (
            Some(issued.token.clone()),
            principal.attributes.get("key_id").cloned(),
            principal.attributes.get("key_name").cloned(),
        ),
        RouteAuthResult::NotRequired => (None, None, None),
        RouteAuthResult::Unauthorized(reason) => {
            state.security_events.record(SecurityEvent {
                kind: SecurityEventKind::AuthenticationFailed,
                client_identity: peer_ip.to_string(),
                service_id: route.service().map(|s| s.service_id.clone()),
                detail: reason.clone(),
            });
            return ProblemDetails::new(ProblemType::Unauthorized, reason.clone()).into_response();
        }
        RouteAuthResult::Forbidden(reason) => {
            state.security_events.record(SecurityEvent {
                kind: SecurityEventKind::AuthorizationDenied,
                client_identity: peer_ip.to_string(),
                service_id: route.service().map(|s| s.service_id.clone()),
                detail: reason.clone(),
            });
            return ProblemDetails::new(ProblemType::Forbidden, reason.clone()).into_response();
        }
        RouteAuthResult::BadRequest(reason) => {
            return ProblemDetails::new(ProblemType::ValidationError, reason.clone()).into_response();
        }
    };

    let service = match route.service() {
        Some(s) => s.clone(),
        None => return ProblemDetails::new(ProblemType::ServiceNotFound, "no service registered").into_response(),
    };

    let client_identity = client_identity_for(&auth_result, peer_ip);
    let key = RateLimitKey::new(client_identity, Scope::Http { service_id: service.service_id.clone() });
    let effective = state.rate_limit_resolver.resolve_limit(&route);
    let now = state.clock.now_epoch_secs_u64();
    let decision = state.provider_loader.check_and_consume(&key, effective, now).await;

    if !decision.allowed {
        state.security_events.record(SecurityEvent {
            kind: SecurityEventKind::RateLimitExceeded,
            client_identity: key.client_identity.clone(),
            service_id: Some(service.service_id.clone()),
            detail: "http rate limit exceeded".to_string(),
        });
        return rate_limited_response(&decision);
    }

    let target_path = target_path_for(&route, &path);

    let proxy_req = ProxyRequest {
        method,
        base_url: &service.base_url,
        target_path: &target_path,
        query: query.as_deref(),
        inbound_headers: parts.headers.clone(),
        body,
        client_ip: peer_ip,
        scheme: parts.uri.scheme_str().unwrap_or("http"),
        peer_is_trusted_proxy: state.config.trusted_proxy.is_trusted(peer_ip),
        bearer_token,
        api_key_id,
        api_key_name,
    };

    let outcome = state.proxy.forward(proxy_req).await;
    let status = outcome.as_ref().map(|r| r.status.as_u16()).unwrap_or(502);
    state.metrics.record_request(RequestMetric {
        service_id: service.service_id.clone(),
        status,
        duration_ms: start.elapsed().as_millis() as u64,
        rate_limited: false,
    });

    match outcome {
        Ok(resp) => {
            let mut response = (resp.status, resp.headers, resp.body).into_response();
            apply_rate_limit_headers(response.headers_mut(), &decision);
            response
        }
        Err(e) => map_proxy_error(e).into_response(),
    }
}

async fn handle_ws(state: &AppState, parts: &mut Parts, peer_ip: IpAddr) -> Response {
    let path = parts.uri.path().to_string();
    let (raw_segment, _) = split_service_and_remainder(&path);
    let raw_segment = raw_segment.to_string();

    // `admin`/`q` are claimed by literal routes for plain HTTP, but a WS
    // upgrade to an unmounted sub-path under those prefixes still falls
    // through to this handler, so the reserved check has to be repeated
    // here before any rate limit token is spent. `gateway` is excluded: it
    // has no literal route and doubles as the connection-scope rate-limit
    // key for upgrades that target no specific tenant service.
    if is_reserved_segment(&raw_segment) && raw_segment != "gateway" {
        return ProblemDetails::new(ProblemType::ServiceNotFound, format!("no service registered for {path}")).into_response();
    }

    let cookie_header = parts.headers.get(http::header::COOKIE).and_then(|v| v.to_str().ok());
    let credential = extract_credential(&parts.headers, cookie_header, peer_ip, &state.config.trusted_proxy);
    let client_identity = identity_string(&credential);

    let conn_key = RateLimitKey::new(client_identity.clone(), Scope::WsConnection { service_id: raw_segment.clone() });
    let conn_limit = state.rate_limit_resolver.ws_connection_limit();
    let now = state.clock.now_epoch_secs_u64();
    let decision = state.provider_loader.check_and_consume(&conn_key, conn_limit, now).await;

    if !decision.allowed {
        state.security_events.record(SecurityEvent {
            kind: SecurityEventKind::WsAdmissionDenied,
            client_identity,
            service_id: Some(raw_segment),
            detail: "websocket connection rate limit exceeded".to_string(),
        });
        return rate_limited_response(&decision);
    }

    let route = state.registry.match_route(&path, "GET").await;
    if matches!(route, RouteLookupResult::NoMatch(_)) {
        return ProblemDetails::new(ProblemType::ServiceNotFound, format!("no service registered for {path}")).into_response();
    }

    if let Some(denied) = check_access(&route, &parts.headers, peer_ip) {
        return denied;
    }

    let auth_result = state.auth.authorize(&route, &parts.headers, cookie_header, peer_ip).await;
    let issued = match auth_result {
        RouteAuthResult::Authenticated { issued, .. } => Some(issued),
        RouteAuthResult::NotRequired => None,
        RouteAuthResult::Unauthorized(reason) => return ProblemDetails::new(ProblemType::Unauthorized, reason).into_response(),
        RouteAuthResult::Forbidden(reason) => return ProblemDetails::new(ProblemType::Forbidden, reason).into_response(),
        RouteAuthResult::BadRequest(reason) => return ProblemDetails::new(ProblemType::ValidationError, reason).into_response(),
    };

    let service = match route.service() {
        Some(s) => s.clone(),
        None => return ProblemDetails::new(ProblemType::ServiceNotFound, "no service registered").into_response(),
    };

    let target_path = target_path_for(&route, &path);

    let backend_url = match derive_backend_ws_url(&service.base_url, &target_path, parts.uri.query()) {
        Ok(url) => url,
        Err(e) => return ProblemDetails::new(ProblemType::BadGateway, e.to_string()).into_response(),
    };

    let session_id = issued.and_then(|i| i.session_id);
    let message_limit = state.rate_limit_resolver.ws_message_limit();
    let message_key = RateLimitKey::new(
        client_identity,
        Scope::WsMessage { service_id: service.service_id.clone(), session_id: session_id.clone().unwrap_or_default() },
    );
    let invalidations = if session_id.is_some() { Some(state.auth.session_store.watch_invalidations()) } else { None };

    let upgrade = match WebSocketUpgrade::from_request_parts(parts, state).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let provider_loader = state.provider_loader.clone();
    let clock = state.clock.clone();

    upgrade.on_upgrade(move |socket| async move {
        relay(
            socket,
            RelayConfig { backend_url, message_key, message_limit, session_id },
            provider_loader,
            clock,
            invalidations,
        )
        .await;
    })
}

fn target_path_for(route: &RouteLookupResult, full_path: &str) -> String {
    match route {
        RouteLookupResult::RouteMatch(m) => m.target_path.clone(),
        RouteLookupResult::ServiceOnlyMatch { .. } => {
            let (_, remainder) = split_service_and_remainder(full_path);
            normalize_remainder(remainder)
        }
        RouteLookupResult::NoMatch(_) => String::new(),
    }
}

fn identity_string(credential: &ExtractedCredential) -> String {
    match credential {
        ExtractedCredential::SessionCookie(id) | ExtractedCredential::SessionHeader(id) => id.clone(),
        ExtractedCredential::Bearer(token) => token.clone(),
        ExtractedCredential::ApiKey(key) => key.clone(),
        ExtractedCredential::AnonymousIp(ip) => ip.to_string(),
    }
}

fn client_identity_for(auth_result: &RouteAuthResult, peer_ip: IpAddr) -> String {
    match auth_result {
        RouteAuthResult::Authenticated { principal, .. } => principal.id.clone(),
        _ => peer_ip.to_string(),
    }
}

/// Enforces `accessConfig` on `PRIVATE` routes: an empty list in a field
/// means that dimension is unrestricted.
fn check_access(route: &RouteLookupResult, headers: &HeaderMap, peer_ip: IpAddr) -> Option<Response> {
    if route.effective_visibility() != Visibility::Private {
        return None;
    }
    let service: &ServiceRegistration = route.service()?;
    let access: &AccessConfig = service.access_config.as_ref()?;

    if !access.allowed_ips.is_empty() {
        let ip_str = peer_ip.to_string();
        if !access.allowed_ips.iter().any(|ip| ip == &ip_str) {
            return Some(ProblemDetails::new(ProblemType::Forbidden, "client IP is not in the service's allowed list").into_response());
        }
    }

    if !access.allowed_domains.is_empty() || !access.allowed_subdomains.is_empty() {
        let host = headers
            .get(http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .split(':')
            .next()
            .unwrap_or("");
        let domain_ok = access.allowed_domains.iter().any(|d| d == host);
        let subdomain_ok = access.allowed_subdomains.iter().any(|d| host.ends_with(&format!(".{d}")));
        if !domain_ok && !subdomain_ok {
            return Some(ProblemDetails::new(ProblemType::Forbidden, "request host is not in the service's allowed list").into_response());
        }
    }

    None
}

fn rate_limited_response(decision: &RateLimitDecision) -> Response {
    let mut response = ProblemDetails::new(ProblemType::TooManyRequests, "rate limit exceeded")
        .with_rate_limit_decision(decision)
        .into_response();
    apply_rate_limit_headers(response.headers_mut(), decision);
    response
}

/// Attaches the `X-RateLimit-*`/`Retry-After` headers alongside the JSON
/// body's equivalent fields.
fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert("x-ratelimit-limit", header_number(decision.limit as u64));
    headers.insert("x-ratelimit-remaining", header_number(decision.remaining as u64));
    headers.insert("x-ratelimit-reset", header_number(decision.reset_at_epoch_seconds));
    if !decision.allowed {
        headers.insert(axum::http::header::RETRY_AFTER, header_number(decision.retry_after_seconds));
    }
}

fn header_number(n: u64) -> HeaderValue {
    HeaderValue::from_str(&n.to_string()).expect("decimal digits are a valid header value")
}

fn map_proxy_error(e: ProxyError) -> ProblemDetails {
    match e {
        ProxyError::PayloadTooLarge => ProblemDetails::new(ProblemType::PayloadTooLarge, e.to_string()),
        ProxyError::HeaderTooLarge => ProblemDetails::new(ProblemType::HeaderTooLarge, e.to_string()),
        ProxyError::GatewayTimeout => ProblemDetails::new(ProblemType::GatewayTimeout, e.to_string()),
        ProxyError::BadGateway(_) => ProblemDetails::new(ProblemType::BadGateway, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_path_for_service_only_match_normalizes_remainder() {
        let service = ServiceRegistration {
            service_id: "svc-a".into(),
            display_name: None,
            base_url: "http://backend:9000".into(),
            route_prefix: None,
            default_visibility: Visibility::Public,
            default_auth_required: false,
            visibility_rules: vec![],
            endpoints: vec![],
            access_config: None,
            cors_config: None,
            permission_policy: None,
            rate_limit_config: None,
            sampling_config: None,
            version: 1,
        };
        let route = RouteLookupResult::ServiceOnlyMatch { service };
        assert_eq!(target_path_for(&route, "/svc-a/things"), "/things");
    }

    #[test]
    fn check_access_allows_when_no_access_config() {
        let service = ServiceRegistration {
            service_id: "svc-a".into(),
            display_name: None,
            base_url: "http://backend:9000".into(),
            route_prefix: None,
            default_visibility: Visibility::Private,
            default_auth_required: false,
            visibility_rules: vec![],
            endpoints: vec![],
            access_config: None,
            cors_config: None,
            permission_policy: None,
            rate_limit_config: None,
            sampling_config: None,
            version: 1,
        };
        let route = RouteLookupResult::ServiceOnlyMatch { service };
        let headers = HeaderMap::new();
        assert!(check_access(&route, &headers, "1.2.3.4".parse().unwrap()).is_none());
    }

    #[test]
    fn check_access_denies_ip_outside_allowlist() {
        let service = ServiceRegistration {
            service_id: "svc-a".into(),
            display_name: None,
            base_url: "http://backend:9000".into(),
            route_prefix: None,
            default_visibility: Visibility::Private,
            default_auth_required: false,
            visibility_rules: vec![],
            endpoints: vec![],
            access_config: Some(AccessConfig {
                allowed_ips: vec!["9.9.9.9".into()],
                allowed_domains: vec![],
                allowed_subdomains: vec![],
            }),
            cors_config: None,
            permission_policy: None,
            rate_limit_config: None,
            sampling_config: None,
            version: 1,
        };
        let route = RouteLookupResult::ServiceOnlyMatch { service };
        let headers = HeaderMap::new();
        assert!(check_access(&route, &headers, "1.2.3.4".parse().unwrap()).is_some());
    }
}
