//! Identity extraction: session cookie -> `X-Session-ID` -> bearer token ->
//! `X-API-Key-ID`, stopping at the first hit; falls back to remote IP,
//! honoring `X-Forwarded-For` only from a trusted proxy.

use http::HeaderMap;
use std::net::IpAddr;

use crate::config::TrustedProxyConfig;

pub const SESSION_COOKIE_NAME: &str = "aussie_session";

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExtractedCredential {
    SessionCookie(String),
    SessionHeader(String),
    Bearer(String),
    ApiKey(String),
    AnonymousIp(IpAddr),
}

/// Both a bearer token and a session cookie present simultaneously is a
/// `BadRequest` -- checked by the caller before falling through to
/// extraction order.
pub fn has_conflicting_credentials(headers: &HeaderMap, cookie_header: Option<&str>) -> bool {
    let has_session_cookie = cookie_header
        .map(|c| parse_cookie(c, SESSION_COOKIE_NAME).is_some())
        .unwrap_or(false);
    let has_bearer = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("Bearer "))
        .unwrap_or(false);
    has_session_cookie && has_bearer
}

pub fn extract_credential(
    headers: &HeaderMap,
    cookie_header: Option<&str>,
    peer_ip: IpAddr,
    trusted_proxy: &TrustedProxyConfig,
) -> ExtractedCredential {
    if let Some(cookie_header) = cookie_header {
        if let Some(session_id) = parse_cookie(cookie_header, SESSION_COOKIE_NAME) {
            return ExtractedCredential::SessionCookie(session_id);
        }
    }

    if let Some(session_id) = headers.get("X-Session-ID").and_then(|v| v.to_str().ok()) {
        return ExtractedCredential::SessionHeader(session_id.to_string());
    }

    if let Some(auth) = headers.get(http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            return ExtractedCredential::Bearer(token.to_string());
        }
    }

    if let Some(key_id) = headers.get("X-API-Key-ID").and_then(|v| v.to_str().ok()) {
        return ExtractedCredential::ApiKey(key_id.to_string());
    }

    ExtractedCredential::AnonymousIp(resolve_client_ip(headers, peer_ip, trusted_proxy))
}

/// `X-Forwarded-For` is honored only when the immediate peer is a trusted
/// proxy; otherwise the directly observed peer IP is used.
pub fn resolve_client_ip(headers: &HeaderMap, peer_ip: IpAddr, trusted_proxy: &TrustedProxyConfig) -> IpAddr {
    if !trusted_proxy.is_trusted(peer_ip) {
        return peer_ip;
    }
    headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
        .unwrap_or(peer_ip)
}

fn parse_cookie(cookie_header: &str, name: &str) -> Option<String> {
    cookie_header.split(';').find_map(|part| {
        let part = part.trim();
        let (key, value) = part.split_once('=')?;
        if key == name {
            Some(value.to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers_with(name: &str, value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(
            http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
        h
    }

    #[test]
    fn session_cookie_wins_first() {
        let headers = headers_with("X-Session-ID", "ignored");
        let cred = extract_credential(
            &headers,
            Some("aussie_session=abc; other=1"),
            "1.2.3.4".parse().unwrap(),
            &TrustedProxyConfig::default(),
        );
        assert_eq!(cred, ExtractedCredential::SessionCookie("abc".into()));
    }

    #[test]
    fn session_header_used_when_no_cookie() {
        let headers = headers_with("X-Session-ID", "sess-1");
        let cred = extract_credential(&headers, None, "1.2.3.4".parse().unwrap(), &TrustedProxyConfig::default());
        assert_eq!(cred, ExtractedCredential::SessionHeader("sess-1".into()));
    }

    #[test]
    fn bearer_used_when_no_cookie_or_header() {
        let headers = headers_with("Authorization", "Bearer abc.def.ghi");
        let cred = extract_credential(&headers, None, "1.2.3.4".parse().unwrap(), &TrustedProxyConfig::default());
        assert_eq!(cred, ExtractedCredential::Bearer("abc.def.ghi".into()));
    }

    #[test]
    fn api_key_used_as_last_resort() {
        let headers = headers_with("X-API-Key-ID", "key-123");
        let cred = extract_credential(&headers, None, "1.2.3.4".parse().unwrap(), &TrustedProxyConfig::default());
        assert_eq!(cred, ExtractedCredential::ApiKey("key-123".into()));
    }

    #[test]
    fn falls_back_to_peer_ip_with_no_credentials() {
        let headers = HeaderMap::new();
        let cred = extract_credential(&headers, None, "9.9.9.9".parse().unwrap(), &TrustedProxyConfig::default());
        assert_eq!(cred, ExtractedCredential::AnonymousIp("9.9.9.9".parse().unwrap()));
    }

    #[test]
    fn xff_ignored_from_untrusted_peer() {
        let headers = headers_with("X-Forwarded-For", "10.0.0.1");
        let ip = resolve_client_ip(&headers, "1.2.3.4".parse().unwrap(), &TrustedProxyConfig::default());
        assert_eq!(ip, "1.2.3.4".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn xff_honored_from_trusted_peer() {
        let trusted = TrustedProxyConfig {
            trusted_proxies: vec!["1.2.3.4".parse().unwrap()],
        };
        let headers = headers_with("X-Forwarded-For", "10.0.0.1, 1.2.3.4");
        let ip = resolve_client_ip(&headers, "1.2.3.4".parse().unwrap(), &trusted);
        assert_eq!(ip, "10.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn conflicting_bearer_and_cookie_detected() {
        let headers = headers_with("Authorization", "Bearer abc");
        assert!(has_conflicting_credentials(&headers, Some("aussie_session=abc")));
    }
}
