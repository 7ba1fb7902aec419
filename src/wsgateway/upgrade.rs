//! WebSocket upgrade detection and pre-upgrade admission: header sniffing,
//! connection-scope rate limiting, and the `ws://`/`wss://` backend URL
//! derived from a matched route's `baseUrl`.

use http::HeaderMap;
use thiserror::Error;
use url::Url;

use crate::primitives::uri::{parse_safe_base_url, BaseUrlError};
use crate::ratelimit::model::RateLimitDecision;

/// `Upgrade: websocket` plus a `Connection` header containing the `upgrade`
/// token (case-insensitive, comma-separated per RFC 7230 §6.7).
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let upgrade_ok = headers
        .get(http::header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));

    let connection_ok = headers
        .get(http::header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|tok| tok.trim().eq_ignore_ascii_case("upgrade")));

    upgrade_ok && connection_ok
}

#[derive(Debug, Error)]
pub enum WsAdmissionError {
    #[error("service not found")]
    ServiceNotFound,
    #[error("websocket connections are not permitted on this route")]
    Forbidden,
    #[error("connection rate limit exceeded")]
    TooManyRequests(RateLimitDecision),
    #[error("backend base URL is invalid: {0}")]
    InvalidBackend(#[from] BaseUrlError),
}

/// Compose the backend dial target: the route's `baseUrl` with its scheme
/// swapped for `ws`/`wss`, `targetPath` appended, and the inbound query
/// string preserved verbatim.
pub fn derive_backend_ws_url(base_url: &str, target_path: &str, query: Option<&str>) -> Result<String, WsAdmissionError> {
    let mut url = parse_safe_base_url(base_url)?;
    let ws_scheme = match url.scheme() {
        "https" => "wss",
        _ => "ws",
    };
    url.set_scheme(ws_scheme).expect("ws/wss are valid schemes");

    let mut path = url.path().trim_end_matches('/').to_string();
    path.push_str(target_path);
    url.set_path(&path);
    url.set_query(query.filter(|q| !q.is_empty()));

    Ok(url.to_string())
}

/// Back-compat accessor used by tests and callers that only need the parsed
/// `Url`.
pub fn parse_backend_ws_url(raw: &str) -> Result<Url, url::ParseError> {
    Url::parse(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(upgrade: &str, connection: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(http::header::UPGRADE, HeaderValue::from_str(upgrade).unwrap());
        h.insert(http::header::CONNECTION, HeaderValue::from_str(connection).unwrap());
        h
    }

    #[test]
    fn detects_standard_upgrade_headers() {
        assert!(is_websocket_upgrade(&headers("websocket", "Upgrade")));
        assert!(is_websocket_upgrade(&headers("WebSocket", "keep-alive, Upgrade")));
    }

    #[test]
    fn rejects_non_websocket_upgrade() {
        assert!(!is_websocket_upgrade(&headers("h2c", "Upgrade")));
    }

    #[test]
    fn rejects_missing_connection_token() {
        assert!(!is_websocket_upgrade(&headers("websocket", "keep-alive")));
    }

    #[test]
    fn derives_wss_from_https_base_url() {
        let url = derive_backend_ws_url("https://backend.example.com", "/chat", Some("room=1")).unwrap();
        assert_eq!(url, "wss://backend.example.com/chat?room=1");
    }

    #[test]
    fn derives_ws_from_http_base_url_with_no_query() {
        let url = derive_backend_ws_url("http://backend.example.com:9000", "/chat", None).unwrap();
        assert_eq!(url, "ws://backend.example.com:9000/chat");
    }
}
