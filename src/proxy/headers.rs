//! Hop-by-hop header hygiene and forwarded-header composition.

use http::{HeaderMap, HeaderName, HeaderValue};
use std::net::IpAddr;

/// The eight hop-by-hop header names that must never cross a proxy hop.
pub fn hop_by_hop_headers() -> [HeaderName; 8] {
    [
        HeaderName::from_static("connection"),
        HeaderName::from_static("keep-alive"),
        HeaderName::from_static("proxy-authenticate"),
        HeaderName::from_static("proxy-authorization"),
        HeaderName::from_static("te"),
        HeaderName::from_static("trailer"),
        HeaderName::from_static("transfer-encoding"),
        HeaderName::from_static("upgrade"),
    ]
}

/// Strip hop-by-hop headers plus `host`/`content-length` (re-set by the
/// client leg) and, when `strip_authorization` is set, the inbound
/// `authorization` header (replaced by the aussie-issued token).
pub fn strip_outbound_headers(headers: &mut HeaderMap, strip_authorization: bool) {
    for name in hop_by_hop_headers() {
        headers.remove(&name);
    }
    headers.remove(http::header::HOST);
    headers.remove(http::header::CONTENT_LENGTH);
    if strip_authorization {
        headers.remove(http::header::AUTHORIZATION);
    }
}

/// Strip only the hop-by-hop set from a response before it is returned to
/// the client.
pub fn strip_response_headers(headers: &mut HeaderMap) {
    for name in hop_by_hop_headers() {
        headers.remove(&name);
    }
}

pub struct ForwardedHeaderInputs<'a> {
    pub client_ip: IpAddr,
    pub scheme: &'a str,
    pub host: &'a str,
    pub peer_is_trusted_proxy: bool,
}

/// Compose `Forwarded`, `X-Forwarded-For`, `X-Forwarded-Proto`, and
/// `X-Forwarded-Host`. Existing values are preserved (appended to) only
/// when the immediate peer is a trusted proxy; otherwise they are
/// overwritten.
pub fn apply_forwarded_headers(headers: &mut HeaderMap, existing: &HeaderMap, inputs: ForwardedHeaderInputs<'_>) {
    let forwarded_value = format!(
        "for={};proto={};host={}",
        inputs.client_ip, inputs.scheme, inputs.host
    );
    headers.insert(
        HeaderName::from_static("forwarded"),
        HeaderValue::from_str(&forwarded_value).expect("forwarded header value is always valid ascii"),
    );

    let xff_value = if inputs.peer_is_trusted_proxy {
        match existing.get("X-Forwarded-For").and_then(|v| v.to_str().ok()) {
            Some(prior) => format!("{prior}, {}", inputs.client_ip),
            None => inputs.client_ip.to_string(),
        }
    } else {
        inputs.client_ip.to_string()
    };
    headers.insert(
        HeaderName::from_static("x-forwarded-for"),
        HeaderValue::from_str(&xff_value).expect("ip list is always valid ascii"),
    );

    headers.insert(
        HeaderName::from_static("x-forwarded-proto"),
        HeaderValue::from_str(inputs.scheme).unwrap_or_else(|_| HeaderValue::from_static("http")),
    );
    headers.insert(
        HeaderName::from_static("x-forwarded-host"),
        HeaderValue::from_str(inputs.host).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
}

/// Aggregate header-size validation across the whole header map.
pub fn total_header_size(headers: &HeaderMap) -> usize {
    headers
        .iter()
        .map(|(name, value)| name.as_str().len() + value.len() + 4)
        .sum()
}
