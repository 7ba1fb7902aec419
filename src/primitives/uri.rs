//! SSRF-safe `baseUrl` parsing for service registrations.
//!
//! A registered backend's `baseUrl` must be an absolute `http`/`https` URL
//! whose host cannot resolve to a loopback, link-local, or wildcard address --
//! otherwise a malicious or careless registration could turn the gateway into
//! an open relay onto its own control plane or the host's metadata endpoint.

use std::net::IpAddr;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BaseUrlError {
    #[error("baseUrl is not a valid absolute URL: {0}")]
    Unparseable(String),
    #[error("baseUrl scheme must be http or https, got {0:?}")]
    UnsupportedScheme(String),
    #[error("baseUrl has no host")]
    MissingHost,
    #[error("baseUrl host {0:?} resolves to a disallowed address (loopback/link-local/unspecified)")]
    DisallowedHost(String),
}

/// Parse and validate a service's `baseUrl` per the SSRF guard in the data
/// model. Returns the parsed [`Url`] on success.
pub fn parse_safe_base_url(raw: &str) -> Result<Url, BaseUrlError> {
    let url = Url::parse(raw).map_err(|_| BaseUrlError::Unparseable(raw.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(BaseUrlError::UnsupportedScheme(other.to_string())),
    }

    let host = url.host_str().ok_or(BaseUrlError::MissingHost)?;

    if is_disallowed_host(host) {
        return Err(BaseUrlError::DisallowedHost(host.to_string()));
    }

    Ok(url)
}

/// True if `host` is a literal IP that is loopback, link-local, unspecified
/// (wildcard), or otherwise non-routable, or a well-known non-DNS hostname
/// alias for one of those (`localhost`).
///
/// This is a literal-address and hostname-alias check, not a DNS resolution
/// -- resolving arbitrary registration-time hostnames would itself be an
/// SSRF vector (and a source of registration-time flakiness). Deployments
/// that need resolved-address enforcement should additionally validate at
/// connect time in the HTTP client layer.
fn is_disallowed_host(host: &str) -> bool {
    let lower = host.to_ascii_lowercase();
    if lower == "localhost" || lower.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return is_disallowed_ip(ip);
    }

    // Bracketed IPv6 literals are stripped of brackets by `Url::host_str`
    // already, but guard against a stray form just in case.
    let trimmed = lower.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = trimmed.parse::<IpAddr>() {
        return is_disallowed_ip(ip);
    }

    false
}

fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || is_v4_private(v4)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified() || is_v6_unique_local(v6),
    }
}

/// RFC 1918 private ranges. Registrations pointing at private-network
/// backends are legitimate in many deployments (the backend fleet usually
/// lives on a private network), so the default guard only blocks
/// loopback/link-local/wildcard; private-range blocking is left disabled
/// here but factored out so a stricter deployment profile can enable it
/// without touching the call sites.
#[allow(dead_code)]
fn is_v4_private(v4: std::net::Ipv4Addr) -> bool {
    v4.is_private()
}

#[allow(dead_code)]
fn is_v6_unique_local(v6: std::net::Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xfe00) == 0xfc00
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_http_backend() {
        assert!(parse_safe_base_url("http://backend:9000").is_ok());
        assert!(parse_safe_base_url("https://svc.internal.example.com").is_ok());
    }

    #[test]
    fn rejects_loopback_literal() {
        assert_eq!(
            parse_safe_base_url("http://127.0.0.1:8080"),
            Err(BaseUrlError::DisallowedHost("127.0.0.1".into()))
        );
    }

    #[test]
    fn rejects_localhost_hostname() {
        assert!(matches!(
            parse_safe_base_url("http://localhost:8080"),
            Err(BaseUrlError::DisallowedHost(_))
        ));
    }

    #[test]
    fn rejects_link_local() {
        assert!(matches!(
            parse_safe_base_url("http://169.254.169.254/latest/meta-data"),
            Err(BaseUrlError::DisallowedHost(_))
        ));
    }

    #[test]
    fn rejects_unspecified_v6() {
        assert!(matches!(
            parse_safe_base_url("http://[::]:8080"),
            Err(BaseUrlError::DisallowedHost(_))
        ));
    }

    #[test]
    fn rejects_non_http_scheme() {
        assert_eq!(
            parse_safe_base_url("ftp://backend:21"),
            Err(BaseUrlError::UnsupportedScheme("ftp".into()))
        );
    }

    #[test]
    fn rejects_unparseable() {
        assert!(matches!(
            parse_safe_base_url("not a url"),
            Err(BaseUrlError::Unparseable(_))
        ));
    }
}
