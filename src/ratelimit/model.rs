//! Rate-limit data model: compound keys, decisions, and the effective-limit
//! record the resolver produces.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The scope half of a [`RateLimitKey`] -- which bucket family a request
/// belongs to.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Scope {
    Http { service_id: String },
    WsConnection { service_id: String },
    WsMessage { service_id: String, session_id: String },
    Auth { ip_or_user: String },
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Http { service_id } => write!(f, "http:{service_id}"),
            Scope::WsConnection { service_id } => write!(f, "ws-conn:{service_id}"),
            Scope::WsMessage { service_id, session_id } => {
                write!(f, "ws-msg:{service_id}:{session_id}")
            }
            Scope::Auth { ip_or_user } => write!(f, "auth:{ip_or_user}"),
        }
    }
}

/// `{clientIdentity, scope}`. Hashable so it can key the in-memory bucket
/// map directly.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct RateLimitKey {
    pub client_identity: String,
    pub scope: Scope,
}

impl RateLimitKey {
    pub fn new(client_identity: impl Into<String>, scope: Scope) -> Self {
        Self {
            client_identity: client_identity.into(),
            scope,
        }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.client_identity)
    }
}

/// Result of a rate-limit check-and-consume call.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at_epoch_seconds: u64,
    pub retry_after_seconds: u64,
    pub request_count: u64,
    pub window_seconds: u64,
}

/// `{requestsPerWindow, windowSeconds, burstCapacity}`, always capped at
/// the platform maximum by the resolver.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveRateLimit {
    pub requests_per_window: u32,
    pub window_seconds: u64,
    pub burst_capacity: u32,
}

impl EffectiveRateLimit {
    pub fn capped_at(mut self, platform_max: u32) -> Self {
        if self.requests_per_window > platform_max {
            self.requests_per_window = platform_max;
        }
        if self.burst_capacity > platform_max {
            self.burst_capacity = platform_max;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_display_uses_expected_prefixes() {
        assert_eq!(Scope::Http { service_id: "svc-a".into() }.to_string(), "http:svc-a");
        assert_eq!(
            Scope::WsConnection { service_id: "svc-a".into() }.to_string(),
            "ws-conn:svc-a"
        );
        assert_eq!(
            Scope::WsMessage { service_id: "svc-a".into(), session_id: "s1".into() }.to_string(),
            "ws-msg:svc-a:s1"
        );
        assert_eq!(Scope::Auth { ip_or_user: "1.2.3.4".into() }.to_string(), "auth:1.2.3.4");
    }

    #[test]
    fn effective_limit_is_capped_at_platform_max() {
        let limit = EffectiveRateLimit {
            requests_per_window: 50_000,
            window_seconds: 60,
            burst_capacity: 50_000,
        }
        .capped_at(10_000);
        assert_eq!(limit.requests_per_window, 10_000);
        assert_eq!(limit.burst_capacity, 10_000);
    }
}
