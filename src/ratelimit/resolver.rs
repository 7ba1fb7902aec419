//! `RateLimitResolver`: merges endpoint -> service -> platform rate-limit
//! configuration into an [`EffectiveRateLimit`], caches the per-service
//! override behind the jittered local cache, and exposes separate
//! resolvers for the WS connection/message scopes.

use std::sync::Arc;
use std::time::Duration;

use crate::config::RateLimitPlatformConfig;
use crate::primitives::cache::LocalCache;
use crate::registry::model::{RateLimitOverride, RouteLookupResult};

use super::model::EffectiveRateLimit;

pub struct RateLimitResolver {
    platform: RateLimitPlatformConfig,
    /// `serviceId -> Option<RateLimitOverride>`, `None` cached for services
    /// with no override so repeated lookups don't keep missing.
    service_override_cache: LocalCache<String, Arc<Option<RateLimitOverride>>>,
}

impl RateLimitResolver {
    pub fn new(platform: RateLimitPlatformConfig, cache_ttl: Duration, cache_jitter: f64, cache_max_entries: usize) -> Self {
        Self {
            platform,
            service_override_cache: LocalCache::new(cache_ttl, cache_jitter, cache_max_entries),
        }
    }

    fn platform_default(&self) -> EffectiveRateLimit {
        EffectiveRateLimit {
            requests_per_window: self.platform.default_requests_per_window,
            window_seconds: self.platform.default_window.as_secs(),
            burst_capacity: self.platform.default_requests_per_window,
        }
    }

    fn merge(base: EffectiveRateLimit, over: &RateLimitOverride) -> EffectiveRateLimit {
        EffectiveRateLimit {
            requests_per_window: over.requests_per_window.unwrap_or(base.requests_per_window),
            window_seconds: over.window_seconds.unwrap_or(base.window_seconds),
            burst_capacity: over
                .burst_capacity
                .unwrap_or(over.requests_per_window.unwrap_or(base.burst_capacity)),
        }
    }

    /// Merge endpoint -> service -> platform, endpoint overrides fields
    /// individually. The service-level override is read through a jittered
    /// local cache, since it rarely changes and the registry would
    /// otherwise be consulted on every request.
    pub fn resolve_limit(&self, route: &RouteLookupResult) -> EffectiveRateLimit {
        let mut effective = self.platform_default();

        if let Some(service) = route.service() {
            let service_override = match self.service_override_cache.get(&service.service_id) {
                Some(cached) => (*cached).clone(),
                None => {
                    let resolved = service.rate_limit_config.clone();
                    self.service_override_cache
                        .put(service.service_id.clone(), Arc::new(resolved.clone()));
                    resolved
                }
            };
            if let Some(service_override) = service_override.as_ref() {
                effective = Self::merge(effective, service_override);
            }
        }

        if let RouteLookupResult::RouteMatch(route_match) = route {
            if let Some(endpoint_override) = route_match.endpoint.rate_limit_config.as_ref() {
                effective = Self::merge(effective, endpoint_override);
            }
        }

        effective.capped_at(self.platform.platform_max_requests_per_window)
    }

    pub fn ws_connection_limit(&self) -> EffectiveRateLimit {
        let d = &self.platform.websocket_connection;
        EffectiveRateLimit {
            requests_per_window: d.requests_per_window,
            window_seconds: d.window.as_secs(),
            burst_capacity: d.requests_per_window,
        }
        .capped_at(self.platform.platform_max_requests_per_window)
    }

    pub fn ws_message_limit(&self) -> EffectiveRateLimit {
        let d = &self.platform.websocket_message;
        EffectiveRateLimit {
            requests_per_window: d.requests_per_window,
            window_seconds: d.window.as_secs(),
            burst_capacity: d.requests_per_window,
        }
        .capped_at(self.platform.platform_max_requests_per_window)
    }

    /// Explicit invalidation on local registration changes.
    pub fn invalidate_service(&self, service_id: &str) {
        self.service_override_cache.invalidate(&service_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::model::{EndpointConfig, EndpointType, RouteMatch, ServiceRegistration, Visibility};
    use std::collections::HashMap;

    fn platform() -> RateLimitPlatformConfig {
        RateLimitPlatformConfig {
            default_requests_per_window: 100,
            default_window: Duration::from_secs(60),
            platform_max_requests_per_window: 1000,
            degrade_after_failures: 3,
            degrade_cooldown: Duration::from_secs(30),
            websocket_connection: crate::config::WsLimitDefaults {
                requests_per_window: 5,
                window: Duration::from_secs(60),
            },
            websocket_message: crate::config::WsLimitDefaults {
                requests_per_window: 60,
                window: Duration::from_secs(60),
            },
        }
    }

    fn service(rate_limit_config: Option<RateLimitOverride>) -> ServiceRegistration {
        ServiceRegistration {
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
            rate_limit_config,
            sampling_config: None,
            version: 1,
        }
    }

    #[test]
    fn falls_back_to_platform_default_with_no_overrides() {
        let resolver = RateLimitResolver::new(platform(), Duration::from_secs(30), 0.0, 1000);
        let route = RouteLookupResult::ServiceOnlyMatch { service: service(None) };
        let effective = resolver.resolve_limit(&route);
        assert_eq!(effective.requests_per_window, 100);
        assert_eq!(effective.window_seconds, 60);
    }

    #[test]
    fn service_override_takes_precedence_over_platform() {
        let resolver = RateLimitResolver::new(platform(), Duration::from_secs(30), 0.0, 1000);
        let over = RateLimitOverride {
            requests_per_window: Some(2),
            window_seconds: Some(60),
            burst_capacity: Some(2),
        };
        let route = RouteLookupResult::ServiceOnlyMatch { service: service(Some(over)) };
        let effective = resolver.resolve_limit(&route);
        assert_eq!(effective.requests_per_window, 2);
        assert_eq!(effective.burst_capacity, 2);
    }

    #[test]
    fn endpoint_override_wins_over_service_and_platform() {
        let resolver = RateLimitResolver::new(platform(), Duration::from_secs(30), 0.0, 1000);
        let svc = service(Some(RateLimitOverride {
            requests_per_window: Some(50),
            window_seconds: None,
            burst_capacity: None,
        }));
        let endpoint = EndpointConfig {
            path: "/x".into(),
            methods: vec!["GET".into()],
            visibility: None,
            auth_required: None,
            path_rewrite: None,
            endpoint_type: EndpointType::Http,
            rate_limit_config: Some(RateLimitOverride {
                requests_per_window: Some(5),
                window_seconds: None,
                burst_capacity: None,
            }),
            sampling_config: None,
            audience: None,
            operation_name: None,
        };
        let route = RouteLookupResult::RouteMatch(RouteMatch {
            service: svc,
            endpoint,
            target_path: "/x".into(),
            path_variables: HashMap::new(),
        });
        let effective = resolver.resolve_limit(&route);
        assert_eq!(effective.requests_per_window, 5);
    }

    #[test]
    fn result_is_capped_at_platform_max() {
        let mut p = platform();
        p.platform_max_requests_per_window = 10;
        let resolver = RateLimitResolver::new(p, Duration::from_secs(30), 0.0, 1000);
        let over = RateLimitOverride {
            requests_per_window: Some(10_000),
            window_seconds: Some(60),
            burst_capacity: Some(10_000),
        };
        let route = RouteLookupResult::ServiceOnlyMatch { service: service(Some(over)) };
        let effective = resolver.resolve_limit(&route);
        assert_eq!(effective.requests_per_window, 10);
        assert_eq!(effective.burst_capacity, 10);
    }
}
