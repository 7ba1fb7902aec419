//! `ServiceRegistry` orchestrator: validates and persists registrations
//! through a [`ServiceStore`], compiles endpoint path templates, and
//! resolves `(path, method)` to a [`RouteLookupResult`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::matcher::{apply_rewrite, normalize_remainder, split_service_and_remainder, CompiledTemplate};
use super::model::{NoMatchReason, RegistrationResult, RouteLookupResult, RouteMatch, ServiceRegistration, Visibility};
use super::store::{ServiceStore, StoreError};
use crate::primitives::cache::LocalCache;
use crate::primitives::uri::parse_safe_base_url;
use crate::primitives::validation::{is_reserved_segment, is_url_safe_identifier};

struct CompiledService {
    registration: ServiceRegistration,
    endpoint_templates: Vec<CompiledTemplate>,
}

pub struct ServiceRegistry {
    store: Arc<dyn ServiceStore>,
    compiled: dashmap::DashMap<String, Arc<CompiledService>>,
    cache: LocalCache<String, Arc<CompiledService>>,
    public_default_visibility_enabled: bool,
}

impl ServiceRegistry {
    pub fn new(
        store: Arc<dyn ServiceStore>,
        cache_ttl: Duration,
        cache_jitter: f64,
        cache_max_entries: usize,
        public_default_visibility_enabled: bool,
    ) -> Self {
        Self {
            store,
            compiled: dashmap::DashMap::new(),
            cache: LocalCache::new(cache_ttl, cache_jitter, cache_max_entries),
            public_default_visibility_enabled,
        }
    }

    pub async fn register(&self, reg: ServiceRegistration) -> RegistrationResult {
        let mut reg = reg;
        if let Err(failure) = self.validate(&reg) {
            return failure;
        }
        reg.version = 1;
        match self.store.put(reg, None).await {
            Ok(stored) => {
                self.on_change(&stored);
                RegistrationResult::Success(stored)
            }
            Err(e) => self.store_error_to_failure(e),
        }
    }

    /// CAS update: `reg.version` must match the currently stored version.
    /// On success the stored version increments.
    pub async fn update(&self, mut reg: ServiceRegistration) -> RegistrationResult {
        if let Err(failure) = self.validate(&reg) {
            return failure;
        }
        let expected_version = reg.version;
        reg.version = expected_version + 1;
        match self.store.put(reg, Some(expected_version)).await {
            Ok(stored) => {
                self.on_change(&stored);
                RegistrationResult::Success(stored)
            }
            Err(e) => self.store_error_to_failure(e),
        }
    }

    pub async fn unregister(&self, service_id: &str) -> bool {
        let removed = self.store.delete(service_id).await.unwrap_or(false);
        if removed {
            self.compiled.remove(service_id);
            self.cache.invalidate(&service_id.to_string());
        }
        removed
    }

    pub async fn get(&self, service_id: &str) -> Option<ServiceRegistration> {
        self.resolve_compiled(service_id).await.map(|c| c.registration.clone())
    }

    pub async fn list_all(&self) -> Vec<ServiceRegistration> {
        self.store.list().await.unwrap_or_default()
    }

    /// Resolve `(path, method)` to a route. Reserved first segments bypass
    /// the registry entirely and are the caller's responsibility to
    /// dispatch.
    pub async fn match_route(&self, path: &str, method: &str) -> RouteLookupResult {
        let (service_id, remainder) = split_service_and_remainder(path);
        if is_reserved_segment(service_id) {
            return RouteLookupResult::NoMatch(NoMatchReason::ServiceNotFound);
        }

        let compiled = match self.resolve_compiled(service_id).await {
            Some(c) => c,
            None => return RouteLookupResult::NoMatch(NoMatchReason::ServiceNotFound),
        };

        let remainder = normalize_remainder(remainder);
        for (endpoint, template) in compiled.registration.endpoints.iter().zip(compiled.endpoint_templates.iter()) {
            let methods = endpoint.effective_methods();
            let method_ok = methods.iter().any(|m| m == "*" || m.eq_ignore_ascii_case(method));
            if !method_ok {
                continue;
            }
            if let Some(vars) = template.match_path(&remainder) {
                let target_path = match &endpoint.path_rewrite {
                    Some(rewrite) => apply_rewrite(rewrite, &vars),
                    None => remainder.clone(),
                };
                return RouteLookupResult::RouteMatch(RouteMatch {
                    service: compiled.registration.clone(),
                    endpoint: endpoint.clone(),
                    target_path,
                    path_variables: vars,
                });
            }
        }

        RouteLookupResult::ServiceOnlyMatch {
            service: compiled.registration.clone(),
        }
    }

    async fn resolve_compiled(&self, service_id: &str) -> Option<Arc<CompiledService>> {
        if let Some(hit) = self.cache.get(&service_id.to_string()) {
            return Some(hit);
        }
        if let Some(hit) = self.compiled.get(service_id) {
            self.cache.put(service_id.to_string(), hit.clone());
            return Some(hit.clone());
        }
        let reg = self.store.get(service_id).await.ok().flatten()?;
        let compiled = Arc::new(self.compile(reg).ok()?);
        self.compiled.insert(service_id.to_string(), compiled.clone());
        self.cache.put(service_id.to_string(), compiled.clone());
        Some(compiled)
    }

    fn on_change(&self, reg: &ServiceRegistration) {
        self.compiled.remove(&reg.service_id);
        self.cache.invalidate(&reg.service_id);
    }

    /// Field-level validation shared by `register` and `update` (URL safety,
    /// visibility policy, endpoint uniqueness, path syntax).
    fn validate(&self, reg: &ServiceRegistration) -> Result<(), RegistrationResult> {
        if !is_url_safe_identifier(&reg.service_id) {
            return Err(RegistrationResult::Failure {
                reason: "serviceId must be a non-blank URL-safe identifier".into(),
                suggested_status: 400,
            });
        }

        if let Err(e) = parse_safe_base_url(&reg.base_url) {
            return Err(RegistrationResult::Failure {
                reason: e.to_string(),
                suggested_status: 400,
            });
        }

        if reg.default_visibility == Visibility::Public && !self.public_default_visibility_enabled {
            return Err(RegistrationResult::Failure {
                reason: "defaultVisibility=PUBLIC requires publicDefaultVisibilityEnabled".into(),
                suggested_status: 403,
            });
        }

        let mut seen: HashSet<(String, String)> = HashSet::new();
        for endpoint in &reg.endpoints {
            if CompiledTemplate::compile(&endpoint.path).is_err() {
                return Err(RegistrationResult::Failure {
                    reason: format!("invalid path template {:?}", endpoint.path),
                    suggested_status: 400,
                });
            }
            for method in endpoint.effective_methods() {
                let key = (endpoint.path.clone(), method.to_ascii_uppercase());
                if !seen.insert(key) {
                    return Err(RegistrationResult::Failure {
                        reason: format!(
                            "duplicate {{path, method}} pair: {} {}",
                            method, endpoint.path
                        ),
                        suggested_status: 400,
                    });
                }
            }
        }

        Ok(())
    }

    fn compile(&self, registration: ServiceRegistration) -> Result<CompiledService, ()> {
        let mut templates = Vec::with_capacity(registration.endpoints.len());
        for endpoint in &registration.endpoints {
            templates.push(CompiledTemplate::compile(&endpoint.path).map_err(|_| ())?);
        }
        Ok(CompiledService {
            registration,
            endpoint_templates: templates,
        })
    }

    fn store_error_to_failure(&self, e: StoreError) -> RegistrationResult {
        match e {
            StoreError::VersionConflict { .. } => RegistrationResult::Failure {
                reason: "version conflict".into(),
                suggested_status: 409,
            },
            StoreError::Unavailable(msg) => RegistrationResult::Failure {
                reason: msg,
                suggested_status: 503,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::model::EndpointConfig;
    use crate::registry::store::InMemoryServiceStore;

    fn registry(public_enabled: bool) -> ServiceRegistry {
        ServiceRegistry::new(
            InMemoryServiceStore::shared(),
            Duration::from_secs(30),
            0.0,
            1000,
            public_enabled,
        )
    }

    fn minimal_reg(service_id: &str) -> ServiceRegistration {
        ServiceRegistration {
            service_id: service_id.to_string(),
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
            version: 0,
        }
    }

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let reg = registry(false);
        let result = reg.register(minimal_reg("svc-a")).await;
        assert!(matches!(result, RegistrationResult::Success(_)));
        assert!(reg.get("svc-a").await.is_some());
    }

    #[tokio::test]
    async fn public_visibility_requires_platform_flag() {
        let reg = registry(false);
        let mut r = minimal_reg("svc-a");
        r.default_visibility = Visibility::Public;
        let result = reg.register(r).await;
        assert!(matches!(
            result,
            RegistrationResult::Failure { suggested_status: 403, .. }
        ));
    }

    #[tokio::test]
    async fn public_visibility_allowed_when_flag_enabled() {
        let reg = registry(true);
        let mut r = minimal_reg("svc-a");
        r.default_visibility = Visibility::Public;
        let result = reg.register(r).await;
        assert!(matches!(result, RegistrationResult::Success(_)));
    }

    #[tokio::test]
    async fn ssrf_guard_rejects_loopback_base_url() {
        let reg = registry(false);
        let mut r = minimal_reg("svc-a");
        r.base_url = "http://127.0.0.1:9000".into();
        let result = reg.register(r).await;
        assert!(matches!(
            result,
            RegistrationResult::Failure { suggested_status: 400, .. }
        ));
    }

    #[tokio::test]
    async fn happy_path_http_match() {
        let reg = registry(false);
        let mut r = minimal_reg("svc-a");
        r.endpoints.push(EndpointConfig {
            path: "/users/{id}".into(),
            methods: vec!["GET".into()],
            visibility: None,
            auth_required: Some(false),
            path_rewrite: None,
            endpoint_type: crate::registry::model::EndpointType::Http,
            rate_limit_config: None,
            sampling_config: None,
            audience: None,
            operation_name: None,
        });
        reg.register(r).await;

        let result = reg.match_route("/svc-a/users/42", "GET").await;
        match result {
            RouteLookupResult::RouteMatch(m) => {
                assert_eq!(m.target_path, "/users/42");
                assert_eq!(m.path_variables.get("id"), Some(&"42".to_string()));
            }
            other => panic!("expected RouteMatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn path_rewrite_scenario() {
        let reg = registry(false);
        let mut r = minimal_reg("svc-a");
        r.endpoints.push(EndpointConfig {
            path: "/api/{resource}".into(),
            methods: vec!["GET".into()],
            visibility: None,
            auth_required: Some(false),
            path_rewrite: Some("/v2/{resource}".into()),
            endpoint_type: crate::registry::model::EndpointType::Http,
            rate_limit_config: None,
            sampling_config: None,
            audience: None,
            operation_name: None,
        });
        reg.register(r).await;

        let result = reg.match_route("/svc-a/api/items", "GET").await;
        match result {
            RouteLookupResult::RouteMatch(m) => {
                assert_eq!(m.target_path, "/v2/items");
                assert_eq!(m.path_variables.get("resource"), Some(&"items".to_string()));
            }
            other => panic!("expected RouteMatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unmatched_endpoint_falls_back_to_service_only() {
        let reg = registry(false);
        reg.register(minimal_reg("svc-a")).await;
        let result = reg.match_route("/svc-a/anything", "GET").await;
        assert!(matches!(result, RouteLookupResult::ServiceOnlyMatch { .. }));
    }

    #[tokio::test]
    async fn unknown_service_is_no_match() {
        let reg = registry(false);
        let result = reg.match_route("/unknown/path", "GET").await;
        assert!(matches!(
            result,
            RouteLookupResult::NoMatch(NoMatchReason::ServiceNotFound)
        ));
    }

    #[tokio::test]
    async fn reserved_segment_bypasses_registry() {
        let reg = registry(false);
        let result = reg.match_route("/admin/services", "GET").await;
        assert!(matches!(
            result,
            RouteLookupResult::NoMatch(NoMatchReason::ServiceNotFound)
        ));
    }

    #[tokio::test]
    async fn unregister_of_absent_id_is_a_no_op() {
        let reg = registry(false);
        assert!(!reg.unregister("missing").await);
    }
}
