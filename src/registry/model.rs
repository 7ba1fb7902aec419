//! Service registry data model: `ServiceRegistration`, `EndpointConfig`,
//! and the sum-typed results the registry returns.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Visibility {
    Public,
    Private,
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Private
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EndpointType {
    Http,
    #[serde(rename = "WEBSOCKET")]
    WebSocket,
}

/// `{pathPattern -> visibility}`, evaluated in order before endpoint
/// defaults.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityRule {
    pub path_pattern: String,
    pub visibility: Visibility,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessConfig {
    #[serde(default)]
    pub allowed_ips: Vec<String>,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub allowed_subdomains: Vec<String>,
}

/// Per-service CORS override. Fields are optional so an absent service
/// override falls through to the platform default (`config::CorsConfig`).
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsOverride {
    pub allowed_origins: Option<Vec<String>>,
    pub allowed_methods: Option<Vec<String>>,
    pub allow_credentials: Option<bool>,
}

/// `operationName -> {anyOfPermissions}`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRule {
    pub any_of_permissions: HashSet<String>,
}

/// Sparse rate-limit override: any field left `None` falls through to the
/// next level in the endpoint -> service -> platform hierarchy.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitOverride {
    pub requests_per_window: Option<u32>,
    pub window_seconds: Option<u64>,
    pub burst_capacity: Option<u32>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    pub path: String,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub auth_required: Option<bool>,
    #[serde(default)]
    pub path_rewrite: Option<String>,
    #[serde(rename = "type", default = "default_endpoint_type")]
    pub endpoint_type: EndpointType,
    #[serde(default)]
    pub rate_limit_config: Option<RateLimitOverride>,
    #[serde(default)]
    pub sampling_config: Option<f64>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub operation_name: Option<String>,
}

fn default_endpoint_type() -> EndpointType {
    EndpointType::Http
}

impl EndpointConfig {
    /// `methods` defaults to `{"GET"}` for WEBSOCKET, must be non-empty for
    /// HTTP.
    pub fn effective_methods(&self) -> Vec<String> {
        if !self.methods.is_empty() {
            return self.methods.clone();
        }
        match self.endpoint_type {
            EndpointType::WebSocket => vec!["GET".to_string()],
            EndpointType::Http => vec![],
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRegistration {
    pub service_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub base_url: String,
    #[serde(default)]
    pub route_prefix: Option<String>,
    #[serde(default)]
    pub default_visibility: Visibility,
    #[serde(default)]
    pub default_auth_required: bool,
    #[serde(default)]
    pub visibility_rules: Vec<VisibilityRule>,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    pub access_config: Option<AccessConfig>,
    #[serde(default)]
    pub cors_config: Option<CorsOverride>,
    #[serde(default)]
    pub permission_policy: Option<HashMap<String, PermissionRule>>,
    #[serde(default)]
    pub rate_limit_config: Option<RateLimitOverride>,
    #[serde(default)]
    pub sampling_config: Option<f64>,
    #[serde(default)]
    pub version: u64,
}

impl ServiceRegistration {
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.service_id)
    }

    pub fn route_prefix(&self) -> String {
        self.route_prefix
            .clone()
            .unwrap_or_else(|| format!("/{}", self.service_id))
    }
}

#[derive(Clone, Debug)]
pub struct RouteMatch {
    pub service: ServiceRegistration,
    pub endpoint: EndpointConfig,
    pub target_path: String,
    pub path_variables: HashMap<String, String>,
}

/// Sum type returned by [`crate::registry::service::ServiceRegistry::match_route`].
#[derive(Clone, Debug)]
pub enum RouteLookupResult {
    RouteMatch(RouteMatch),
    /// A pass-through service: matched the registry but no endpoint.
    ServiceOnlyMatch { service: ServiceRegistration },
    NoMatch(NoMatchReason),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NoMatchReason {
    ServiceNotFound,
}

impl RouteLookupResult {
    /// The effective visibility for this lookup, resolved endpoint -> service
    /// -> platform default.
    pub fn effective_visibility(&self) -> Visibility {
        match self {
            RouteLookupResult::RouteMatch(m) => m
                .endpoint
                .visibility
                .or_else(|| {
                    m.service
                        .visibility_rules
                        .iter()
                        .find(|r| r.path_pattern == m.target_path)
                        .map(|r| r.visibility)
                })
                .unwrap_or(m.service.default_visibility),
            RouteLookupResult::ServiceOnlyMatch { service } => service.default_visibility,
            RouteLookupResult::NoMatch(_) => Visibility::Private,
        }
    }

    pub fn effective_auth_required(&self) -> bool {
        match self {
            RouteLookupResult::RouteMatch(m) => {
                m.endpoint.auth_required.unwrap_or(m.service.default_auth_required)
            }
            RouteLookupResult::ServiceOnlyMatch { service } => service.default_auth_required,
            RouteLookupResult::NoMatch(_) => true,
        }
    }

    pub fn service(&self) -> Option<&ServiceRegistration> {
        match self {
            RouteLookupResult::RouteMatch(m) => Some(&m.service),
            RouteLookupResult::ServiceOnlyMatch { service } => Some(service),
            RouteLookupResult::NoMatch(_) => None,
        }
    }
}

/// Result of [`register`]/[`update`].
#[derive(Clone, Debug)]
pub enum RegistrationResult {
    Success(ServiceRegistration),
    Failure { reason: String, suggested_status: u16 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_falls_back_to_service_id() {
        let reg = sample_registration();
        assert_eq!(reg.display_name(), "svc-a");
    }

    #[test]
    fn route_prefix_defaults_to_slash_service_id() {
        let reg = sample_registration();
        assert_eq!(reg.route_prefix(), "/svc-a");
    }

    #[test]
    fn endpoint_methods_default_for_websocket() {
        let ep = EndpointConfig {
            path: "/ws".into(),
            methods: vec![],
            visibility: None,
            auth_required: None,
            path_rewrite: None,
            endpoint_type: EndpointType::WebSocket,
            rate_limit_config: None,
            sampling_config: None,
            audience: None,
            operation_name: None,
        };
        assert_eq!(ep.effective_methods(), vec!["GET".to_string()]);
    }

    fn sample_registration() -> ServiceRegistration {
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
            rate_limit_config: None,
            sampling_config: None,
            version: 1,
        }
    }
}
