//! Application state shared across the admin and gateway routers: config,
//! registry, rate limiters, and the auth pipeline all composed in
//! `AppState::new`.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthPipeline, InMemoryApiKeyStore, InMemorySessionStore, ReqwestJwksClient};
use crate::config::Config;
use crate::primitives::clock::{Clock, SystemClock};
use crate::proxy::HttpProxy;
use crate::ratelimit::memory::MemoryRateLimiter;
use crate::ratelimit::provider::ProviderLoader;
use crate::ratelimit::resolver::RateLimitResolver;
use crate::registry::service::ServiceRegistry;
use crate::registry::store::InMemoryServiceStore;
use crate::telemetry::{MetricsSink, SecurityEventSink, TracingMetricsSink, TracingSecurityEventSink};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ServiceRegistry>,
    pub rate_limit_resolver: Arc<RateLimitResolver>,
    pub provider_loader: Arc<ProviderLoader>,
    pub auth: Arc<AuthPipeline>,
    /// Concrete handle to the same store installed in `auth.api_key_store`,
    /// kept alongside the trait object so the admin API can call
    /// `insert_raw`/`revoke`/`list`, which aren't part of `ApiKeyStore`.
    pub api_key_store: Arc<InMemoryApiKeyStore>,
    pub proxy: Arc<HttpProxy>,
    pub security_events: Arc<dyn SecurityEventSink>,
    pub metrics: Arc<dyn MetricsSink>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let registry = Arc::new(ServiceRegistry::new(
            InMemoryServiceStore::shared(),
            config.cache_local.ttl,
            config.cache_local.jitter,
            config.cache_local.max_entries,
            config.public_default_visibility_enabled,
        ));

        let rate_limit_resolver = Arc::new(RateLimitResolver::new(
            config.ratelimit.clone(),
            config.cache_local.ttl,
            config.cache_local.jitter,
            config.cache_local.max_entries,
        ));

        let memory_provider = Arc::new(MemoryRateLimiter::with_clock(clock.clone()));
        let provider_loader = Arc::new(ProviderLoader::new(
            vec![memory_provider],
            config.ratelimit.degrade_after_failures,
            config.ratelimit.degrade_cooldown,
        ));

        let http_client = reqwest::Client::builder().connect_timeout(config.proxy_timeouts.connect).build()?;
        let jwks_client = Arc::new(ReqwestJwksClient::new(http_client, Duration::from_secs(300), Duration::from_secs(60)));

        let api_key_store = InMemoryApiKeyStore::shared();
        let auth = Arc::new(AuthPipeline {
            jws: config.jws.clone(),
            trusted_proxy: config.trusted_proxy.clone(),
            session_store: InMemorySessionStore::shared(),
            api_key_store: api_key_store.clone(),
            jwks_client,
            clock: clock.clone(),
            idp_jwks_url: config.idp_jwks_url.clone(),
        });

        let proxy = Arc::new(HttpProxy::new(config.limits.clone(), config.proxy_timeouts.clone())?);

        Ok(Self {
            config: Arc::new(config),
            registry,
            rate_limit_resolver,
            provider_loader,
            auth,
            api_key_store,
            proxy,
            security_events: Arc::new(TracingSecurityEventSink),
            metrics: Arc::new(TracingMetricsSink),
            clock,
        })
    }
}
