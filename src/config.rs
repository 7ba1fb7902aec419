//! Gateway configuration model: platform, rate-limit, JWS, CORS,
//! trusted-proxy, sampling, and cache settings.
//!
//! Loaded via `figment::Figment`, merging environment variables over
//! compiled-in defaults with an optional TOML file layered in between.
//! Durations are expressed as human strings (`"300s"`, `"5m"`) parsed with
//! `fundu`.

use custom_debug_derive::Debug as CustomDebug;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

fn redact(_: &String, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("***redacted***")
}

/// `jws.*` -- short-lived token issuance.
#[derive(Clone, CustomDebug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JwsConfig {
    /// `kid` advertised in issued tokens and exposed at the JWKS endpoint.
    pub active_kid: String,
    /// Symmetric or PEM-encoded signing material. Never logged.
    #[debug(with = "redact")]
    pub signing_key: String,
    /// `iss` claim on every issued token.
    pub issuer: String,
    /// Fallback `aud` when a route declares none.
    pub default_audience: String,
    /// Hard cap on `exp - iat` for any issued token.
    #[serde(with = "duration_seconds")]
    pub max_token_ttl: Duration,
    /// Whether bearer-token validation requires a matching `aud`.
    pub require_audience: bool,
}

impl Default for JwsConfig {
    fn default() -> Self {
        Self {
            active_kid: "aussie-1".into(),
            signing_key: "development-only-signing-key-do-not-use-in-prod".into(),
            issuer: "aussie-gateway".into(),
            default_audience: "aussie-gateway".into(),
            max_token_ttl: Duration::from_secs(300),
            require_audience: false,
        }
    }
}

/// `ratelimit.*` -- platform-wide ceiling and defaults, layered under
/// per-service/per-endpoint overrides by [`crate::ratelimit::resolver`].
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPlatformConfig {
    pub default_requests_per_window: u32,
    #[serde(with = "duration_seconds")]
    pub default_window: Duration,
    pub platform_max_requests_per_window: u32,
    /// Consecutive provider failures before falling back to the in-memory
    /// provider.
    pub degrade_after_failures: u32,
    /// Cool-down before re-probing a degraded distributed provider.
    #[serde(with = "duration_seconds")]
    pub degrade_cooldown: Duration,
    pub websocket_connection: WsLimitDefaults,
    pub websocket_message: WsLimitDefaults,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WsLimitDefaults {
    pub requests_per_window: u32,
    #[serde(with = "duration_seconds")]
    pub window: Duration,
}

impl Default for RateLimitPlatformConfig {
    fn default() -> Self {
        Self {
            default_requests_per_window: 120,
            default_window: Duration::from_secs(60),
            platform_max_requests_per_window: 10_000,
            degrade_after_failures: 3,
            degrade_cooldown: Duration::from_secs(30),
            websocket_connection: WsLimitDefaults {
                requests_per_window: 5,
                window: Duration::from_secs(60),
            },
            websocket_message: WsLimitDefaults {
                requests_per_window: 60,
                window: Duration::from_secs(60),
            },
        }
    }
}

/// `cors.*` -- default CORS policy, overridable per service.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![],
            allowed_methods: vec!["GET".into(), "POST".into(), "PUT".into(), "DELETE".into()],
            allow_credentials: false,
        }
    }
}

/// `trusted-proxy.*` -- peers allowed to set `X-Forwarded-For`/`Forwarded`.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrustedProxyConfig {
    pub trusted_proxies: Vec<IpAddr>,
}

impl TrustedProxyConfig {
    pub fn is_trusted(&self, peer: IpAddr) -> bool {
        self.trusted_proxies.iter().any(|p| *p == peer)
    }
}

/// `cache.local.*` -- the jittered TTL cache backing the registry and
/// rate-limit resolver.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalCacheConfig {
    #[serde(with = "duration_seconds")]
    pub ttl: Duration,
    pub jitter: f64,
    pub max_entries: usize,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            jitter: 0.2,
            max_entries: 10_000,
        }
    }
}

/// `limits.*` -- request size ceilings.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitsConfig {
    pub max_body_size: u64,
    pub max_header_size: u64,
    pub max_total_headers_size: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024,
            max_header_size: 16 * 1024,
            max_total_headers_size: 64 * 1024,
        }
    }
}

/// `telemetry.*` -- tracing sampling default, overridable per service/route.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryConfig {
    pub default_sampling_rate: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_sampling_rate: 0.1,
        }
    }
}

/// Per-phase proxy timeouts.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyTimeoutsConfig {
    #[serde(with = "duration_seconds")]
    pub connect: Duration,
    #[serde(with = "duration_seconds")]
    pub tls: Duration,
    #[serde(with = "duration_seconds")]
    pub headers: Duration,
    #[serde(with = "duration_seconds")]
    pub body: Duration,
}

impl Default for ProxyTimeoutsConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            tls: Duration::from_secs(5),
            headers: Duration::from_secs(10),
            body: Duration::from_secs(30),
        }
    }
}

/// Top-level application configuration, assembled by [`crate::app::App::new`]
/// before the rest of the application is constructed.
#[derive(Clone, CustomDebug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Identity this gateway asserts as `iss` in issued tokens.
    pub gateway_id: String,
    pub bind_addr: String,
    pub admin_bind_addr: String,
    pub public_default_visibility_enabled: bool,
    #[serde(with = "duration_seconds")]
    pub shutdown_timeout: Duration,
    /// Bootstrap admin API key hash, checked by the admin-auth middleware.
    /// Provisioning this value is out of scope here; the gateway only
    /// verifies it.
    #[debug(with = "redact")]
    pub admin_api_key_hash: String,

    /// External IdP's JWKS endpoint, used to verify caller-presented bearer
    /// tokens.
    pub idp_jwks_url: String,
    pub jws: JwsConfig,
    pub ratelimit: RateLimitPlatformConfig,
    pub cors: CorsConfig,
    pub trusted_proxy: TrustedProxyConfig,
    pub cache_local: LocalCacheConfig,
    pub limits: LimitsConfig,
    pub telemetry: TelemetryConfig,
    pub proxy_timeouts: ProxyTimeoutsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_id: "aussie-gateway".into(),
            bind_addr: "0.0.0.0:8080".into(),
            admin_bind_addr: "0.0.0.0:8081".into(),
            public_default_visibility_enabled: false,
            shutdown_timeout: Duration::from_secs(25),
            admin_api_key_hash: String::new(),
            idp_jwks_url: "https://idp.example.com/.well-known/jwks.json".into(),
            jws: JwsConfig::default(),
            ratelimit: RateLimitPlatformConfig::default(),
            cors: CorsConfig::default(),
            trusted_proxy: TrustedProxyConfig::default(),
            cache_local: LocalCacheConfig::default(),
            limits: LimitsConfig::default(),
            telemetry: TelemetryConfig::default(),
            proxy_timeouts: ProxyTimeoutsConfig::default(),
        }
    }
}

/// Load configuration: environment variables (prefixed by `figment`'s raw
/// env provider) merged over the compiled-in defaults, with an optional
/// TOML file layered in between when `--config` is passed.
pub fn load(toml_path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    use figment::providers::{Env, Format, Serialized, Toml};
    use figment::Figment;

    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    if let Some(path) = toml_path {
        figment = figment.merge(Toml::file(path));
    }
    figment = figment.merge(Env::prefixed("AUSSIE_").split("__"));

    figment
        .extract()
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))
}

/// `serde_with`-style helper module for (de)serializing [`Duration`] as
/// human-friendly strings (`"5m"`, `"300s"`) via `fundu`.
mod duration_seconds {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("{}s", d.as_secs()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Seconds(u64),
            Human(String),
        }
        match Repr::deserialize(d)? {
            Repr::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Repr::Human(s) => fundu::parse_duration(&s)
                .map_err(|e| serde::de::Error::custom(format!("invalid duration {s:?}: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let cfg = Config::default();
        let json = serde_json::to_string(&cfg).expect("serialize");
        let parsed: Config = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.gateway_id, cfg.gateway_id);
        assert_eq!(parsed.jws.max_token_ttl, cfg.jws.max_token_ttl);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let cfg = Config::default();
        let debug_str = format!("{cfg:?}");
        assert!(!debug_str.contains(&cfg.jws.signing_key));
        assert!(debug_str.contains("***redacted***"));
    }

    #[test]
    fn trusted_proxy_membership() {
        let cfg = TrustedProxyConfig {
            trusted_proxies: vec!["10.0.0.1".parse().unwrap()],
        };
        assert!(cfg.is_trusted("10.0.0.1".parse().unwrap()));
        assert!(!cfg.is_trusted("10.0.0.2".parse().unwrap()));
    }
}
