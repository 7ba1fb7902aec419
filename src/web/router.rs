//! Gateway router construction: request-id span, security headers,
//! compression, and a response-time ceiling wrap everything; the reserved
//! `/admin` and `/q` prefixes are mounted ahead of the catch-all ingress
//! dispatch so the latter never sees them.

use std::time::Duration;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;

use crate::state::AppState;
use crate::web::middleware::request_id::RequestIdLayer;
use crate::web::middleware::security_headers::SecurityHeadersLayer;
use crate::web::{admin, gateway_handler, health};

pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state);

    let admin_router = Router::new()
        .route("/admin/services", post(admin::register_service).get(admin::list_services))
        .route(
            "/admin/services/{id}",
            get(admin::get_service).put(admin::update_service).delete(admin::unregister_service),
        )
        .route("/admin/api-keys", post(admin::create_api_key).get(admin::list_api_keys))
        .route("/admin/api-keys/{id}", delete(admin::revoke_api_key));

    let health_router = Router::new()
        .route("/q/health", get(health::liveness))
        .route("/q/health/ready", get(health::readiness));

    Router::new()
        .merge(admin_router)
        .merge(health_router)
        .fallback(gateway_handler::ingress)
        .with_state(state)
        .layer((
            RequestIdLayer,
            SecurityHeadersLayer,
            cors,
            CompressionLayer::new().zstd(true).br(true).gzip(true).quality(tower_http::CompressionLevel::Fastest),
            TimeoutLayer::new(Duration::from_secs(60)),
        ))
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let cfg = &state.config.cors;
    let origins = cfg.allowed_origins.clone();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins.into_iter().filter_map(|o| o.parse().ok()))
    };

    let methods = cfg
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect::<Vec<_>>();

    let mut layer = CorsLayer::new().allow_origin(allow_origin).allow_methods(methods);
    if cfg.allow_credentials {
        layer = layer.allow_credentials(true);
    }
    layer
}
