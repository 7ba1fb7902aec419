//! Liveness/readiness endpoints: `/q/health`, `/q/health/ready`.

use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct LivenessBody {
    status: &'static str,
}

/// `GET /q/health` -- the process is up and serving.
pub async fn liveness() -> Response {
    Json(LivenessBody { status: "ok" }).into_response()
}

#[derive(Serialize)]
struct ReadinessBody {
    status: &'static str,
    registered_services: usize,
    bulkheads: BulkheadSizes,
}

#[derive(Serialize)]
struct BulkheadSizes {
    max_body_size: u64,
    max_header_size: u64,
    max_total_headers_size: u64,
}

/// `GET /q/health/ready` -- reports configured bulkhead sizes alongside
/// registry size, so an operator can see admission limits without reading
/// the deployed config directly.
pub async fn readiness(State(state): State<AppState>) -> Response {
    let registered_services = state.registry.list_all().await.len();
    Json(ReadinessBody {
        status: "ready",
        registered_services,
        bulkheads: BulkheadSizes {
            max_body_size: state.config.limits.max_body_size,
            max_header_size: state.config.limits.max_header_size,
            max_total_headers_size: state.config.limits.max_total_headers_size,
        },
    })
    .into_response()
}
