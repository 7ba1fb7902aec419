//! Admin API: `/admin/services` registration CRUD and `/admin/api-keys`
//! lifecycle, gated by [`AdminAuth`], a constant-time key check built
//! directly from `primitives::hash`.

use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::primitives::hash::{constant_time_eq_hex, full_sha256_hex};
use crate::registry::model::{RegistrationResult, ServiceRegistration};
use crate::state::AppState;

/// Presented via `X-Admin-Api-Key`, checked against `config.admin_api_key_hash`.
pub struct AdminAuth;

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get("X-Admin-Api-Key")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(unauthorized)?;

        if state.config.admin_api_key_hash.is_empty() {
            return Err(unauthorized());
        }

        if !constant_time_eq_hex(&full_sha256_hex(presented), &state.config.admin_api_key_hash) {
            return Err(unauthorized());
        }

        Ok(AdminAuth)
    }
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(ErrorBody { error: "missing or invalid admin API key".into() })).into_response()
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn failure_response(reason: String, suggested_status: u16) -> Response {
    let status = StatusCode::from_u16(suggested_status).unwrap_or(StatusCode::BAD_REQUEST);
    (status, Json(ErrorBody { error: reason })).into_response()
}

/// `POST /admin/services` -- register a new service (201/400/403/409).
pub async fn register_service(_auth: AdminAuth, State(state): State<AppState>, Json(reg): Json<ServiceRegistration>) -> Response {
    match state.registry.register(reg).await {
        RegistrationResult::Success(stored) => (StatusCode::CREATED, Json(stored)).into_response(),
        RegistrationResult::Failure { reason, suggested_status } => failure_response(reason, suggested_status),
    }
}

/// `GET /admin/services` -- list all registrations (200).
pub async fn list_services(_auth: AdminAuth, State(state): State<AppState>) -> Response {
    Json(state.registry.list_all().await).into_response()
}

/// `GET /admin/services/{id}` (200/404).
pub async fn get_service(_auth: AdminAuth, State(state): State<AppState>, Path(service_id): Path<String>) -> Response {
    match state.registry.get(&service_id).await {
        Some(reg) => Json(reg).into_response(),
        None => failure_response("no such service".into(), 404),
    }
}

/// `PUT /admin/services/{id}` -- CAS update (200/400/403/404/409). The
/// path variable must match the body's `serviceId`.
pub async fn update_service(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(service_id): Path<String>,
    Json(reg): Json<ServiceRegistration>,
) -> Response {
    if reg.service_id != service_id {
        return failure_response("path serviceId does not match request body".into(), 400);
    }
    if state.registry.get(&service_id).await.is_none() {
        return failure_response("no such service".into(), 404);
    }
    match state.registry.update(reg).await {
        RegistrationResult::Success(stored) => {
            state.rate_limit_resolver.invalidate_service(&stored.service_id);
            Json(stored).into_response()
        }
        RegistrationResult::Failure { reason, suggested_status } => failure_response(reason, suggested_status),
    }
}

/// `DELETE /admin/services/{id}` (204/404).
pub async fn unregister_service(_auth: AdminAuth, State(state): State<AppState>, Path(service_id): Path<String>) -> Response {
    if state.registry.unregister(&service_id).await {
        state.rate_limit_resolver.invalidate_service(&service_id);
        StatusCode::NO_CONTENT.into_response()
    } else {
        failure_response("no such service".into(), 404)
    }
}

#[derive(Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
}

#[derive(Serialize)]
pub struct CreateApiKeyResponse {
    pub id: String,
    pub name: String,
    /// Only ever returned once, at creation time.
    pub raw_key: String,
}

#[derive(Serialize)]
pub struct ApiKeySummary {
    pub id: String,
    pub name: String,
    pub revoked: bool,
}

/// `POST /admin/api-keys` -- provision a key, returning the raw secret
/// exactly once.
pub async fn create_api_key(_auth: AdminAuth, State(state): State<AppState>, Json(body): Json<CreateApiKeyRequest>) -> Response {
    let id = ulid::Ulid::new().to_string();
    let raw_key = generate_raw_key();
    state.api_key_store.insert_raw(&id, &body.name, &raw_key);
    (
        StatusCode::CREATED,
        Json(CreateApiKeyResponse { id, name: body.name, raw_key }),
    )
        .into_response()
}

/// `GET /admin/api-keys` -- list provisioned keys, never exposing secrets.
pub async fn list_api_keys(_auth: AdminAuth, State(state): State<AppState>) -> Response {
    let summaries: Vec<ApiKeySummary> = state
        .api_key_store
        .list()
        .into_iter()
        .map(|r| ApiKeySummary { id: r.id, name: r.name, revoked: r.revoked })
        .collect();
    Json(summaries).into_response()
}

/// `DELETE /admin/api-keys/{id}` -- revoke (idempotent, 204).
pub async fn revoke_api_key(_auth: AdminAuth, State(state): State<AppState>, Path(key_id): Path<String>) -> Response {
    state.api_key_store.revoke(&key_id);
    StatusCode::NO_CONTENT.into_response()
}

fn generate_raw_key() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    use std::fmt::Write;
    let mut out = String::with_capacity(64);
    for b in bytes {
        write!(out, "{b:02x}").expect("writing to a String cannot fail");
    }
    out
}
