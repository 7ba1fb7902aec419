//! RFC 7807 Problem Details: the taxonomy of gateway-level failures, each
//! mapped to a status code and rendered as `application/problem+json`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

use crate::ratelimit::model::RateLimitDecision;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProblemType {
    RouteNotFound,
    ServiceNotFound,
    ValidationError,
    Unauthorized,
    Forbidden,
    Conflict,
    PayloadTooLarge,
    HeaderTooLarge,
    TooManyRequests,
    BadGateway,
    GatewayTimeout,
    InternalError,
}

impl ProblemType {
    pub fn status(self) -> StatusCode {
        match self {
            ProblemType::RouteNotFound | ProblemType::ServiceNotFound => StatusCode::NOT_FOUND,
            ProblemType::ValidationError => StatusCode::BAD_REQUEST,
            ProblemType::Unauthorized => StatusCode::UNAUTHORIZED,
            ProblemType::Forbidden => StatusCode::FORBIDDEN,
            ProblemType::Conflict => StatusCode::CONFLICT,
            ProblemType::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ProblemType::HeaderTooLarge => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            ProblemType::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ProblemType::BadGateway => StatusCode::BAD_GATEWAY,
            ProblemType::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            ProblemType::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn slug(self) -> &'static str {
        match self {
            ProblemType::RouteNotFound => "route-not-found",
            ProblemType::ServiceNotFound => "service-not-found",
            ProblemType::ValidationError => "validation-error",
            ProblemType::Unauthorized => "unauthorized",
            ProblemType::Forbidden => "forbidden",
            ProblemType::Conflict => "conflict",
            ProblemType::PayloadTooLarge => "payload-too-large",
            ProblemType::HeaderTooLarge => "header-too-large",
            ProblemType::TooManyRequests => "too-many-requests",
            ProblemType::BadGateway => "bad-gateway",
            ProblemType::GatewayTimeout => "gateway-timeout",
            ProblemType::InternalError => "internal-error",
        }
    }

    fn default_title(self) -> &'static str {
        match self {
            ProblemType::RouteNotFound => "No matching route",
            ProblemType::ServiceNotFound => "No such service",
            ProblemType::ValidationError => "Request failed validation",
            ProblemType::Unauthorized => "Authentication required",
            ProblemType::Forbidden => "Insufficient permissions",
            ProblemType::Conflict => "Conflicting state",
            ProblemType::PayloadTooLarge => "Request payload too large",
            ProblemType::HeaderTooLarge => "Request headers too large",
            ProblemType::TooManyRequests => "Rate limit exceeded",
            ProblemType::BadGateway => "Upstream is unreachable",
            ProblemType::GatewayTimeout => "Upstream timed out",
            ProblemType::InternalError => "Internal gateway error",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub type_uri: String,
    pub title: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "retryAfterSeconds")]
    pub retry_after_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "resetAtEpochSeconds")]
    pub reset_at_epoch_seconds: Option<u64>,
}

impl ProblemDetails {
    pub fn new(problem_type: ProblemType, detail: impl Into<String>) -> Self {
        Self {
            type_uri: format!("https://aussie-gateway.dev/problems/{}", problem_type.slug()),
            title: problem_type.default_title().to_string(),
            status: problem_type.status().as_u16(),
            detail: Some(detail.into()),
            instance: None,
            limit: None,
            remaining: None,
            retry_after_seconds: None,
            reset_at_epoch_seconds: None,
        }
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Attach rate-limit decision fields to a `429` response body.
    pub fn with_rate_limit_decision(mut self, decision: &RateLimitDecision) -> Self {
        self.limit = Some(decision.limit);
        self.remaining = Some(decision.remaining);
        self.retry_after_seconds = Some(decision.retry_after_seconds);
        self.reset_at_epoch_seconds = Some(decision.reset_at_epoch_seconds);
        self
    }

    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ProblemDetails {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 4xx are expected client-facing outcomes, not gateway failures;
        // only 5xx gets logged at error level.
        if status.is_server_error() {
            error!(status = self.status, title = %self.title, detail = ?self.detail, "gateway error response");
        } else if status.is_client_error() {
            warn!(status = self.status, title = %self.title, "client error response");
        }

        let mut response = (status, axum::Json(self)).into_response();
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}
