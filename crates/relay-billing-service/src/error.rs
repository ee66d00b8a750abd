//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use relay_billing_core::BillingError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials/signature.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists or invalid state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Quota exhausted for this billing period.
    #[error("quota exceeded: used={used}, quota={quota}")]
    QuotaExceeded {
        /// Requests consumed so far this period.
        used: i64,
        /// The account's monthly quota.
        quota: i64,
        /// Human-readable denial reason.
        reason: String,
    },

    /// Duplicate event (idempotency). The webhook path never surfaces this
    /// as an error; it exists for internal replay tooling.
    #[error("duplicate event: {0}")]
    DuplicateEvent(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// External service error.
    #[error("external service error: {0}")]
    ExternalService(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::QuotaExceeded {
                used,
                quota,
                reason,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                "quota_exceeded",
                reason.clone(),
                Some(serde_json::json!({
                    "used": used,
                    "quota": quota
                })),
            ),
            Self::DuplicateEvent(id) => (
                StatusCode::CONFLICT,
                "duplicate_event",
                format!("Event {id} already processed"),
                None,
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                "external_service_error",
                msg.clone(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<relay_billing_store::StoreError> for ApiError {
    fn from(err: relay_billing_store::StoreError) -> Self {
        match err {
            relay_billing_store::StoreError::NotFound => Self::NotFound("not found".into()),
            relay_billing_store::StoreError::DuplicateEvent { event_id } => {
                Self::DuplicateEvent(event_id)
            }
            relay_billing_store::StoreError::Database(msg)
            | relay_billing_store::StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::MalformedEvent(msg) => Self::BadRequest(msg),
            BillingError::InvalidId(e) => Self::BadRequest(e.to_string()),
        }
    }
}
