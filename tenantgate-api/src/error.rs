/// Error handling for the API server
///
/// All handlers return `Result<T, ApiError>`, which converts into an HTTP
/// response with a JSON body:
///
/// ```json
/// { "error": "conflict", "message": "User already exists" }
/// ```
///
/// Engine errors (`TenantError`) map onto status codes as follows:
///
/// | Status | Errors |
/// |--------|--------|
/// | 400 | InvalidSchema, UnknownField, MissingField, InvalidFieldValue, PrimaryKeyMismatch |
/// | 401 | InvalidCredentials |
/// | 404 | UnknownTenant, UnknownEmail |
/// | 409 | DuplicateTenant, DuplicateUser, SchemaConflict |
/// | 503 | ProvisioningIncomplete (body carries `tenant_id` and `retryable`) |
/// | 500 | Provisioning, Storage (details logged, not returned) |

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tenantgate_shared::TenantError;
use uuid::Uuid;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Not found (404)
    NotFound(String),

    /// Conflict (409) - e.g., duplicate email
    Conflict(String),

    /// Unprocessable entity (422) - request shape validation
    ValidationError(Vec<ValidationErrorDetail>),

    /// Too many requests (429)
    RateLimitExceeded {
        retry_after: u64,
        message: String,
    },

    /// Internal server error (500)
    InternalError(String),

    /// Service unavailable (503); retryable
    ServiceUnavailable {
        message: String,
        tenant_id: Option<Uuid>,
    },
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "bad_request", "unauthorized")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Optional validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,

    /// Tenant the error refers to, when the client needs it to retry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    /// Present and true when the same request may be retried
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::RateLimitExceeded { message, .. } => write!(f, "Rate limit exceeded: {}", message),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable { message, .. } => write!(f, "Service unavailable: {}", message),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut retry_after = None;
        let mut tenant_id = None;
        let mut retryable = None;

        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::ValidationError(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::RateLimitExceeded { retry_after: secs, message } => {
                retry_after = Some(secs);
                (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded", message, None)
            }
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            ApiError::ServiceUnavailable { message, tenant_id: id } => {
                tenant_id = id.map(|id| id.to_string());
                retryable = Some(true);
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", message, None)
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
            tenant_id,
            retryable,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert("Retry-After", HeaderValue::from(secs));
        }
        response
    }
}

impl From<TenantError> for ApiError {
    fn from(err: TenantError) -> Self {
        match err {
            TenantError::InvalidSchema(_)
            | TenantError::UnknownField(_)
            | TenantError::MissingField(_)
            | TenantError::InvalidFieldValue { .. }
            | TenantError::PrimaryKeyMismatch(_) => ApiError::BadRequest(err.to_string()),

            TenantError::InvalidCredentials => ApiError::Unauthorized(err.to_string()),

            TenantError::UnknownTenant(_) => ApiError::NotFound("Tenant not found".to_string()),
            TenantError::UnknownEmail(_) => {
                ApiError::NotFound("No tenant registered for this email".to_string())
            }

            TenantError::DuplicateTenant(_)
            | TenantError::DuplicateUser
            | TenantError::SchemaConflict { .. } => ApiError::Conflict(err.to_string()),

            TenantError::ProvisioningIncomplete { tenant_id, reason } => {
                tracing::warn!(tenant_id = %tenant_id, reason = %reason, "Tenant provisioning incomplete");
                ApiError::ServiceUnavailable {
                    message: "Tenant provisioning is incomplete; retry later".to_string(),
                    tenant_id: Some(tenant_id),
                }
            }

            TenantError::Provisioning(_) | TenantError::Storage(_) => {
                ApiError::InternalError(err.to_string())
            }
        }
    }
}

/// Converts `validator` failures into the 422 response body
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();
        ApiError::ValidationError(details)
    }
}
