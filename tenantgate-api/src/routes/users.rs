/// Tenant user endpoints
///
/// - `POST /v1/tenants/:tenant_id/signup` - Create a user in the tenant's table
/// - `POST /v1/tenants/:tenant_id/login` - Verify credentials and return the record
///
/// Field values may be sent as JSON strings, numbers or booleans; they are
/// converted to text and parsed against the tenant's column types by the
/// engine. `null` leaves a column unset.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;
use validator::Validate;

/// Signup request
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub user_data: serde_json::Map<String, Value>,

    /// Must match the tenant's primary key when given
    pub primary_key_field: Option<String>,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 63, message = "Primary key field must be between 1 and 63 characters"))]
    pub primary_key_field: String,

    pub primary_key_value: Value,

    pub password: String,
}

/// Plain message response
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Login response
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_details: BTreeMap<String, String>,
    pub message: String,
}

/// Text form of a scalar JSON value; `None` for null
fn scalar_text(field: &str, value: Value) -> ApiResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Array(_) | Value::Object(_) => Err(ApiError::BadRequest(format!(
            "Field '{}' must be a string, number or boolean",
            field
        ))),
    }
}

fn user_values(data: serde_json::Map<String, Value>) -> ApiResult<HashMap<String, String>> {
    let mut values = HashMap::with_capacity(data.len());
    for (field, value) in data {
        if let Some(text) = scalar_text(&field, value)? {
            values.insert(field, text);
        }
    }
    Ok(values)
}

/// Sign up a user
///
/// # Endpoint
///
/// ```text
/// POST /v1/tenants/:tenant_id/signup
/// Content-Type: application/json
///
/// {
///   "user_data": {"username": "newUser", "password": "newPassword"},
///   "primary_key_field": "username"
/// }
/// ```
///
/// # Response (201)
///
/// ```json
/// { "message": "Signup successful" }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Unknown or missing fields, bad values
/// - `404 Not Found`: Unknown tenant
/// - `409 Conflict`: Primary-key value already taken
/// - `503 Service Unavailable`: Tenant namespace not provisioned yet
pub async fn signup(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let values = user_values(req.user_data)?;
    state
        .credentials
        .signup(tenant_id, req.primary_key_field.as_deref(), values)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Signup successful".to_string(),
        }),
    ))
}

/// Log a user in
///
/// # Endpoint
///
/// ```text
/// POST /v1/tenants/:tenant_id/login
/// Content-Type: application/json
///
/// {
///   "primary_key_field": "username",
///   "primary_key_value": "newUser",
///   "password": "newPassword"
/// }
/// ```
///
/// # Response
///
/// ```json
/// {
///   "user_details": {"password": "newPassword", "username": "newUser"},
///   "message": "Login successful"
/// }
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: Any credential failure (uniform)
/// - `429 Too Many Requests`: Login throttled
pub async fn login(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    req.validate()?;

    let primary_key_value = scalar_text(&req.primary_key_field, req.primary_key_value)?
        .ok_or_else(|| ApiError::BadRequest("primary_key_value is required".to_string()))?;

    if let Some(throttle) = &state.throttle {
        throttle.enforce(tenant_id, &primary_key_value).await?;
    }

    let user_details = state
        .credentials
        .login(tenant_id, &req.primary_key_field, &primary_key_value, &req.password)
        .await?;

    Ok(Json(LoginResponse {
        user_details,
        message: "Login successful".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_text() {
        assert_eq!(scalar_text("f", json!("abc")).unwrap(), Some("abc".to_string()));
        assert_eq!(scalar_text("f", json!(42)).unwrap(), Some("42".to_string()));
        assert_eq!(scalar_text("f", json!(true)).unwrap(), Some("true".to_string()));
        assert_eq!(scalar_text("f", json!(null)).unwrap(), None);
        assert!(scalar_text("f", json!([1])).is_err());
        assert!(scalar_text("f", json!({"a": 1})).is_err());
    }

    #[test]
    fn test_user_values_skips_nulls() {
        let data = json!({"username": "alice", "age": 30, "bio": null});
        let values = user_values(data.as_object().unwrap().clone()).unwrap();

        assert_eq!(values.len(), 2);
        assert_eq!(values["username"], "alice");
        assert_eq!(values["age"], "30");
    }
}
