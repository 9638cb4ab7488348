/// Tenant endpoints
///
/// - `POST /v1/tenants` - Register a tenant and provision its namespace
/// - `GET /v1/tenants/lookup?email=` - Find a tenant id by contact email
/// - `POST /v1/tenants/:tenant_id/provision` - Re-run provisioning for a tenant

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tenantgate_shared::coordinator::RegisterTenant;
use tenantgate_shared::schema::SchemaDefinition;
use uuid::Uuid;
use validator::Validate;

/// Register tenant request
///
/// `schema` maps field names to column types; its key order becomes the
/// column order of the tenant's user table.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterTenantRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,

    #[serde(default)]
    #[validate(length(max = 32, message = "Phone must be at most 32 characters"))]
    pub phone: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub schema: SchemaDefinition,

    #[validate(length(min = 1, max = 63, message = "Primary key field must be between 1 and 63 characters"))]
    pub primary_key_field: String,

    /// Password column; defaults to `password` when the schema has one
    #[validate(length(min = 1, max = 63, message = "Secret field must be between 1 and 63 characters"))]
    pub secret_field: Option<String>,
}

/// Lookup query
#[derive(Debug, Deserialize, Validate)]
pub struct LookupQuery {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Response carrying a tenant id
#[derive(Debug, Serialize, Deserialize)]
pub struct TenantIdResponse {
    pub tenant_id: String,
    pub message: String,
}

impl TenantIdResponse {
    fn new(tenant_id: Uuid, message: &str) -> Self {
        TenantIdResponse {
            tenant_id: tenant_id.to_string(),
            message: message.to_string(),
        }
    }
}

/// Register a tenant
///
/// # Endpoint
///
/// ```text
/// POST /v1/tenants
/// Content-Type: application/json
///
/// {
///   "name": "Acme",
///   "phone": "1234567890",
///   "email": "admin@acme.test",
///   "schema": {"username": "text", "password": "text", "age": "integer"},
///   "primary_key_field": "username"
/// }
/// ```
///
/// # Response (201)
///
/// ```json
/// { "tenant_id": "uuid", "message": "Tenant registered successfully" }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Invalid schema
/// - `409 Conflict`: Email already registered
/// - `422 Unprocessable Entity`: Request validation failed
/// - `503 Service Unavailable`: Tenant recorded but its namespace is not
///   ready; the body carries `tenant_id` for `POST .../provision`
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterTenantRequest>,
) -> ApiResult<(StatusCode, Json<TenantIdResponse>)> {
    req.validate()?;

    let tenant_id = state
        .coordinator
        .register_tenant(RegisterTenant {
            name: req.name,
            phone: req.phone,
            email: req.email,
            schema: req.schema,
            primary_key_field: req.primary_key_field,
            secret_field: req.secret_field,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TenantIdResponse::new(tenant_id, "Tenant registered successfully")),
    ))
}

/// Look up a tenant id by email
///
/// # Errors
///
/// - `404 Not Found`: No tenant registered for the email
/// - `422 Unprocessable Entity`: Malformed email
pub async fn lookup(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> ApiResult<Json<TenantIdResponse>> {
    query.validate()?;

    let tenant_id = state.coordinator.get_tenant_id(&query.email).await?;

    Ok(Json(TenantIdResponse::new(tenant_id, "Tenant ID retrieved successfully")))
}

/// Provision (or re-provision) a tenant's namespace
///
/// Idempotent. Used to recover tenants whose registration returned 503.
///
/// # Errors
///
/// - `404 Not Found`: Unknown tenant
/// - `409 Conflict`: An existing namespace has a different shape
pub async fn provision(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<TenantIdResponse>> {
    state.coordinator.repair(tenant_id).await?;

    Ok(Json(TenantIdResponse::new(tenant_id, "Tenant provisioned successfully")))
}
