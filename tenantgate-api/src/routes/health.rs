/// Health check endpoint
///
/// Verifies that the server is running and both stores answer.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "identity_store": "connected",
///   "tenant_store": "connected"
/// }
/// ```
///
/// Returns 200 with `"status": "degraded"` when a store is unreachable.

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tenantgate_shared::deadline::bounded;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Application version
    pub version: String,

    /// Identity store status
    pub identity_store: String,

    /// Tenant store status
    pub tenant_store: String,
}

fn store_status<E: std::fmt::Display>(store: &'static str, result: Result<(), E>) -> &'static str {
    match result {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!(store, error = %e, "Health check failed");
            "disconnected"
        }
    }
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let timeout = state.config.store_timeout();

    let identity = bounded(timeout, "identity_ping", state.coordinator.identity().ping()).await;
    let tenant = bounded(timeout, "tenant_ping", state.coordinator.provisioner().ping()).await;

    let identity_store = store_status("identity", identity);
    let tenant_store = store_status("tenant", tenant);
    let healthy = identity_store == "connected" && tenant_store == "connected";

    Ok(Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        identity_store: identity_store.to_string(),
        tenant_store: tenant_store.to_string(),
    }))
}
