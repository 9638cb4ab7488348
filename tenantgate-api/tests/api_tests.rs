/// HTTP-level tests for the TenantGate API
///
/// Drive the router through `tower::Service` over the in-memory stores.

mod common;

use axum::http::StatusCode;
use common::TestContext;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_health_reports_both_stores() {
    let ctx = TestContext::new();

    let response = ctx.send("GET", "/health", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
    assert_eq!(response.body["identity_store"], "connected");
    assert_eq!(response.body["tenant_store"], "connected");

    ctx.provisioner.set_unavailable(true);
    let response = ctx.send("GET", "/health", None).await;
    assert_eq!(response.body["status"], "degraded");
    assert_eq!(response.body["tenant_store"], "disconnected");
}

#[tokio::test]
async fn test_register_and_lookup() {
    let ctx = TestContext::new();
    let tenant_id = ctx.register_default("owner@example.com").await;

    let response = ctx
        .send("GET", "/v1/tenants/lookup?email=owner@example.com", None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["tenant_id"], tenant_id.to_string());
    assert_eq!(response.body["message"], "Tenant ID retrieved successfully");

    let response = ctx
        .send("GET", "/v1/tenants/lookup?email=nobody@example.com", None)
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "not_found");
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let ctx = TestContext::new();
    ctx.register_default("owner@example.com").await;

    let response = ctx
        .send(
            "POST",
            "/v1/tenants",
            Some(json!({
                "name": "Second",
                "email": "OWNER@example.com",
                "schema": {"username": "text", "password": "text"},
                "primary_key_field": "username",
            })),
        )
        .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(ctx.identity.len().await, 1);
}

#[tokio::test]
async fn test_register_rejects_unsafe_schema() {
    let ctx = TestContext::new();

    let response = ctx
        .send(
            "POST",
            "/v1/tenants",
            Some(json!({
                "name": "Bad",
                "email": "bad@example.com",
                "schema": {"username": "text", "pass; DROP TABLE tenants": "text"},
                "primary_key_field": "username",
            })),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "bad_request");
    assert_eq!(ctx.identity.operations(), 0);
    assert_eq!(ctx.provisioner.operations(), 0);
}

#[tokio::test]
async fn test_register_validates_request_shape() {
    let ctx = TestContext::new();

    let response = ctx
        .send(
            "POST",
            "/v1/tenants",
            Some(json!({
                "name": "Bad",
                "email": "not-an-email",
                "schema": {"username": "text"},
                "primary_key_field": "username",
            })),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["error"], "validation_error");
    assert_eq!(response.body["details"][0]["field"], "email");
}

#[tokio::test]
async fn test_signup_login_round_trip() {
    let ctx = TestContext::new();
    let tenant_id = ctx.register_default("owner@example.com").await;

    let response = ctx
        .send(
            "POST",
            &format!("/v1/tenants/{}/signup", tenant_id),
            Some(json!({
                "user_data": {"username": "newUser", "password": "newPassword"},
                "primary_key_field": "username",
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["message"], "Signup successful");

    let response = ctx
        .send(
            "POST",
            &format!("/v1/tenants/{}/login", tenant_id),
            Some(json!({
                "primary_key_field": "username",
                "primary_key_value": "newUser",
                "password": "newPassword",
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "Login successful");
    assert_eq!(
        response.body["user_details"],
        json!({"username": "newUser", "password": "newPassword"})
    );
}

#[tokio::test]
async fn test_signup_accepts_typed_json_values() {
    let ctx = TestContext::new();
    let tenant_id = ctx
        .register(
            "owner@example.com",
            json!({"username": "text", "password": "text", "age": "integer", "vip": "boolean"}),
            "username",
        )
        .await;

    let response = ctx
        .send(
            "POST",
            &format!("/v1/tenants/{}/signup", tenant_id),
            Some(json!({
                "user_data": {"username": "alice", "password": "pw", "age": 42, "vip": true},
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);

    let response = ctx
        .send(
            "POST",
            &format!("/v1/tenants/{}/login", tenant_id),
            Some(json!({
                "primary_key_field": "username",
                "primary_key_value": "alice",
                "password": "pw",
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["user_details"]["age"], "42");
    assert_eq!(response.body["user_details"]["vip"], "true");

    let response = ctx
        .send(
            "POST",
            &format!("/v1/tenants/{}/signup", tenant_id),
            Some(json!({
                "user_data": {"username": "bob", "password": "pw", "age": "forty"},
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_signup_errors() {
    let ctx = TestContext::new();
    let tenant_id = ctx.register_default("owner@example.com").await;
    let uri = format!("/v1/tenants/{}/signup", tenant_id);

    let user = json!({"user_data": {"username": "newUser", "password": "newPassword"}});
    assert_eq!(ctx.send("POST", &uri, Some(user.clone())).await.status, StatusCode::CREATED);

    let response = ctx.send("POST", &uri, Some(user)).await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    let response = ctx
        .send(
            "POST",
            &uri,
            Some(json!({"user_data": {"username": "x", "password": "y", "nonexistent_field": "z"}})),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = ctx
        .send(
            "POST",
            &uri,
            Some(json!({"user_data": {"username": "x", "password": "y"}, "primary_key_field": "password"})),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = ctx
        .send(
            "POST",
            &format!("/v1/tenants/{}/signup", Uuid::new_v4()),
            Some(json!({"user_data": {"username": "x", "password": "y"}})),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    assert_eq!(ctx.provisioner.row_count(tenant_id), 1);
}

#[tokio::test]
async fn test_login_failures_are_uniform() {
    let ctx = TestContext::new();
    let tenant_id = ctx.register_default("owner@example.com").await;
    ctx.send(
        "POST",
        &format!("/v1/tenants/{}/signup", tenant_id),
        Some(json!({"user_data": {"username": "newUser", "password": "newPassword"}})),
    )
    .await;

    let attempts = [
        (tenant_id, "username", "newUser", "wrongPassword"),
        (tenant_id, "username", "ghost", "newPassword"),
        (tenant_id, "nickname", "newUser", "newPassword"),
        (Uuid::new_v4(), "username", "newUser", "newPassword"),
    ];

    for (tenant, field, value, password) in attempts {
        let response = ctx
            .send(
                "POST",
                &format!("/v1/tenants/{}/login", tenant),
                Some(json!({
                    "primary_key_field": field,
                    "primary_key_value": value,
                    "password": password,
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{} {} {}", field, value, password);
        assert_eq!(response.body["error"], "unauthorized");
    }
}

#[tokio::test]
async fn test_incomplete_tenant_returns_503_until_repaired() {
    let ctx = TestContext::new();
    ctx.provisioner.fail_next_provision();

    let response = ctx
        .send(
            "POST",
            "/v1/tenants",
            Some(json!({
                "name": "Flaky",
                "email": "flaky@example.com",
                "schema": {"username": "text", "password": "text"},
                "primary_key_field": "username",
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body["retryable"], true);
    let tenant_id: Uuid = response.body["tenant_id"].as_str().unwrap().parse().unwrap();

    let signup = json!({"user_data": {"username": "alice", "password": "pw"}});
    let uri = format!("/v1/tenants/{}/signup", tenant_id);
    let response = ctx.send("POST", &uri, Some(signup.clone())).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);

    let response = ctx
        .send("POST", &format!("/v1/tenants/{}/provision", tenant_id), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "Tenant provisioned successfully");

    let response = ctx.send("POST", &uri, Some(signup)).await;
    assert_eq!(response.status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_provision_unknown_tenant() {
    let ctx = TestContext::new();

    let response = ctx
        .send("POST", &format!("/v1/tenants/{}/provision", Uuid::new_v4()), None)
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_storage_errors_are_masked() {
    let ctx = TestContext::new();
    ctx.identity.set_unavailable(true);

    let response = ctx
        .send(
            "POST",
            "/v1/tenants",
            Some(json!({
                "name": "Test",
                "email": "owner@example.com",
                "schema": {"username": "text", "password": "text"},
                "primary_key_field": "username",
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body["message"], "An internal error occurred");
}

#[tokio::test]
async fn test_invalid_tenant_id_in_path() {
    let ctx = TestContext::new();

    let response = ctx
        .send(
            "POST",
            "/v1/tenants/not-a-uuid/signup",
            Some(json!({"user_data": {"username": "x"}})),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_security_headers_on_api_responses() {
    let ctx = TestContext::new();

    let response = ctx.send("GET", "/health", None).await;
    assert_eq!(response.headers.get("X-Content-Type-Options").unwrap(), "nosniff");
    assert_eq!(response.headers.get("Cache-Control").unwrap(), "no-store");
    assert!(response.headers.get("Strict-Transport-Security").is_none());
}
