/// Common test utilities for API tests
///
/// Builds the full router over the in-memory stores and the plaintext
/// hasher, so the tests need no database or Redis.

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tenantgate_api::app::{build_router, AppState};
use tenantgate_api::config::{ApiConfig, Config, DatabaseConfig, EngineConfig, ThrottleConfig};
use tenantgate_shared::coordinator::TenantCoordinator;
use tenantgate_shared::credentials::CredentialService;
use tenantgate_shared::hashing::PlaintextHasher;
use tenantgate_shared::identity::MemoryIdentityStore;
use tenantgate_shared::provision::MemoryProvisioner;
use tower::Service as _;
use uuid::Uuid;

/// Configuration that never touches the environment
pub fn test_config() -> Config {
    Config {
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            production: false,
            request_timeout_secs: 10,
        },
        database: DatabaseConfig {
            url: "postgresql://unused".to_string(),
            tenant_url: "postgresql://unused".to_string(),
            max_connections: 1,
        },
        engine: EngineConfig {
            store_timeout_ms: 1000,
            password_hasher: "plaintext".to_string(),
        },
        throttle: ThrottleConfig {
            redis_url: None,
            login_attempts_per_minute: 10,
        },
    }
}

/// Response parts the tests look at
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Router plus handles on the stores behind it
pub struct TestContext {
    pub app: Router,
    pub identity: Arc<MemoryIdentityStore>,
    pub provisioner: Arc<MemoryProvisioner>,
}

impl TestContext {
    pub fn new() -> Self {
        let config = test_config();
        let identity = Arc::new(MemoryIdentityStore::new());
        let provisioner = Arc::new(MemoryProvisioner::new());

        let coordinator = TenantCoordinator::new(identity.clone(), provisioner.clone())
            .with_store_timeout(config.store_timeout());
        let credentials = CredentialService::new(identity.clone(), provisioner.clone(), Arc::new(PlaintextHasher))
            .with_store_timeout(config.store_timeout());

        let app = build_router(AppState::new(coordinator, credentials, None, config));

        TestContext {
            app,
            identity,
            provisioner,
        }
    }

    /// Sends one request; the body is parsed as JSON (`Null` when empty)
    pub async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self.app.clone().call(builder.body(body).unwrap()).await.unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse { status, headers, body }
    }

    /// Registers a tenant with a `username`/`password` schema
    pub async fn register_default(&self, email: &str) -> Uuid {
        self.register(email, json!({"username": "text", "password": "text"}), "username")
            .await
    }

    /// Registers a tenant and returns its id, panicking on failure
    pub async fn register(&self, email: &str, schema: Value, primary_key_field: &str) -> Uuid {
        let response = self
            .send(
                "POST",
                "/v1/tenants",
                Some(json!({
                    "name": "Test Client",
                    "phone": "1234567890",
                    "email": email,
                    "schema": schema,
                    "primary_key_field": primary_key_field,
                })),
            )
            .await;

        assert_eq!(response.status, StatusCode::CREATED, "register failed: {}", response.body);
        response.body["tenant_id"].as_str().unwrap().parse().unwrap()
    }
}
