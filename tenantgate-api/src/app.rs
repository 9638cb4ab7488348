/// Application state and router builder
///
/// Defines the shared application state and builds the Axum router with all
/// routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tenantgate_api::{app::{build_router, AppState}, config::Config};
/// use tenantgate_shared::coordinator::TenantCoordinator;
/// use tenantgate_shared::credentials::CredentialService;
/// use tenantgate_shared::hashing::Argon2Hasher;
/// use tenantgate_shared::identity::MemoryIdentityStore;
/// use tenantgate_shared::provision::MemoryProvisioner;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let identity = Arc::new(MemoryIdentityStore::new());
/// let provisioner = Arc::new(MemoryProvisioner::new());
/// let coordinator = TenantCoordinator::new(identity.clone(), provisioner.clone());
/// let credentials = CredentialService::new(identity, provisioner, Arc::new(Argon2Hasher::default()));
///
/// let app = build_router(AppState::new(coordinator, credentials, None, config));
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    middleware::{rate_limit::LoginThrottle, security::SecurityHeadersLayer},
};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tenantgate_shared::{coordinator::TenantCoordinator, credentials::CredentialService};
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Registration, lookup and repair
    pub coordinator: Arc<TenantCoordinator>,

    /// Signup and login
    pub credentials: Arc<CredentialService>,

    /// Login throttle; `None` when Redis is not configured
    pub throttle: Option<LoginThrottle>,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates new application state
    pub fn new(
        coordinator: TenantCoordinator,
        credentials: CredentialService,
        throttle: Option<LoginThrottle>,
        config: Config,
    ) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            credentials: Arc::new(credentials),
            throttle,
            config: Arc::new(config),
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET /health
/// └── /v1/tenants
///     ├── POST /                       # RegisterTenant
///     ├── GET  /lookup?email=          # GetTenantID
///     └── /:tenant_id
///         ├── POST /signup
///         ├── POST /login              # throttled when Redis is configured
///         └── POST /provision          # repair
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Request timeout (tower-http TimeoutLayer, 408 on expiry)
/// 2. Logging (tower-http TraceLayer)
/// 3. CORS (tower-http CorsLayer)
/// 4. Security headers
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let tenant_routes = Router::new()
        .route("/", post(routes::tenants::register))
        .route("/lookup", get(routes::tenants::lookup))
        .route("/:tenant_id/signup", post(routes::users::signup))
        .route("/:tenant_id/login", post(routes::users::login))
        .route("/:tenant_id/provision", post(routes::tenants::provision));

    let v1_routes = Router::new().nest("/tenants", tenant_routes);

    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
            .max_age(std::time::Duration::from_secs(3600))
    };

    let request_timeout = state.config.request_timeout();
    let production = state.config.api.production;

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(production))
        .with_state(state)
}
