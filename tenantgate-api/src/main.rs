//! # TenantGate API Server
//!
//! HTTP front end of the TenantGate engine: tenant registration and lookup,
//! per-tenant signup and login, and manual repair of half-provisioned
//! tenants.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/tenantgate cargo run -p tenantgate-api
//! ```

use anyhow::Context;
use std::sync::Arc;
use tenantgate_api::{
    app::{build_router, AppState},
    config::Config,
    middleware::rate_limit::LoginThrottle,
};
use tenantgate_shared::{
    coordinator::TenantCoordinator,
    credentials::CredentialService,
    db::{
        migrations::run_migrations,
        pool::{DatabaseConfig, StorePools},
    },
    hashing::{hasher_from_name, SecretHasher},
    identity::PgIdentityStore,
    provision::PgProvisioner,
    redis::{RedisClient, RedisConfig},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tenantgate_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("TenantGate API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let max_connections = config.database.max_connections;
    let pools = StorePools::connect(
        DatabaseConfig::with_url(config.database.url.clone()).sized(max_connections),
        DatabaseConfig::with_url(config.database.tenant_url.clone()).sized(max_connections),
    )
    .await?;
    run_migrations(&pools.identity)
        .await
        .context("Failed to run migrations")?;

    let hasher = hasher_from_name(&config.engine.password_hasher)
        .with_context(|| format!("Unknown password hasher '{}'", config.engine.password_hasher))?;
    if hasher.name() == "plaintext" {
        tracing::warn!("PASSWORD_HASHER=plaintext stores secrets unhashed; use only for development");
    }

    let identity = Arc::new(PgIdentityStore::new(pools.identity.clone()));
    let provisioner = Arc::new(PgProvisioner::new(pools.tenant.clone()));
    let store_timeout = config.store_timeout();

    let coordinator = TenantCoordinator::new(identity.clone(), provisioner.clone())
        .with_store_timeout(store_timeout);
    let credentials = CredentialService::new(identity, provisioner, Arc::from(hasher))
        .with_store_timeout(store_timeout);

    let throttle = match &config.throttle.redis_url {
        Some(url) => match RedisClient::connect(RedisConfig::new(url.clone())).await {
            Ok(client) => Some(LoginThrottle::new(client, config.throttle.login_attempts_per_minute)),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable; login throttling disabled");
                None
            }
        },
        None => {
            tracing::info!("REDIS_URL not set; login throttling disabled");
            None
        }
    };

    let bind_address = config.bind_address();
    let app = build_router(AppState::new(coordinator, credentials, throttle, config));

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutting down, closing database pools");
    pools.close().await;

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
