//! # TenantGate Worker
//!
//! Periodically repairs tenants left `incomplete` (or abandoned in
//! `pending`) by registration, by re-running namespace provisioning.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/tenantgate cargo run -p tenantgate-worker
//! ```

use anyhow::Context;
use std::sync::Arc;
use tenantgate_shared::{
    coordinator::TenantCoordinator,
    db::{
        migrations::run_migrations,
        pool::{DatabaseConfig, StorePools},
    },
    identity::PgIdentityStore,
    provision::PgProvisioner,
};
use tenantgate_worker::{config::WorkerConfig, repair::RepairWorker};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tenantgate_worker=debug,tenantgate_shared=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("TenantGate Worker v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = WorkerConfig::from_env()?;

    let pools = StorePools::connect(
        DatabaseConfig::with_url(config.database_url.clone()).sized(config.max_connections),
        DatabaseConfig::with_url(config.tenant_database_url.clone()).sized(config.max_connections),
    )
    .await?;
    run_migrations(&pools.identity)
        .await
        .context("Failed to run migrations")?;

    let coordinator = TenantCoordinator::new(
        Arc::new(PgIdentityStore::new(pools.identity.clone())),
        Arc::new(PgProvisioner::new(pools.tenant.clone())),
    )
    .with_store_timeout(config.store_timeout);

    let worker = RepairWorker::new(Arc::new(coordinator), config.repair.clone());

    let shutdown = worker.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        tracing::info!("Shutdown signal received");
        shutdown.cancel();
    });

    tracing::info!("Worker ready");
    worker.run().await?;

    pools.close().await;

    Ok(())
}
