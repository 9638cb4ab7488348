/// Repair worker
///
/// Background loop that finishes registrations the API could not complete.
/// A tenant whose identity row was written but whose namespace was not
/// provisioned is left `incomplete` (or `pending`, if the process died
/// mid-registration). Each pass lists such tenants and calls
/// `TenantCoordinator::repair` on them.
///
/// # Architecture
///
/// ```text
/// RepairWorker
///   ├─> TenantCoordinator::unprovisioned: incomplete + stale pending, one batch
///   └─> TenantCoordinator::repair: per tenant, at most `max_concurrency` at once
/// ```
///
/// Failures are logged and left for the next pass; `repair` is idempotent.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tenantgate_worker::repair::{RepairConfig, RepairWorker};
/// use tenantgate_shared::coordinator::TenantCoordinator;
///
/// # async fn example(coordinator: Arc<TenantCoordinator>) -> anyhow::Result<()> {
/// let worker = RepairWorker::new(coordinator, RepairConfig::default());
///
/// let token = worker.shutdown_token();
/// tokio::spawn(async move {
///     tokio::signal::ctrl_c().await.ok();
///     token.cancel();
/// });
///
/// worker.run().await?;
/// # Ok(())
/// # }
/// ```

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tenantgate_shared::coordinator::TenantCoordinator;
use tenantgate_shared::TenantResult;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Repair worker configuration
#[derive(Debug, Clone)]
pub struct RepairConfig {
    /// Pause between passes
    pub poll_interval: Duration,

    /// Maximum tenants examined per pass
    pub batch_size: usize,

    /// Age after which a `pending` tenant is considered abandoned
    pub stale_after: Duration,

    /// Maximum concurrent repairs
    pub max_concurrency: usize,
}

impl Default for RepairConfig {
    fn default() -> Self {
        RepairConfig {
            poll_interval: Duration::from_secs(30),
            batch_size: 20,
            stale_after: Duration::from_secs(60),
            max_concurrency: 4,
        }
    }
}

/// Outcome of one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairSummary {
    /// Tenants now active
    pub repaired: usize,

    /// Tenants whose repair failed this pass
    pub failed: usize,

    /// Ids of the failed tenants
    pub failed_tenants: Vec<Uuid>,
}

impl RepairSummary {
    pub fn attempted(&self) -> usize {
        self.repaired + self.failed
    }
}

/// Repair worker
pub struct RepairWorker {
    coordinator: Arc<TenantCoordinator>,
    config: RepairConfig,
    shutdown_token: CancellationToken,
}

impl RepairWorker {
    pub fn new(coordinator: Arc<TenantCoordinator>, config: RepairConfig) -> Self {
        RepairWorker {
            coordinator,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &RepairConfig {
        &self.config
    }

    /// Token that stops [`RepairWorker::run`] when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Runs passes until shutdown
    ///
    /// A failing pass (e.g. identity store down) is logged and retried after
    /// the poll interval; it does not stop the loop.
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            max_concurrency = self.config.max_concurrency,
            "Repair worker starting"
        );

        loop {
            if self.shutdown_token.is_cancelled() {
                break;
            }

            match self.run_once().await {
                Ok(summary) if summary.attempted() > 0 => {
                    tracing::info!(
                        repaired = summary.repaired,
                        failed = summary.failed,
                        "Repair pass finished"
                    );
                }
                Ok(_) => tracing::debug!("Repair pass found nothing to do"),
                Err(e) => tracing::error!(error = %e, "Repair pass failed"),
            }

            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        tracing::info!("Repair worker shut down");
        Ok(())
    }

    /// Runs a single pass over one batch
    ///
    /// # Errors
    ///
    /// Returns the store error if the batch could not be listed. Per-tenant
    /// failures are counted in the summary instead.
    pub async fn run_once(&self) -> TenantResult<RepairSummary> {
        let tenants = self
            .coordinator
            .unprovisioned(self.config.batch_size, self.config.stale_after)
            .await?;

        if tenants.is_empty() {
            return Ok(RepairSummary::default());
        }

        tracing::debug!(count = tenants.len(), "Repairing tenants");

        let coordinator = &self.coordinator;
        let shutdown = &self.shutdown_token;
        let results: Vec<(Uuid, Option<TenantResult<()>>)> = stream::iter(tenants)
            .map(|tenant| async move {
                // Tenants not started before shutdown are left for the next run
                if shutdown.is_cancelled() {
                    return (tenant.id, None);
                }
                (tenant.id, Some(coordinator.repair(tenant.id).await))
            })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let mut summary = RepairSummary::default();
        for (tenant_id, result) in results {
            match result {
                Some(Ok(())) => {
                    tracing::info!(tenant_id = %tenant_id, "Tenant repaired");
                    summary.repaired += 1;
                }
                Some(Err(e)) => {
                    if e.is_retryable() {
                        tracing::warn!(tenant_id = %tenant_id, error = %e, "Tenant repair failed; will retry");
                    } else {
                        tracing::error!(tenant_id = %tenant_id, error = %e, "Tenant repair failed");
                    }
                    summary.failed += 1;
                    summary.failed_tenants.push(tenant_id);
                }
                None => {}
            }
        }

        Ok(summary)
    }
}
