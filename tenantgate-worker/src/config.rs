/// Worker configuration
///
/// # Environment Variables
///
/// - `DATABASE_URL`: Identity store URL (required)
/// - `TENANT_DATABASE_URL`: Tenant store URL (default: `DATABASE_URL`)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size per store (default: 5)
/// - `STORE_TIMEOUT_MS`: Deadline for a single store call (default: 5000)
/// - `REPAIR_POLL_INTERVAL_SECS`: Pause between passes (default: 30)
/// - `REPAIR_BATCH_SIZE`: Tenants per pass (default: 20)
/// - `REPAIR_STALE_AFTER_SECS`: Age at which `pending` tenants are repaired (default: 60)
/// - `REPAIR_MAX_CONCURRENCY`: Concurrent repairs (default: 4)
/// - `RUST_LOG`: Log filter (default: tenantgate_worker=debug)

use crate::repair::RepairConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Complete worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub tenant_database_url: String,
    pub max_connections: u32,
    pub store_timeout: Duration,
    pub repair: RepairConfig,
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", name, raw, e)),
        _ => Ok(default),
    }
}

impl WorkerConfig {
    /// Loads configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;
        let tenant_database_url = env::var("TENANT_DATABASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| database_url.clone());

        let defaults = RepairConfig::default();
        let config = WorkerConfig {
            database_url,
            tenant_database_url,
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5)?,
            store_timeout: Duration::from_millis(parse_var("STORE_TIMEOUT_MS", 5000)?),
            repair: RepairConfig {
                poll_interval: Duration::from_secs(parse_var(
                    "REPAIR_POLL_INTERVAL_SECS",
                    defaults.poll_interval.as_secs(),
                )?),
                batch_size: parse_var("REPAIR_BATCH_SIZE", defaults.batch_size)?,
                stale_after: Duration::from_secs(parse_var(
                    "REPAIR_STALE_AFTER_SECS",
                    defaults.stale_after.as_secs(),
                )?),
                max_concurrency: parse_var("REPAIR_MAX_CONCURRENCY", defaults.max_concurrency)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.repair.batch_size == 0 {
            anyhow::bail!("REPAIR_BATCH_SIZE must be greater than zero");
        }
        if self.repair.max_concurrency == 0 {
            anyhow::bail!("REPAIR_MAX_CONCURRENCY must be greater than zero");
        }
        if self.repair.poll_interval.is_zero() {
            anyhow::bail!("REPAIR_POLL_INTERVAL_SECS must be greater than zero");
        }
        if self.store_timeout.is_zero() {
            anyhow::bail!("STORE_TIMEOUT_MS must be greater than zero");
        }
        Ok(())
    }
}
