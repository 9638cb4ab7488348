/// Configuration management for the API server
///
/// Loads configuration from environment variables (and `.env` when present)
/// into a type-safe struct.
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `DATABASE_URL`: PostgreSQL URL of the identity store (required)
/// - `TENANT_DATABASE_URL`: PostgreSQL URL of the tenant store (default: `DATABASE_URL`)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size per store (default: 10)
/// - `STORE_TIMEOUT_MS`: Deadline for a single store call (default: 5000)
/// - `REQUEST_TIMEOUT_SECS`: Deadline for a whole HTTP request (default: 30)
/// - `PASSWORD_HASHER`: `argon2` or `plaintext` (default: argon2)
/// - `REDIS_URL`: Enables login throttling when set
/// - `LOGIN_ATTEMPTS_PER_MINUTE`: Login attempts per user per minute (default: 10)
/// - `CORS_ORIGINS`: Comma-separated origins, `*` for any (default: *)
/// - `PRODUCTION`: Enables HSTS (default: false)
/// - `RUST_LOG`: Log filter (default: tenantgate_api=debug,tower_http=debug)
///
/// # Example
///
/// ```no_run
/// use tenantgate_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tenantgate_shared::hashing::hasher_from_name;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Engine behaviour
    pub engine: EngineConfig,

    /// Login throttling
    pub throttle: ThrottleConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,

    /// Production mode (HSTS on)
    pub production: bool,

    /// Whole-request deadline in seconds
    pub request_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Identity store URL
    pub url: String,

    /// Tenant (relational) store URL
    pub tenant_url: String,

    /// Maximum number of connections per pool
    pub max_connections: u32,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deadline for one store call in milliseconds
    pub store_timeout_ms: u64,

    /// Secret hashing policy name
    pub password_hasher: String,
}

/// Login throttling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Redis URL; throttling is off when absent
    pub redis_url: Option<String>,

    /// Attempts allowed per tenant and primary-key value per minute
    pub login_attempts_per_minute: u32,
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

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is missing or any variable has an
    /// invalid value.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;
        let tenant_url = env::var("TENANT_DATABASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| database_url.clone());

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let password_hasher = env::var("PASSWORD_HASHER").unwrap_or_else(|_| "argon2".to_string());

        let config = Self {
            api: ApiConfig {
                host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("API_PORT", 8080)?,
                cors_origins,
                production: parse_var("PRODUCTION", false)?,
                request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", 30)?,
            },
            database: DatabaseConfig {
                url: database_url,
                tenant_url,
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            engine: EngineConfig {
                store_timeout_ms: parse_var("STORE_TIMEOUT_MS", 5000)?,
                password_hasher,
            },
            throttle: ThrottleConfig {
                redis_url: env::var("REDIS_URL").ok().filter(|s| !s.trim().is_empty()),
                login_attempts_per_minute: parse_var("LOGIN_ATTEMPTS_PER_MINUTE", 10)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints
    pub fn validate(&self) -> anyhow::Result<()> {
        if hasher_from_name(&self.engine.password_hasher).is_none() {
            anyhow::bail!(
                "PASSWORD_HASHER must be 'argon2' or 'plaintext' (got '{}')",
                self.engine.password_hasher
            );
        }
        if self.engine.store_timeout_ms == 0 {
            anyhow::bail!("STORE_TIMEOUT_MS must be greater than zero");
        }
        if self.api.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }
        if self.throttle.login_attempts_per_minute == 0 {
            anyhow::bail!("LOGIN_ATTEMPTS_PER_MINUTE must be greater than zero");
        }
        Ok(())
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.store_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }
}
