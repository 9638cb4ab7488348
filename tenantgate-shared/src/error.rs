/// Error taxonomy for tenant provisioning and credential operations
///
/// Every fallible operation in the engine returns `TenantResult<T>`. The
/// variants fall into two groups:
///
/// - **Caller errors** (`InvalidSchema`, `UnknownField`, `MissingField`,
///   `InvalidFieldValue`, `PrimaryKeyMismatch`, `DuplicateTenant`,
///   `DuplicateUser`, `UnknownTenant`, `SchemaConflict`, `InvalidCredentials`)
///   are returned immediately and never retried.
/// - **Store failures** (`Storage`, `Provisioning`, `ProvisioningIncomplete`)
///   are retryable. Nothing in this crate retries them internally.
///
/// # Example
///
/// ```
/// use tenantgate_shared::error::TenantError;
///
/// let err = TenantError::Storage("connection reset".to_string());
/// assert!(err.is_retryable());
///
/// let err = TenantError::UnknownField("nickname".to_string());
/// assert!(!err.is_retryable());
/// ```

use uuid::Uuid;

/// Result alias used throughout the engine
pub type TenantResult<T> = Result<T, TenantError>;

/// Errors raised by the provisioning and credential engine
#[derive(Debug, thiserror::Error)]
pub enum TenantError {
    /// Tenant-declared schema failed validation
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// A tenant with this email is already registered
    #[error("A tenant with email {0} already exists")]
    DuplicateTenant(String),

    /// No tenant with this id exists
    #[error("Unknown tenant: {0}")]
    UnknownTenant(Uuid),

    /// No tenant is registered under this email
    #[error("No tenant registered for {0}")]
    UnknownEmail(String),

    /// Namespace exists with a shape different from the declared schema
    #[error("Namespace for tenant {tenant_id} does not match the declared schema")]
    SchemaConflict { tenant_id: Uuid },

    /// Relational store failed while creating a namespace
    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    /// Identity exists but its namespace is not usable yet
    #[error("Provisioning incomplete for tenant {tenant_id}: {reason}")]
    ProvisioningIncomplete { tenant_id: Uuid, reason: String },

    /// Field is not part of the tenant's schema
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Required field was not supplied
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Value cannot be converted to the declared column type
    #[error("Invalid value for field {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },

    /// Caller named a primary-key field other than the tenant's
    #[error("Primary key field {0} does not match the tenant's primary key")]
    PrimaryKeyMismatch(String),

    /// Primary-key value already taken within the tenant's namespace
    #[error("User already exists")]
    DuplicateUser,

    /// Login failed; deliberately carries no detail
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Transient I/O failure in either store (including deadline expiry)
    #[error("Storage error: {0}")]
    Storage(String),
}

impl TenantError {
    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TenantError::Storage(_)
                | TenantError::Provisioning(_)
                | TenantError::ProvisioningIncomplete { .. }
        )
    }

    /// Tenant id carried by the error, if any
    pub fn tenant_id(&self) -> Option<Uuid> {
        match self {
            TenantError::UnknownTenant(id)
            | TenantError::SchemaConflict { tenant_id: id }
            | TenantError::ProvisioningIncomplete { tenant_id: id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// PostgreSQL SQLSTATE for unique_violation
pub(crate) const UNIQUE_VIOLATION: &str = "23505";

/// Returns the SQLSTATE code of a database error, if the error came from the server
pub(crate) fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    }
}
