/// Identity store: tenant metadata
///
/// One record per tenant holding contact details, the validated user-record
/// schema and the provisioning marker used by the repair path.
///
/// The store sits behind the [`IdentityStore`] trait:
///
/// - `postgres`: `tenants` table created by the workspace migrations
/// - `memory`: process-local store for tests
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tenants (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(255) NOT NULL,
///     phone VARCHAR(64) NOT NULL DEFAULT '',
///     email VARCHAR(320) NOT NULL,
///     user_schema JSONB NOT NULL,
///     primary_key_field VARCHAR(63) NOT NULL,
///     secret_field VARCHAR(63),
///     provisioning_state VARCHAR(32) NOT NULL DEFAULT 'pending',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT tenants_email_key UNIQUE (email)
/// );
/// ```

pub mod memory;
pub mod postgres;

pub use memory::MemoryIdentityStore;
pub use postgres::PgIdentityStore;

use crate::error::TenantResult;
use crate::schema::ValidatedSchema;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Where a tenant is in the registration state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisioningState {
    /// Identity written, namespace not confirmed yet
    Pending,

    /// Namespace provisioned; signup and login are served
    Active,

    /// Provisioning failed; waiting for repair
    Incomplete,
}

impl ProvisioningState {
    /// Converts state to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningState::Pending => "pending",
            ProvisioningState::Active => "active",
            ProvisioningState::Incomplete => "incomplete",
        }
    }

    /// Parses state from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProvisioningState::Pending),
            "active" => Some(ProvisioningState::Active),
            "incomplete" => Some(ProvisioningState::Incomplete),
            _ => None,
        }
    }
}

/// A registered tenant
#[derive(Debug, Clone)]
pub struct Tenant {
    /// Generated by the store on insert; never reused
    pub id: Uuid,

    pub name: String,

    pub phone: String,

    /// Normalised (trimmed, lower-case); unique across tenants
    pub email: String,

    /// Declared user-record schema
    pub schema: ValidatedSchema,

    pub provisioning_state: ProvisioningState,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Whether signup and login may be served for this tenant
    pub fn is_active(&self) -> bool {
        self.provisioning_state == ProvisioningState::Active
    }
}

/// Input for registering a tenant
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub schema: ValidatedSchema,
}

/// Tenant metadata store
///
/// Implementations must be safe for concurrent use by many in-flight
/// requests and must enforce email uniqueness themselves.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Inserts a tenant in the `pending` state and returns it with its new id
    ///
    /// Fails with `DuplicateTenant` when the email is taken.
    async fn insert(&self, tenant: NewTenant) -> TenantResult<Tenant>;

    async fn find_by_id(&self, id: Uuid) -> TenantResult<Option<Tenant>>;

    async fn find_by_email(&self, email: &str) -> TenantResult<Option<Tenant>>;

    /// Moves a tenant to `state`; returns false if the tenant does not exist
    async fn set_provisioning_state(&self, id: Uuid, state: ProvisioningState) -> TenantResult<bool>;

    /// Tenants needing repair: `incomplete`, or `pending` for longer than `stale_after`
    ///
    /// Ordered by last update, oldest first.
    async fn list_unprovisioned(&self, limit: usize, stale_after: Duration) -> TenantResult<Vec<Tenant>>;

    /// Cheap connectivity probe
    async fn ping(&self) -> TenantResult<()>;
}

/// Normalises an email for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
