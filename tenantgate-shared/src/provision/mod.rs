/// Relational provisioning and per-tenant statement execution
///
/// A [`Provisioner`] owns the relational store that holds tenant namespaces.
/// It creates a namespace from a validated schema and executes the statements
/// built by [`crate::query`].
///
/// Backends:
///
/// - `postgres`: one Postgres schema per tenant, `users` table inside it
/// - `memory`: process-local tables keyed by namespace, for tests
///
/// # Idempotency
///
/// `provision` may be called any number of times for the same tenant. A
/// namespace that already exists with exactly the declared columns counts as
/// success; one that exists with a different shape is a `SchemaConflict`.

pub mod memory;
pub mod postgres;

pub use memory::MemoryProvisioner;
pub use postgres::PgProvisioner;

use crate::error::TenantResult;
use crate::query::{Namespace, Statement, UserRecord};
use crate::schema::ValidatedSchema;
use async_trait::async_trait;

#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Creates the namespace and its user table if they do not exist
    ///
    /// # Errors
    ///
    /// - `SchemaConflict` if the namespace exists with different columns
    /// - `Provisioning` for any other store failure
    async fn provision(&self, namespace: &Namespace, schema: &ValidatedSchema) -> TenantResult<()>;

    /// Executes a write statement and returns the number of affected rows
    ///
    /// A primary-key collision is reported as `DuplicateUser`.
    async fn execute(&self, statement: &Statement) -> TenantResult<u64>;

    /// Executes a lookup and returns the first row, if any
    ///
    /// NULL columns come back as empty strings.
    async fn fetch_optional(&self, statement: &Statement) -> TenantResult<Option<UserRecord>>;

    /// Cheap connectivity probe
    async fn ping(&self) -> TenantResult<()>;
}
