/// Tenant provisioning coordinator
///
/// Registers a tenant in the identity store and provisions its namespace in
/// the relational store as one logical operation. The two stores fail
/// independently, so a registration can end in one of three places:
///
/// ```text
/// Validating ──(InvalidSchema)──▶ Rejected
///     │
///     ▼
/// IdentityWritten ──(provision fails)──▶ Inconsistent
///     │
///     ▼
/// NamespaceProvisioned
/// ```
///
/// `Inconsistent` is visible to callers as the retryable
/// `ProvisioningIncomplete` error and to the repair worker through the
/// tenant's `incomplete` (or stale `pending`) provisioning state. The
/// coordinator never retries on its own.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tenantgate_shared::coordinator::{RegisterTenant, TenantCoordinator};
/// use tenantgate_shared::identity::MemoryIdentityStore;
/// use tenantgate_shared::provision::MemoryProvisioner;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let coordinator = TenantCoordinator::new(
///     Arc::new(MemoryIdentityStore::new()),
///     Arc::new(MemoryProvisioner::new()),
/// );
///
/// let tenant_id = coordinator
///     .register_tenant(RegisterTenant {
///         name: "Acme".to_string(),
///         phone: "1234567890".to_string(),
///         email: "ops@acme.test".to_string(),
///         schema: [("username", "text"), ("password", "text")].into_iter().collect(),
///         primary_key_field: "username".to_string(),
///         secret_field: None,
///     })
///     .await?;
///
/// assert_eq!(coordinator.get_tenant_id("OPS@acme.test").await?, tenant_id);
/// # Ok(())
/// # }
/// ```

use crate::deadline::{bounded, DEFAULT_STORE_TIMEOUT};
use crate::error::{TenantError, TenantResult};
use crate::identity::{IdentityStore, NewTenant, ProvisioningState, Tenant};
use crate::provision::Provisioner;
use crate::query::Namespace;
use crate::schema::{SchemaDefinition, ValidatedSchema};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Input for [`TenantCoordinator::register_tenant`]
#[derive(Debug, Clone)]
pub struct RegisterTenant {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub schema: SchemaDefinition,
    pub primary_key_field: String,
    pub secret_field: Option<String>,
}

/// Steps of one registration attempt, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Validating,
    Rejected,
    IdentityWritten,
    NamespaceProvisioned,
    Inconsistent,
}

impl RegistrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationState::Validating => "validating",
            RegistrationState::Rejected => "rejected",
            RegistrationState::IdentityWritten => "identity_written",
            RegistrationState::NamespaceProvisioned => "namespace_provisioned",
            RegistrationState::Inconsistent => "inconsistent",
        }
    }
}

pub struct TenantCoordinator {
    identity: Arc<dyn IdentityStore>,
    provisioner: Arc<dyn Provisioner>,
    store_timeout: Duration,
}

impl TenantCoordinator {
    pub fn new(identity: Arc<dyn IdentityStore>, provisioner: Arc<dyn Provisioner>) -> Self {
        TenantCoordinator {
            identity,
            provisioner,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Sets the deadline applied to every store call
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn identity(&self) -> &Arc<dyn IdentityStore> {
        &self.identity
    }

    pub fn provisioner(&self) -> &Arc<dyn Provisioner> {
        &self.provisioner
    }

    /// Registers a tenant and provisions its namespace
    ///
    /// # Errors
    ///
    /// - `InvalidSchema`: nothing was written
    /// - `DuplicateTenant`: the email is already registered
    /// - `ProvisioningIncomplete`: the identity exists but its namespace
    ///   does not; the carried tenant id can be repaired later
    /// - `Storage`: the identity write failed or timed out
    pub async fn register_tenant(&self, request: RegisterTenant) -> TenantResult<Uuid> {
        log_transition(None, RegistrationState::Validating);

        let schema = match ValidatedSchema::validate(
            &request.schema,
            &request.primary_key_field,
            request.secret_field.as_deref(),
        ) {
            Ok(schema) => schema,
            Err(e) => {
                log_transition(None, RegistrationState::Rejected);
                return Err(e);
            }
        };

        let tenant = bounded(
            self.store_timeout,
            "identity.insert",
            self.identity.insert(NewTenant {
                name: request.name,
                phone: request.phone,
                email: request.email,
                schema,
            }),
        )
        .await?;
        log_transition(Some(tenant.id), RegistrationState::IdentityWritten);

        let namespace = Namespace::for_tenant(tenant.id);
        if let Err(e) = bounded(
            self.store_timeout,
            "tenant_store.provision",
            self.provisioner.provision(&namespace, &tenant.schema),
        )
        .await
        {
            log_transition(Some(tenant.id), RegistrationState::Inconsistent);
            warn!(tenant_id = %tenant.id, error = %e, "Namespace provisioning failed");
            self.mark_incomplete(tenant.id).await;
            return Err(TenantError::ProvisioningIncomplete {
                tenant_id: tenant.id,
                reason: e.to_string(),
            });
        }

        if let Err(e) = self.activate(tenant.id).await {
            log_transition(Some(tenant.id), RegistrationState::Inconsistent);
            return Err(TenantError::ProvisioningIncomplete {
                tenant_id: tenant.id,
                reason: e.to_string(),
            });
        }

        log_transition(Some(tenant.id), RegistrationState::NamespaceProvisioned);
        info!(tenant_id = %tenant.id, namespace = namespace.schema_name(), "Tenant registered");
        Ok(tenant.id)
    }

    /// Resolves a tenant id from its registration email
    pub async fn get_tenant_id(&self, email: &str) -> TenantResult<Uuid> {
        bounded(
            self.store_timeout,
            "identity.find_by_email",
            self.identity.find_by_email(email),
        )
        .await?
        .map(|tenant| tenant.id)
        .ok_or_else(|| TenantError::UnknownEmail(email.trim().to_lowercase()))
    }

    /// Loads a tenant by id
    pub async fn find_tenant(&self, tenant_id: Uuid) -> TenantResult<Tenant> {
        bounded(
            self.store_timeout,
            "identity.find_by_id",
            self.identity.find_by_id(tenant_id),
        )
        .await?
        .ok_or(TenantError::UnknownTenant(tenant_id))
    }

    /// Re-runs provisioning for a tenant and marks it active
    ///
    /// Safe to call for tenants that are already active; provisioning is
    /// idempotent and the state write is a no-op in effect. A failed attempt
    /// on an unprovisioned tenant refreshes its `incomplete` marker, so a
    /// tenant that keeps failing does not hold the head of the repair queue.
    pub async fn repair(&self, tenant_id: Uuid) -> TenantResult<()> {
        let tenant = self.find_tenant(tenant_id).await?;
        let namespace = Namespace::for_tenant(tenant.id);

        if let Err(e) = bounded(
            self.store_timeout,
            "tenant_store.provision",
            self.provisioner.provision(&namespace, &tenant.schema),
        )
        .await
        {
            warn!(tenant_id = %tenant_id, error = %e, "Repair provisioning failed");
            // Rewriting the state also moves the tenant to the back of the repair queue
            if !tenant.is_active() {
                self.mark_incomplete(tenant_id).await;
            }
            return Err(e);
        }

        if !tenant.is_active() {
            self.activate(tenant_id).await?;
        }

        info!(tenant_id = %tenant_id, "Tenant namespace repaired");
        Ok(())
    }

    /// Tenants the repair worker should look at
    pub async fn unprovisioned(&self, limit: usize, stale_after: Duration) -> TenantResult<Vec<Tenant>> {
        bounded(
            self.store_timeout,
            "identity.list_unprovisioned",
            self.identity.list_unprovisioned(limit, stale_after),
        )
        .await
    }

    async fn activate(&self, tenant_id: Uuid) -> TenantResult<()> {
        let updated = bounded(
            self.store_timeout,
            "identity.set_provisioning_state",
            self.identity
                .set_provisioning_state(tenant_id, ProvisioningState::Active),
        )
        .await?;

        if updated {
            Ok(())
        } else {
            Err(TenantError::UnknownTenant(tenant_id))
        }
    }

    /// Best effort; a tenant left `pending` is still found by repair once stale
    async fn mark_incomplete(&self, tenant_id: Uuid) {
        let result = bounded(
            self.store_timeout,
            "identity.set_provisioning_state",
            self.identity
                .set_provisioning_state(tenant_id, ProvisioningState::Incomplete),
        )
        .await;

        if let Err(e) = result {
            warn!(tenant_id = %tenant_id, error = %e, "Could not mark tenant incomplete");
        }
    }
}

fn log_transition(tenant_id: Option<Uuid>, state: RegistrationState) {
    match tenant_id {
        Some(id) => debug!(tenant_id = %id, state = state.as_str(), "Registration state"),
        None => debug!(state = state.as_str(), "Registration state"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MemoryIdentityStore;
    use crate::provision::MemoryProvisioner;
    use crate::schema::ColumnType;

    fn request(email: &str) -> RegisterTenant {
        RegisterTenant {
            name: "Acme".to_string(),
            phone: "1234567890".to_string(),
            email: email.to_string(),
            schema: [("username", "text"), ("password", "text"), ("age", "int")]
                .into_iter()
                .collect(),
            primary_key_field: "username".to_string(),
            secret_field: None,
        }
    }

    fn setup() -> (Arc<MemoryIdentityStore>, Arc<MemoryProvisioner>, TenantCoordinator) {
        let identity = Arc::new(MemoryIdentityStore::new());
        let provisioner = Arc::new(MemoryProvisioner::new());
        let coordinator = TenantCoordinator::new(identity.clone(), provisioner.clone());
        (identity, provisioner, coordinator)
    }

    #[test]
    fn test_registration_state_names() {
        assert_eq!(RegistrationState::Inconsistent.as_str(), "inconsistent");
        assert_eq!(RegistrationState::NamespaceProvisioned.as_str(), "namespace_provisioned");
    }

    #[tokio::test]
    async fn test_register_provisions_namespace() {
        let (identity, provisioner, coordinator) = setup();
        let tenant_id = coordinator.register_tenant(request("ops@acme.test")).await.unwrap();

        let tenant = identity.find_by_id(tenant_id).await.unwrap().unwrap();
        assert!(tenant.is_active());

        let columns = provisioner.columns(tenant_id).unwrap();
        assert_eq!(
            columns,
            vec![
                ("username".to_string(), ColumnType::Text),
                ("password".to_string(), ColumnType::Text),
                ("age".to_string(), ColumnType::Integer),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_schema_writes_nothing() {
        let (identity, provisioner, coordinator) = setup();
        let mut req = request("ops@acme.test");
        req.primary_key_field = "email".to_string();

        let result = coordinator.register_tenant(req).await;
        assert!(matches!(result, Err(TenantError::InvalidSchema(_))));
        assert_eq!(identity.operations(), 0);
        assert_eq!(provisioner.operations(), 0);
    }

    #[tokio::test]
    async fn test_provision_failure_is_inconsistent() {
        let (identity, provisioner, coordinator) = setup();
        provisioner.fail_next_provision();

        let tenant_id = match coordinator.register_tenant(request("ops@acme.test")).await {
            Err(TenantError::ProvisioningIncomplete { tenant_id, .. }) => tenant_id,
            other => panic!("expected ProvisioningIncomplete, got {:?}", other),
        };

        let tenant = identity.find_by_id(tenant_id).await.unwrap().unwrap();
        assert_eq!(tenant.provisioning_state, ProvisioningState::Incomplete);
        assert!(provisioner.columns(tenant_id).is_none());

        coordinator.repair(tenant_id).await.unwrap();
        let tenant = identity.find_by_id(tenant_id).await.unwrap().unwrap();
        assert!(tenant.is_active());
        assert!(provisioner.columns(tenant_id).is_some());
    }

    #[tokio::test]
    async fn test_get_tenant_id() {
        let (_, _, coordinator) = setup();
        let tenant_id = coordinator.register_tenant(request("Ops@Acme.test")).await.unwrap();

        assert_eq!(coordinator.get_tenant_id(" ops@acme.test ").await.unwrap(), tenant_id);
        assert!(matches!(
            coordinator.get_tenant_id("nobody@acme.test").await,
            Err(TenantError::UnknownEmail(_))
        ));
    }

    #[tokio::test]
    async fn test_repair_unknown_tenant() {
        let (_, _, coordinator) = setup();
        let id = Uuid::new_v4();
        assert!(matches!(
            coordinator.repair(id).await,
            Err(TenantError::UnknownTenant(unknown)) if unknown == id
        ));
    }
}
