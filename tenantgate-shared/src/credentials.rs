/// Signup and login against tenant namespaces
///
/// Field names always come from the tenant's stored schema. Caller-supplied
/// keys are checked against it before any statement is built, and keys that
/// fail the identifier grammar are rejected before any store is touched.
///
/// Login collapses every failure cause (unknown tenant, wrong key field,
/// missing user, wrong secret) into `InvalidCredentials`. Store outages are
/// the exception: they surface as `Storage` so clients can retry. Failures
/// that never reach a stored secret still run one verification against a
/// decoy hash, so response time does not reveal which users exist.

use crate::deadline::{bounded, DEFAULT_STORE_TIMEOUT};
use crate::error::{TenantError, TenantResult};
use crate::hashing::SecretHasher;
use crate::identity::{IdentityStore, Tenant};
use crate::provision::Provisioner;
use crate::query::{build_insert, build_lookup, Namespace, UserRecord};
use crate::schema::validate_identifier;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct CredentialService {
    identity: Arc<dyn IdentityStore>,
    provisioner: Arc<dyn Provisioner>,
    hasher: Arc<dyn SecretHasher>,
    store_timeout: Duration,
    decoy_hash: OnceCell<String>,
}

/// Input for the decoy hash; never matches a real login because the decoy
/// is only verified on paths that already failed
const DECOY_SECRET: &str = "tenantgate-decoy-secret";

impl CredentialService {
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        provisioner: Arc<dyn Provisioner>,
        hasher: Arc<dyn SecretHasher>,
    ) -> Self {
        CredentialService {
            identity,
            provisioner,
            hasher,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            decoy_hash: OnceCell::new(),
        }
    }

    /// Sets the deadline applied to every store call
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn hasher_name(&self) -> &'static str {
        self.hasher.name()
    }

    /// Creates a user record in the tenant's namespace
    ///
    /// `primary_key_field`, when given, must name the tenant's primary key.
    ///
    /// # Errors
    ///
    /// - `UnknownField` for keys outside the tenant schema
    /// - `UnknownTenant`, `ProvisioningIncomplete` for tenants that cannot serve signups
    /// - `PrimaryKeyMismatch`, `MissingField`, `InvalidFieldValue` for bad input
    /// - `DuplicateUser` when the primary-key value is taken
    /// - `Storage` for store failures
    pub async fn signup(
        &self,
        tenant_id: Uuid,
        primary_key_field: Option<&str>,
        mut values: HashMap<String, String>,
    ) -> TenantResult<()> {
        // Grammar check first: nothing below may see an unsafe identifier
        if let Some(bad) = values.keys().find(|k| validate_identifier(k).is_err()) {
            return Err(TenantError::UnknownField(bad.clone()));
        }
        if let Some(pk) = primary_key_field {
            validate_identifier(pk).map_err(|_| TenantError::UnknownField(pk.to_string()))?;
        }

        let tenant = self.load_tenant(tenant_id).await?.ok_or(TenantError::UnknownTenant(tenant_id))?;
        if !tenant.is_active() {
            return Err(TenantError::ProvisioningIncomplete {
                tenant_id,
                reason: format!("tenant is {}", tenant.provisioning_state.as_str()),
            });
        }

        let schema = &tenant.schema;
        if let Some(pk) = primary_key_field {
            if pk != schema.primary_key() {
                return Err(TenantError::PrimaryKeyMismatch(pk.to_string()));
            }
        }

        if let Some(unknown) = values.keys().find(|k| !schema.contains(k)) {
            return Err(TenantError::UnknownField(unknown.clone()));
        }

        if !values.contains_key(schema.primary_key()) {
            return Err(TenantError::MissingField(schema.primary_key().to_string()));
        }

        if let Some(secret_field) = schema.secret_field() {
            let secret = values
                .get(secret_field)
                .cloned()
                .ok_or_else(|| TenantError::MissingField(secret_field.to_string()))?;
            let stored = self.hash_secret(secret).await?;
            values.insert(secret_field.to_string(), stored);
        }

        let namespace = Namespace::for_tenant(tenant_id);
        let statement = build_insert(&namespace, schema, &values)?;

        bounded(
            self.store_timeout,
            "tenant_store.insert",
            self.provisioner.execute(&statement),
        )
        .await?;

        info!(tenant_id = %tenant_id, "User signed up");
        Ok(())
    }

    /// Verifies credentials and returns the user's record
    ///
    /// The secret field of the returned record holds the password the caller
    /// presented, never the stored form.
    pub async fn login(
        &self,
        tenant_id: Uuid,
        primary_key_field: &str,
        primary_key_value: &str,
        password: &str,
    ) -> TenantResult<UserRecord> {
        validate_identifier(primary_key_field)
            .map_err(|_| TenantError::UnknownField(primary_key_field.to_string()))?;

        let tenant = match self.load_tenant(tenant_id).await? {
            Some(tenant) if tenant.is_active() => tenant,
            Some(_) => {
                debug!(tenant_id = %tenant_id, "Login against a tenant that is not active");
                return self.reject(password).await;
            }
            None => return self.reject(password).await,
        };

        let schema = &tenant.schema;
        if primary_key_field != schema.primary_key() {
            return self.reject(password).await;
        }
        let Some(secret_field) = schema.secret_field() else {
            debug!(tenant_id = %tenant_id, "Login against a tenant without a secret field");
            return self.reject(password).await;
        };

        let namespace = Namespace::for_tenant(tenant_id);
        let Ok(statement) = build_lookup(&namespace, schema, primary_key_field, primary_key_value) else {
            return self.reject(password).await;
        };

        let found = bounded(
            self.store_timeout,
            "tenant_store.lookup",
            self.provisioner.fetch_optional(&statement),
        )
        .await?;
        let Some(mut record) = found else {
            return self.reject(password).await;
        };

        let stored = record.get(secret_field).cloned().unwrap_or_default();
        if !self.verify_secret(password.to_string(), stored).await? {
            return Err(TenantError::InvalidCredentials);
        }

        record.insert(secret_field.to_string(), password.to_string());
        info!(tenant_id = %tenant_id, "User logged in");
        Ok(record)
    }

    /// Spends one verification on the decoy hash, then fails
    async fn reject(&self, password: &str) -> TenantResult<UserRecord> {
        let decoy = self
            .decoy_hash
            .get_or_try_init(|| self.hash_secret(DECOY_SECRET.to_string()))
            .await?
            .clone();
        self.verify_secret(password.to_string(), decoy).await?;
        Err(TenantError::InvalidCredentials)
    }

    async fn load_tenant(&self, tenant_id: Uuid) -> TenantResult<Option<Tenant>> {
        bounded(
            self.store_timeout,
            "identity.find_by_id",
            self.identity.find_by_id(tenant_id),
        )
        .await
    }

    async fn hash_secret(&self, secret: String) -> TenantResult<String> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| TenantError::Storage(format!("hashing task failed: {}", e)))?
            .map_err(|e| TenantError::Storage(e.to_string()))
    }

    /// Returns false for mismatches and for stored values the hasher cannot read
    async fn verify_secret(&self, candidate: String, stored: String) -> TenantResult<bool> {
        let hasher = Arc::clone(&self.hasher);
        let result = tokio::task::spawn_blocking(move || hasher.verify(&candidate, &stored))
            .await
            .map_err(|e| TenantError::Storage(format!("verification task failed: {}", e)))?;

        match result {
            Ok(matched) => Ok(matched),
            Err(e) => {
                warn!(error = %e, "Stored secret could not be verified");
                Ok(false)
            }
        }
    }
}
