/// In-memory identity store
///
/// Process-local [`IdentityStore`] backing the engine and API tests. Email
/// uniqueness is enforced under the write lock, so concurrent registrations
/// behave like the database's unique constraint.

use super::{normalize_email, IdentityStore, NewTenant, ProvisioningState, Tenant};
use crate::error::{TenantError, TenantResult};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryIdentityStore {
    tenants: RwLock<HashMap<Uuid, Tenant>>,
    operations: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store calls made so far
    pub fn operations(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    /// Makes every subsequent call fail with a storage error until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of registered tenants
    pub async fn len(&self) -> usize {
        self.tenants.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tenants.read().await.is_empty()
    }

    fn enter(&self) -> TenantResult<()> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TenantError::Storage("identity store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn insert(&self, tenant: NewTenant) -> TenantResult<Tenant> {
        self.enter()?;
        let email = normalize_email(&tenant.email);

        let mut tenants = self.tenants.write().await;
        if tenants.values().any(|t| t.email == email) {
            return Err(TenantError::DuplicateTenant(email));
        }

        let now = Utc::now();
        let record = Tenant {
            id: Uuid::new_v4(),
            name: tenant.name,
            phone: tenant.phone,
            email,
            schema: tenant.schema,
            provisioning_state: ProvisioningState::Pending,
            created_at: now,
            updated_at: now,
        };
        tenants.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> TenantResult<Option<Tenant>> {
        self.enter()?;
        Ok(self.tenants.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> TenantResult<Option<Tenant>> {
        self.enter()?;
        let email = normalize_email(email);
        Ok(self
            .tenants
            .read()
            .await
            .values()
            .find(|t| t.email == email)
            .cloned())
    }

    async fn set_provisioning_state(&self, id: Uuid, state: ProvisioningState) -> TenantResult<bool> {
        self.enter()?;
        match self.tenants.write().await.get_mut(&id) {
            Some(tenant) => {
                tenant.provisioning_state = state;
                tenant.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_unprovisioned(&self, limit: usize, stale_after: Duration) -> TenantResult<Vec<Tenant>> {
        self.enter()?;
        let cutoff = Utc::now()
            - chrono::Duration::from_std(stale_after).unwrap_or_else(|_| chrono::Duration::zero());

        let mut pending: Vec<Tenant> = self
            .tenants
            .read()
            .await
            .values()
            .filter(|t| match t.provisioning_state {
                ProvisioningState::Incomplete => true,
                ProvisioningState::Pending => t.updated_at <= cutoff,
                ProvisioningState::Active => false,
            })
            .cloned()
            .collect();

        pending.sort_by_key(|t| t.updated_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn ping(&self) -> TenantResult<()> {
        self.enter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaDefinition, ValidatedSchema};

    fn new_tenant(email: &str) -> NewTenant {
        let def: SchemaDefinition = [("username", "text"), ("password", "text")].into_iter().collect();
        NewTenant {
            name: "Acme".to_string(),
            phone: "1234567890".to_string(),
            email: email.to_string(),
            schema: ValidatedSchema::validate(&def, "username", None).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = MemoryIdentityStore::new();
        let tenant = store.insert(new_tenant("Ops@Acme.test")).await.unwrap();

        assert_eq!(tenant.email, "ops@acme.test");
        assert_eq!(tenant.provisioning_state, ProvisioningState::Pending);

        let by_id = store.find_by_id(tenant.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, tenant.email);

        let by_email = store.find_by_email(" OPS@acme.test").await.unwrap().unwrap();
        assert_eq!(by_email.id, tenant.id);

        assert!(store.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = MemoryIdentityStore::new();
        store.insert(new_tenant("ops@acme.test")).await.unwrap();

        let result = store.insert(new_tenant("OPS@acme.test")).await;
        assert!(matches!(result, Err(TenantError::DuplicateTenant(_))));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_set_state_and_list_unprovisioned() {
        let store = MemoryIdentityStore::new();
        let a = store.insert(new_tenant("a@acme.test")).await.unwrap();
        let b = store.insert(new_tenant("b@acme.test")).await.unwrap();
        let c = store.insert(new_tenant("c@acme.test")).await.unwrap();

        assert!(store.set_provisioning_state(a.id, ProvisioningState::Active).await.unwrap());
        assert!(store.set_provisioning_state(b.id, ProvisioningState::Incomplete).await.unwrap());
        assert!(!store
            .set_provisioning_state(Uuid::new_v4(), ProvisioningState::Active)
            .await
            .unwrap());

        // c is pending but fresh, so only b qualifies with a long staleness window
        let listed = store.list_unprovisioned(10, Duration::from_secs(3600)).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, b.id);

        let listed = store.list_unprovisioned(10, Duration::ZERO).await.unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|t| t.id).collect();
        assert!(ids.contains(&b.id));
        assert!(ids.contains(&c.id));
        assert!(!ids.contains(&a.id));

        assert_eq!(store.list_unprovisioned(1, Duration::ZERO).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = MemoryIdentityStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.ping().await, Err(TenantError::Storage(_))));
        assert!(store.insert(new_tenant("a@acme.test")).await.is_err());

        store.set_unavailable(false);
        assert!(store.ping().await.is_ok());
        assert_eq!(store.operations(), 3);
    }
}
