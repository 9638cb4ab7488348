/// PostgreSQL identity store
///
/// Stores tenants in the `tenants` table. The user-record schema is kept as a
/// JSONB array of `{"name", "type"}` objects so declaration order survives
/// (JSONB objects do not preserve key order). Rows are rehydrated through the
/// schema validator; a row that no longer validates is reported as a storage
/// error rather than handed to query generation.
///
/// # Example
///
/// ```no_run
/// use tenantgate_shared::db::pool::{create_pool, DatabaseConfig};
/// use tenantgate_shared::identity::{IdentityStore, PgIdentityStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig {
///     url: std::env::var("DATABASE_URL")?,
///     ..Default::default()
/// })
/// .await?;
///
/// let store = PgIdentityStore::new(pool);
/// if let Some(tenant) = store.find_by_email("ops@example.com").await? {
///     println!("Found tenant: {}", tenant.id);
/// }
/// # Ok(())
/// # }
/// ```

use super::{normalize_email, IdentityStore, NewTenant, ProvisioningState, Tenant};
use crate::error::{sqlstate, TenantError, TenantResult, UNIQUE_VIOLATION};
use crate::schema::{SchemaDefinition, ValidatedSchema};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

const TENANT_COLUMNS: &str = "id, name, phone, email, user_schema, primary_key_field, \
                              secret_field, provisioning_state, created_at, updated_at";

/// Stored form of one schema field
#[derive(Debug, Serialize, Deserialize)]
struct StoredField {
    name: String,
    #[serde(rename = "type")]
    column_type: String,
}

#[derive(Debug, sqlx::FromRow)]
struct TenantRow {
    id: Uuid,
    name: String,
    phone: String,
    email: String,
    user_schema: JsonValue,
    primary_key_field: String,
    secret_field: Option<String>,
    provisioning_state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = TenantError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        let stored: Vec<StoredField> = serde_json::from_value(row.user_schema).map_err(|e| {
            TenantError::Storage(format!("tenant {} has a malformed schema: {}", row.id, e))
        })?;

        let definition: SchemaDefinition = stored
            .into_iter()
            .map(|f| (f.name, f.column_type))
            .collect();

        let schema = ValidatedSchema::validate(
            &definition,
            &row.primary_key_field,
            row.secret_field.as_deref(),
        )
        .map_err(|e| TenantError::Storage(format!("tenant {} has an invalid stored schema: {}", row.id, e)))?;

        let provisioning_state = ProvisioningState::from_str(&row.provisioning_state).ok_or_else(|| {
            TenantError::Storage(format!(
                "tenant {} has unknown provisioning state '{}'",
                row.id, row.provisioning_state
            ))
        })?;

        Ok(Tenant {
            id: row.id,
            name: row.name,
            phone: row.phone,
            email: row.email,
            schema,
            provisioning_state,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn stored_schema(schema: &ValidatedSchema) -> JsonValue {
    let fields: Vec<StoredField> = schema
        .fields()
        .iter()
        .map(|f| StoredField {
            name: f.name().to_string(),
            column_type: f.column_type().as_str().to_string(),
        })
        .collect();
    serde_json::json!(fields)
}

fn storage_error(err: sqlx::Error) -> TenantError {
    TenantError::Storage(format!("identity store: {}", err))
}

/// Identity store backed by PostgreSQL
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        PgIdentityStore { pool }
    }

    /// Underlying pool, for health checks and shutdown
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn insert(&self, tenant: NewTenant) -> TenantResult<Tenant> {
        let email = normalize_email(&tenant.email);

        let row = sqlx::query_as::<_, TenantRow>(&format!(
            r#"
            INSERT INTO tenants (name, phone, email, user_schema, primary_key_field, secret_field, provisioning_state)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            TENANT_COLUMNS
        ))
        .bind(&tenant.name)
        .bind(&tenant.phone)
        .bind(&email)
        .bind(stored_schema(&tenant.schema))
        .bind(tenant.schema.primary_key())
        .bind(tenant.schema.secret_field())
        .bind(ProvisioningState::Pending.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if sqlstate(&e).as_deref() == Some(UNIQUE_VIOLATION) {
                TenantError::DuplicateTenant(email.clone())
            } else {
                storage_error(e)
            }
        })?;

        Tenant::try_from(row)
    }

    async fn find_by_id(&self, id: Uuid) -> TenantResult<Option<Tenant>> {
        let row = sqlx::query_as::<_, TenantRow>(&format!(
            "SELECT {} FROM tenants WHERE id = $1",
            TENANT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(Tenant::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> TenantResult<Option<Tenant>> {
        let row = sqlx::query_as::<_, TenantRow>(&format!(
            "SELECT {} FROM tenants WHERE email = $1",
            TENANT_COLUMNS
        ))
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(Tenant::try_from).transpose()
    }

    async fn set_provisioning_state(&self, id: Uuid, state: ProvisioningState) -> TenantResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET provisioning_state = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(state.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_unprovisioned(&self, limit: usize, stale_after: Duration) -> TenantResult<Vec<Tenant>> {
        let rows = sqlx::query_as::<_, TenantRow>(&format!(
            r#"
            SELECT {}
            FROM tenants
            WHERE provisioning_state = 'incomplete'
               OR (provisioning_state = 'pending' AND updated_at < NOW() - make_interval(secs => $2))
            ORDER BY updated_at ASC
            LIMIT $1
            "#,
            TENANT_COLUMNS
        ))
        .bind(limit as i64)
        .bind(stale_after.as_secs_f64())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let mut tenants = Vec::with_capacity(rows.len());
        for row in rows {
            match Tenant::try_from(row) {
                Ok(tenant) => tenants.push(tenant),
                Err(e) => tracing::error!(error = %e, "Skipping unreadable tenant record"),
            }
        }
        Ok(tenants)
    }

    async fn ping(&self) -> TenantResult<()> {
        crate::db::pool::health_check(&self.pool)
            .await
            .map_err(storage_error)
    }
}
