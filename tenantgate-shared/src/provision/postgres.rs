/// PostgreSQL provisioner
///
/// Each tenant gets its own Postgres schema (`tenant_<id>`) containing a
/// single `users` table. Creation runs in one transaction; afterwards the
/// table's columns and primary key are read back from `information_schema`
/// and compared with the declared schema, which is what makes a repeated
/// call safe.
///
/// # Example
///
/// ```no_run
/// use tenantgate_shared::provision::{PgProvisioner, Provisioner};
/// use tenantgate_shared::query::Namespace;
/// use tenantgate_shared::schema::{SchemaDefinition, ValidatedSchema};
/// use uuid::Uuid;
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let definition: SchemaDefinition = [("username", "text"), ("password", "text")]
///     .into_iter()
///     .collect();
/// let schema = ValidatedSchema::validate(&definition, "username", None)?;
///
/// let provisioner = PgProvisioner::new(pool);
/// provisioner.provision(&Namespace::for_tenant(Uuid::new_v4()), &schema).await?;
/// # Ok(())
/// # }
/// ```

use super::Provisioner;
use crate::error::{sqlstate, TenantError, TenantResult, UNIQUE_VIOLATION};
use crate::query::{build_create_namespace, FieldValue, Namespace, Statement, StatementKind, UserRecord};
use crate::schema::{ColumnType, ValidatedSchema};
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPool};
use sqlx::query::Query;
use sqlx::{Executor, Postgres, Row};
use tracing::{debug, info, warn};

/// SQLSTATE duplicate_schema
const DUPLICATE_SCHEMA: &str = "42P06";

/// SQLSTATE duplicate_table
const DUPLICATE_TABLE: &str = "42P07";

/// Whether a DDL failure was caused by a concurrent creation of the same object
///
/// `IF NOT EXISTS` is not race-free in Postgres: two sessions can both pass
/// the existence check and the loser fails on the catalog's unique index.
fn is_concurrent_create(err: &sqlx::Error) -> bool {
    matches!(
        sqlstate(err).as_deref(),
        Some(UNIQUE_VIOLATION) | Some(DUPLICATE_SCHEMA) | Some(DUPLICATE_TABLE)
    )
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [FieldValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            FieldValue::Text(s) => query.bind(s.as_str()),
            FieldValue::Integer(i) => query.bind(*i),
            FieldValue::Boolean(b) => query.bind(*b),
            FieldValue::Timestamp(ts) => query.bind(*ts),
        };
    }
    query
}

/// Provisioner backed by PostgreSQL
#[derive(Clone)]
pub struct PgProvisioner {
    pool: PgPool,
}

impl PgProvisioner {
    pub fn new(pool: PgPool) -> Self {
        PgProvisioner { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn create(&self, statements: &[String]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for statement in statements {
            (&mut *tx).execute(statement.as_str()).await?;
        }
        tx.commit().await
    }

    /// Reads the user table's columns; `None` types are ones the engine never creates
    async fn introspect(&self, namespace: &Namespace) -> Result<Vec<(String, Option<ColumnType>)>, sqlx::Error> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT column_name::TEXT, data_type::TEXT
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
            "#,
        )
        .bind(namespace.schema_name())
        .bind(namespace.table_name())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type)| {
                let column_type = ColumnType::from_information_schema(&data_type);
                (name, column_type)
            })
            .collect())
    }

    /// Reads the user table's primary-key columns in key order
    async fn introspect_primary_key(&self, namespace: &Namespace) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT kcu.column_name::TEXT
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON kcu.constraint_schema = tc.constraint_schema
             AND kcu.constraint_name = tc.constraint_name
             AND kcu.table_name = tc.table_name
            WHERE tc.table_schema = $1
              AND tc.table_name = $2
              AND tc.constraint_type = 'PRIMARY KEY'
            ORDER BY kcu.ordinal_position
            "#,
        )
        .bind(namespace.schema_name())
        .bind(namespace.table_name())
        .fetch_all(&self.pool)
        .await
    }
}

#[async_trait]
impl Provisioner for PgProvisioner {
    async fn provision(&self, namespace: &Namespace, schema: &ValidatedSchema) -> TenantResult<()> {
        let statements = build_create_namespace(namespace, schema);

        match self.create(&statements).await {
            Ok(()) => {}
            Err(e) if is_concurrent_create(&e) => {
                debug!(
                    namespace = namespace.schema_name(),
                    "Namespace created concurrently, verifying shape"
                );
            }
            Err(e) => {
                warn!(namespace = namespace.schema_name(), error = %e, "Namespace creation failed");
                return Err(TenantError::Provisioning(e.to_string()));
            }
        }

        let introspected = self
            .introspect(namespace)
            .await
            .map_err(|e| TenantError::Provisioning(e.to_string()))?;

        if introspected.is_empty() {
            return Err(TenantError::Provisioning(format!(
                "user table missing in {} after creation",
                namespace.schema_name()
            )));
        }

        let conflict = TenantError::SchemaConflict {
            tenant_id: namespace.tenant_id(),
        };

        let mut columns = Vec::with_capacity(introspected.len());
        for (name, column_type) in introspected {
            match column_type {
                Some(t) => columns.push((name, t)),
                None => return Err(conflict),
            }
        }

        let key_columns = self
            .introspect_primary_key(namespace)
            .await
            .map_err(|e| TenantError::Provisioning(e.to_string()))?;

        if !schema.matches_table(&columns, &key_columns) {
            warn!(
                namespace = namespace.schema_name(),
                "Existing namespace does not match the declared schema"
            );
            return Err(conflict);
        }

        info!(namespace = namespace.schema_name(), "Namespace provisioned");
        Ok(())
    }

    async fn execute(&self, statement: &Statement) -> TenantResult<u64> {
        let query = bind_params(sqlx::query(&statement.sql), &statement.params);

        match query.execute(&self.pool).await {
            Ok(result) => Ok(result.rows_affected()),
            Err(e) if sqlstate(&e).as_deref() == Some(UNIQUE_VIOLATION) => Err(TenantError::DuplicateUser),
            Err(e) => Err(TenantError::Storage(format!("relational store: {}", e))),
        }
    }

    async fn fetch_optional(&self, statement: &Statement) -> TenantResult<Option<UserRecord>> {
        let projection = match &statement.kind {
            StatementKind::Lookup { projection, .. } => projection,
            StatementKind::Insert { .. } => {
                return Err(TenantError::Storage("insert statement used as a lookup".to_string()))
            }
        };

        let query = bind_params(sqlx::query(&statement.sql), &statement.params);
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| TenantError::Storage(format!("relational store: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut record = UserRecord::new();
        for column in projection {
            let value: Option<String> = row
                .try_get(column.as_str())
                .map_err(|e| TenantError::Storage(format!("decoding column {}: {}", column, e)))?;
            record.insert(column.clone(), value.unwrap_or_default());
        }
        Ok(Some(record))
    }

    async fn ping(&self) -> TenantResult<()> {
        crate::db::pool::health_check(&self.pool)
            .await
            .map_err(|e| TenantError::Storage(format!("relational store: {}", e)))
    }
}
