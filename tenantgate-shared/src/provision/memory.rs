/// In-memory provisioner
///
/// Executes statements from their [`StatementKind`] rather than their SQL
/// text. Primary-key uniqueness is checked under the table lock, matching
/// the `PRIMARY KEY` constraint the Postgres backend relies on.

use super::Provisioner;
use crate::error::{TenantError, TenantResult};
use crate::query::{FieldValue, Namespace, Statement, StatementKind, UserRecord};
use crate::schema::{ColumnType, ValidatedSchema};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Table {
    columns: Vec<(String, ColumnType)>,
    primary_key: String,
    rows: Vec<BTreeMap<String, FieldValue>>,
}

#[derive(Default)]
pub struct MemoryProvisioner {
    tables: Mutex<HashMap<Uuid, Table>>,
    operations: AtomicUsize,
    fail_next_provision: AtomicBool,
    unavailable: AtomicBool,
}

impl MemoryProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store calls made so far
    pub fn operations(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    /// Makes the next `provision` call fail with a provisioning error
    pub fn fail_next_provision(&self) {
        self.fail_next_provision.store(true, Ordering::SeqCst);
    }

    /// Makes every subsequent call fail with a storage error until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Creates a table directly, bypassing the schema; used to stage conflicts
    pub fn create_table(&self, tenant_id: Uuid, columns: Vec<(String, ColumnType)>, primary_key: &str) {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.insert(
            tenant_id,
            Table {
                columns,
                primary_key: primary_key.to_string(),
                rows: Vec::new(),
            },
        );
    }

    /// Columns of a tenant's user table, if provisioned
    pub fn columns(&self, tenant_id: Uuid) -> Option<Vec<(String, ColumnType)>> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.get(&tenant_id).map(|t| t.columns.clone())
    }

    /// Number of rows stored for a tenant
    pub fn row_count(&self, tenant_id: Uuid) -> usize {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.get(&tenant_id).map(|t| t.rows.len()).unwrap_or(0)
    }

    /// Raw stored value of one column, rendered as text
    pub fn stored_value(&self, tenant_id: Uuid, key: &FieldValue, column: &str) -> Option<String> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let table = tables.get(&tenant_id)?;
        table
            .rows
            .iter()
            .find(|row| row.get(&table.primary_key) == Some(key))
            .and_then(|row| row.get(column))
            .map(FieldValue::to_text)
    }

    fn enter(&self) -> TenantResult<()> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TenantError::Storage("relational store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Provisioner for MemoryProvisioner {
    async fn provision(&self, namespace: &Namespace, schema: &ValidatedSchema) -> TenantResult<()> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_provision.swap(false, Ordering::SeqCst) || self.unavailable.load(Ordering::SeqCst) {
            return Err(TenantError::Provisioning("relational store unavailable".to_string()));
        }

        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        match tables.get(&namespace.tenant_id()) {
            Some(existing)
                if schema.matches_table(&existing.columns, std::slice::from_ref(&existing.primary_key)) =>
            {
                Ok(())
            }
            Some(_) => Err(TenantError::SchemaConflict {
                tenant_id: namespace.tenant_id(),
            }),
            None => {
                let columns = schema
                    .fields()
                    .iter()
                    .map(|f| (f.name().to_string(), f.column_type()))
                    .collect();
                tables.insert(
                    namespace.tenant_id(),
                    Table {
                        columns,
                        primary_key: schema.primary_key().to_string(),
                        rows: Vec::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn execute(&self, statement: &Statement) -> TenantResult<u64> {
        self.enter()?;
        let columns = match &statement.kind {
            StatementKind::Insert { columns } => columns,
            StatementKind::Lookup { .. } => {
                return Err(TenantError::Storage("lookup statement used as a write".to_string()))
            }
        };

        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let table = tables.get_mut(&statement.namespace.tenant_id()).ok_or_else(|| {
            TenantError::Storage(format!(
                "relation {} does not exist",
                statement.namespace.qualified_table()
            ))
        })?;

        let row: BTreeMap<String, FieldValue> = columns
            .iter()
            .cloned()
            .zip(statement.params.iter().cloned())
            .collect();

        let key = row.get(&table.primary_key).ok_or_else(|| {
            TenantError::Storage(format!(
                "null value in column \"{}\" violates not-null constraint",
                table.primary_key
            ))
        })?;

        if table.rows.iter().any(|r| r.get(&table.primary_key) == Some(key)) {
            return Err(TenantError::DuplicateUser);
        }

        table.rows.push(row);
        Ok(1)
    }

    async fn fetch_optional(&self, statement: &Statement) -> TenantResult<Option<UserRecord>> {
        self.enter()?;
        let (key_column, projection) = match &statement.kind {
            StatementKind::Lookup { key_column, projection } => (key_column, projection),
            StatementKind::Insert { .. } => {
                return Err(TenantError::Storage("insert statement used as a lookup".to_string()))
            }
        };
        let key = statement
            .params
            .first()
            .ok_or_else(|| TenantError::Storage("lookup without a key parameter".to_string()))?;

        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let table = tables.get(&statement.namespace.tenant_id()).ok_or_else(|| {
            TenantError::Storage(format!(
                "relation {} does not exist",
                statement.namespace.qualified_table()
            ))
        })?;

        Ok(table
            .rows
            .iter()
            .find(|row| row.get(key_column) == Some(key))
            .map(|row| {
                projection
                    .iter()
                    .map(|c| (c.clone(), row.get(c).map(FieldValue::to_text).unwrap_or_default()))
                    .collect()
            }))
    }

    async fn ping(&self) -> TenantResult<()> {
        self.enter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{build_insert, build_lookup};
    use crate::schema::SchemaDefinition;

    fn schema() -> ValidatedSchema {
        let def: SchemaDefinition = [("username", "text"), ("password", "text"), ("age", "integer")]
            .into_iter()
            .collect();
        ValidatedSchema::validate(&def, "username", None).unwrap()
    }

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let provisioner = MemoryProvisioner::new();
        let ns = Namespace::for_tenant(Uuid::new_v4());

        provisioner.provision(&ns, &schema()).await.unwrap();
        provisioner.provision(&ns, &schema()).await.unwrap();

        let columns = provisioner.columns(ns.tenant_id()).unwrap();
        assert_eq!(columns.len(), 3);
        assert_eq!(columns[0], ("username".to_string(), ColumnType::Text));
    }

    #[tokio::test]
    async fn test_provision_detects_conflict() {
        let provisioner = MemoryProvisioner::new();
        let ns = Namespace::for_tenant(Uuid::new_v4());
        provisioner.create_table(
            ns.tenant_id(),
            vec![("username".to_string(), ColumnType::Text)],
            "username",
        );

        let result = provisioner.provision(&ns, &schema()).await;
        assert!(matches!(result, Err(TenantError::SchemaConflict { .. })));
    }

    #[tokio::test]
    async fn test_provision_rejects_table_keyed_on_another_column() {
        let provisioner = MemoryProvisioner::new();
        let ns = Namespace::for_tenant(Uuid::new_v4());
        let columns = schema()
            .fields()
            .iter()
            .map(|f| (f.name().to_string(), f.column_type()))
            .collect();
        provisioner.create_table(ns.tenant_id(), columns, "password");

        let result = provisioner.provision(&ns, &schema()).await;
        assert!(matches!(result, Err(TenantError::SchemaConflict { .. })));
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let provisioner = MemoryProvisioner::new();
        let ns = Namespace::for_tenant(Uuid::new_v4());
        provisioner.provision(&ns, &schema()).await.unwrap();

        let insert = build_insert(&ns, &schema(), &values(&[("username", "alice"), ("password", "pw")])).unwrap();
        assert_eq!(provisioner.execute(&insert).await.unwrap(), 1);
        assert!(matches!(provisioner.execute(&insert).await, Err(TenantError::DuplicateUser)));

        let lookup = build_lookup(&ns, &schema(), "username", "alice").unwrap();
        let record = provisioner.fetch_optional(&lookup).await.unwrap().unwrap();
        assert_eq!(record["username"], "alice");
        assert_eq!(record["password"], "pw");
        assert_eq!(record["age"], "");

        let missing = build_lookup(&ns, &schema(), "username", "bob").unwrap();
        assert!(provisioner.fetch_optional(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_execute_without_namespace_fails() {
        let provisioner = MemoryProvisioner::new();
        let ns = Namespace::for_tenant(Uuid::new_v4());
        let insert = build_insert(&ns, &schema(), &values(&[("username", "alice")])).unwrap();

        assert!(matches!(provisioner.execute(&insert).await, Err(TenantError::Storage(_))));
    }

    #[tokio::test]
    async fn test_fail_next_provision_is_one_shot() {
        let provisioner = MemoryProvisioner::new();
        let ns = Namespace::for_tenant(Uuid::new_v4());
        provisioner.fail_next_provision();

        assert!(matches!(
            provisioner.provision(&ns, &schema()).await,
            Err(TenantError::Provisioning(_))
        ));
        assert!(provisioner.provision(&ns, &schema()).await.is_ok());
    }
}
