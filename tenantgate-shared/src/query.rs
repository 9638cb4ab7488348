/// Dynamic statement construction for tenant namespaces
///
/// Builds the DDL, insert and lookup statements that run against a tenant's
/// namespace. Identifiers come only from a [`ValidatedSchema`] and are always
/// double-quoted; values are always bound as typed parameters.
///
/// Every [`Statement`] carries both its SQL text and its structural shape
/// ([`StatementKind`]), so a backend that does not speak SQL can execute it
/// without parsing.
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
/// use tenantgate_shared::query::{build_insert, Namespace};
/// use tenantgate_shared::schema::{SchemaDefinition, ValidatedSchema};
/// use uuid::Uuid;
///
/// let definition: SchemaDefinition = [("username", "text"), ("password", "text")]
///     .into_iter()
///     .collect();
/// let schema = ValidatedSchema::validate(&definition, "username", None).unwrap();
/// let namespace = Namespace::for_tenant(Uuid::nil());
///
/// let mut values = HashMap::new();
/// values.insert("username".to_string(), "alice".to_string());
/// values.insert("password".to_string(), "secret".to_string());
///
/// let stmt = build_insert(&namespace, &schema, &values).unwrap();
/// assert_eq!(
///     stmt.sql,
///     r#"INSERT INTO "tenant_00000000000000000000000000000000"."users" ("username", "password") VALUES ($1, $2)"#
/// );
/// ```

use crate::error::{TenantError, TenantResult};
use crate::schema::{validate_identifier, ColumnType, ValidatedSchema};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Prefix for per-tenant namespaces
pub const NAMESPACE_PREFIX: &str = "tenant_";

/// Name of the user-record table inside every namespace
pub const USERS_TABLE: &str = "users";

/// A user record as returned by a lookup: field name → text value
pub type UserRecord = BTreeMap<String, String>;

/// Isolated storage area of one tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    tenant_id: Uuid,
    schema_name: String,
}

impl Namespace {
    /// Derives the namespace deterministically from the tenant id
    pub fn for_tenant(tenant_id: Uuid) -> Self {
        Namespace {
            tenant_id,
            schema_name: format!("{}{}", NAMESPACE_PREFIX, tenant_id.simple()),
        }
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    /// Unquoted schema name, e.g. `tenant_1f0c...`
    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn table_name(&self) -> &'static str {
        USERS_TABLE
    }

    /// Fully qualified, quoted table reference
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema_name), quote_ident(USERS_TABLE))
    }
}

/// A typed parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Converts caller-supplied text into the declared column type
    pub fn parse(field: &str, column_type: ColumnType, raw: &str) -> TenantResult<Self> {
        let invalid = |reason: &str| TenantError::InvalidFieldValue {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        match column_type {
            ColumnType::Text => Ok(FieldValue::Text(raw.to_string())),
            ColumnType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| invalid("expected an integer")),
            ColumnType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" | "yes" => Ok(FieldValue::Boolean(true)),
                "false" | "f" | "0" | "no" => Ok(FieldValue::Boolean(false)),
                _ => Err(invalid("expected a boolean")),
            },
            ColumnType::Timestamp => DateTime::parse_from_rfc3339(raw.trim())
                .map(|ts| FieldValue::Timestamp(ts.with_timezone(&Utc)))
                .map_err(|_| invalid("expected an RFC 3339 timestamp")),
        }
    }

    /// Text rendering used when a record is returned to callers
    pub fn to_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::Timestamp(ts) => ts.to_rfc3339(),
        }
    }
}

/// Structural description of a statement
#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// Insert of `columns`, bound in order to `params`
    Insert { columns: Vec<String> },

    /// Equality lookup on `key_column` (bound as `$1`) returning `projection`
    Lookup {
        key_column: String,
        projection: Vec<String>,
    },
}

/// Parameterized statement against one namespace
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub namespace: Namespace,
    pub sql: String,
    pub params: Vec<FieldValue>,
    pub kind: StatementKind,
}

/// Quotes an identifier that already passed validation
///
/// Embedded quotes are doubled so the function stays safe even if it is
/// handed something the validator never saw.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// DDL creating the namespace and its user table
///
/// Returns the statements in execution order. The primary-key column is
/// declared `PRIMARY KEY`, which gives signup its uniqueness guarantee.
pub fn build_create_namespace(namespace: &Namespace, schema: &ValidatedSchema) -> Vec<String> {
    let columns: Vec<String> = schema
        .fields()
        .iter()
        .map(|f| {
            let mut column = format!("{} {}", quote_ident(f.name()), f.column_type().sql_type());
            if f.name() == schema.primary_key() {
                column.push_str(" PRIMARY KEY");
            }
            column
        })
        .collect();

    vec![
        format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            quote_ident(namespace.schema_name())
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            namespace.qualified_table(),
            columns.join(", ")
        ),
    ]
}

/// Builds the signup insert
///
/// Columns appear in schema declaration order, limited to the supplied keys.
///
/// # Errors
///
/// - `UnknownField` if a key is not declared in the schema
/// - `MissingField` if no values are supplied
/// - `InvalidFieldValue` if a value does not parse as its column type
pub fn build_insert(
    namespace: &Namespace,
    schema: &ValidatedSchema,
    values: &HashMap<String, String>,
) -> TenantResult<Statement> {
    if let Some(unknown) = values.keys().find(|k| !schema.contains(k)) {
        return Err(TenantError::UnknownField(unknown.clone()));
    }
    if values.is_empty() {
        return Err(TenantError::MissingField(schema.primary_key().to_string()));
    }

    let mut columns = Vec::with_capacity(values.len());
    let mut params = Vec::with_capacity(values.len());

    for field in schema.fields() {
        if let Some(raw) = values.get(field.name()) {
            params.push(FieldValue::parse(field.name(), field.column_type(), raw)?);
            columns.push(field.name().to_string());
        }
    }

    let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        namespace.qualified_table(),
        quoted.join(", "),
        placeholders.join(", ")
    );

    Ok(Statement {
        namespace: namespace.clone(),
        sql,
        params,
        kind: StatementKind::Insert { columns },
    })
}

/// Builds the login lookup on the primary key
///
/// Every column is projected as text so the row can be returned as a
/// string map regardless of declared types.
///
/// # Errors
///
/// - `UnknownField` if `key_field` fails the identifier grammar or is not
///   declared in the schema
/// - `InvalidFieldValue` if `key_value` does not parse as the key's type
pub fn build_lookup(
    namespace: &Namespace,
    schema: &ValidatedSchema,
    key_field: &str,
    key_value: &str,
) -> TenantResult<Statement> {
    validate_identifier(key_field).map_err(|_| TenantError::UnknownField(key_field.to_string()))?;
    let key_type = schema
        .column_type(key_field)
        .ok_or_else(|| TenantError::UnknownField(key_field.to_string()))?;

    let param = FieldValue::parse(key_field, key_type, key_value)?;

    let projection: Vec<String> = schema.fields().iter().map(|f| f.name().to_string()).collect();
    let select_list: Vec<String> = projection
        .iter()
        .map(|c| format!("{q}::TEXT AS {q}", q = quote_ident(c)))
        .collect();

    let sql = format!(
        "SELECT {} FROM {} WHERE {} = $1 LIMIT 1",
        select_list.join(", "),
        namespace.qualified_table(),
        quote_ident(key_field)
    );

    Ok(Statement {
        namespace: namespace.clone(),
        sql,
        params: vec![param],
        kind: StatementKind::Lookup {
            key_column: key_field.to_string(),
            projection,
        },
    })
}
