/// Tenant schema declaration and validation
///
/// A tenant declares the shape of its user records as an ordered mapping of
/// field name to column type. Nothing from that declaration is trusted: it is
/// turned into a [`ValidatedSchema`] exactly once, and only a validated schema
/// can be used to provision a namespace or build a query.
///
/// # Rules
///
/// - The schema must contain at least one field
/// - Field names match `[A-Za-z_][A-Za-z0-9_]*` and are at most 63 bytes
/// - Field names are unique (case-insensitive)
/// - Column types come from a closed allow-list (see [`ColumnType`])
/// - The primary-key field is one of the declared fields
/// - The secret field, if any, is a text field distinct from the primary key
///
/// # Example
///
/// ```
/// use tenantgate_shared::schema::{SchemaDefinition, ValidatedSchema, ColumnType};
///
/// let definition: SchemaDefinition = [("username", "text"), ("password", "VARCHAR(50)")]
///     .into_iter()
///     .collect();
///
/// let schema = ValidatedSchema::validate(&definition, "username", None).unwrap();
/// assert_eq!(schema.primary_key(), "username");
/// assert_eq!(schema.secret_field(), Some("password"));
/// assert_eq!(schema.column_type("password"), Some(ColumnType::Text));
/// ```

use crate::error::{TenantError, TenantResult};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Longest identifier PostgreSQL keeps without truncation
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Field used as the secret when the tenant does not name one
pub const DEFAULT_SECRET_FIELD: &str = "password";

/// Portable column types a tenant may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Variable-length string
    Text,

    /// 64-bit signed integer
    Integer,

    /// true / false
    Boolean,

    /// Timestamp with time zone
    Timestamp,
}

impl ColumnType {
    /// Parses a declared type, accepting common store-native aliases
    ///
    /// Returns `None` for anything outside the allow-list.
    pub fn parse(declared: &str) -> Option<Self> {
        let lowered = declared.trim().to_ascii_lowercase();

        // varchar(50), char(10), ...
        let base = match lowered.split_once('(') {
            Some((base, rest)) => {
                let len = rest.strip_suffix(')')?;
                if len.is_empty() || !len.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                let base = base.trim_end();
                if !matches!(base, "varchar" | "char" | "character varying" | "character") {
                    return None;
                }
                base
            }
            None => lowered.as_str(),
        };

        match base {
            "text" | "string" | "varchar" | "char" | "character varying" | "character" => {
                Some(ColumnType::Text)
            }
            "integer" | "int" | "bigint" | "smallint" | "int4" | "int8" => Some(ColumnType::Integer),
            "boolean" | "bool" => Some(ColumnType::Boolean),
            "timestamp" | "timestamptz" | "datetime" | "timestamp with time zone" => {
                Some(ColumnType::Timestamp)
            }
            _ => None,
        }
    }

    /// Canonical name, used when persisting a schema
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Integer => "integer",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamp",
        }
    }

    /// Column type emitted in DDL
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "BIGINT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Timestamp => "TIMESTAMPTZ",
        }
    }

    /// Maps `information_schema.columns.data_type` back to a column type
    pub fn from_information_schema(data_type: &str) -> Option<Self> {
        match data_type {
            "text" => Some(ColumnType::Text),
            "bigint" => Some(ColumnType::Integer),
            "boolean" => Some(ColumnType::Boolean),
            "timestamp with time zone" => Some(ColumnType::Timestamp),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw schema as declared by a tenant, in declaration order
///
/// Serializes as a JSON object. Deserialization keeps the document order and
/// also keeps duplicate keys so that validation can reject them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDefinition {
    fields: Vec<(String, String)>,
}

impl SchemaDefinition {
    /// Creates an empty definition
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field declaration
    pub fn push(&mut self, name: impl Into<String>, declared_type: impl Into<String>) {
        self.fields.push((name.into(), declared_type.into()));
    }

    /// Declared fields in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, t)| (n.as_str(), t.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SchemaDefinition {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        SchemaDefinition {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl Serialize for SchemaDefinition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, declared_type) in &self.fields {
            map.serialize_entry(name, declared_type)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SchemaDefinition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DefinitionVisitor;

        impl<'de> Visitor<'de> for DefinitionVisitor {
            type Value = SchemaDefinition;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field names to column types")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut fields = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, declared_type)) = map.next_entry::<String, String>()? {
                    fields.push((name, declared_type));
                }
                Ok(SchemaDefinition { fields })
            }
        }

        deserializer.deserialize_map(DefinitionVisitor)
    }
}

/// A single validated field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    name: String,
    column_type: ColumnType,
}

impl FieldDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }
}

/// Schema that passed validation and is safe to use in generated SQL
///
/// Immutable. The only constructor is [`ValidatedSchema::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSchema {
    fields: Vec<FieldDef>,
    primary_key: String,
    secret_field: Option<String>,
}

impl ValidatedSchema {
    /// Validates a tenant-declared schema
    ///
    /// `secret_field` names the password column. When `None`, a field called
    /// `password` is used if the schema declares one.
    ///
    /// # Errors
    ///
    /// Returns `TenantError::InvalidSchema` when any rule in the module
    /// documentation is violated.
    pub fn validate(
        definition: &SchemaDefinition,
        primary_key: &str,
        secret_field: Option<&str>,
    ) -> TenantResult<Self> {
        if definition.is_empty() {
            return Err(TenantError::InvalidSchema("schema must declare at least one field".into()));
        }

        let mut seen = HashSet::with_capacity(definition.len());
        let mut fields = Vec::with_capacity(definition.len());

        for (name, declared_type) in definition.iter() {
            validate_identifier(name).map_err(TenantError::InvalidSchema)?;

            if !seen.insert(name.to_ascii_lowercase()) {
                return Err(TenantError::InvalidSchema(format!("duplicate field '{}'", name)));
            }

            let column_type = ColumnType::parse(declared_type).ok_or_else(|| {
                TenantError::InvalidSchema(format!(
                    "field '{}' has unsupported type '{}'; allowed: text, integer, boolean, timestamp",
                    name, declared_type
                ))
            })?;

            fields.push(FieldDef {
                name: name.to_string(),
                column_type,
            });
        }

        if !fields.iter().any(|f| f.name == primary_key) {
            return Err(TenantError::InvalidSchema(format!(
                "primary key field '{}' is not declared in the schema",
                primary_key
            )));
        }

        let secret_field = match secret_field {
            Some(secret) => {
                let field = fields.iter().find(|f| f.name == secret).ok_or_else(|| {
                    TenantError::InvalidSchema(format!(
                        "secret field '{}' is not declared in the schema",
                        secret
                    ))
                })?;
                if field.column_type != ColumnType::Text {
                    return Err(TenantError::InvalidSchema(format!(
                        "secret field '{}' must be of type text",
                        secret
                    )));
                }
                if secret == primary_key {
                    return Err(TenantError::InvalidSchema(
                        "secret field must differ from the primary key field".into(),
                    ));
                }
                Some(secret.to_string())
            }
            None => fields
                .iter()
                .find(|f| {
                    f.name == DEFAULT_SECRET_FIELD
                        && f.column_type == ColumnType::Text
                        && f.name != primary_key
                })
                .map(|f| f.name.clone()),
        };

        Ok(ValidatedSchema {
            fields,
            primary_key: primary_key.to_string(),
            secret_field,
        })
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Primary-key field name
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Secret (password) field name, if the schema has one
    pub fn secret_field(&self) -> Option<&str> {
        self.secret_field.as_deref()
    }

    /// Looks up a field by exact name
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.field(name).map(|f| f.column_type)
    }

    /// Canonical definition, suitable for persisting and re-validating
    pub fn to_definition(&self) -> SchemaDefinition {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.column_type.as_str().to_string()))
            .collect()
    }

    /// Whether an introspected column set matches this schema (order-insensitive)
    pub fn matches_columns(&self, columns: &[(String, ColumnType)]) -> bool {
        if columns.len() != self.fields.len() {
            return false;
        }
        self.fields.iter().all(|f| {
            columns
                .iter()
                .any(|(name, ty)| name == &f.name && *ty == f.column_type)
        })
    }

    /// Whether an existing table has this schema's columns and is keyed on
    /// exactly its primary-key field
    ///
    /// A table with the right columns but a different (or missing) key would
    /// not enforce signup uniqueness, so it does not count as a match.
    pub fn matches_table(&self, columns: &[(String, ColumnType)], key_columns: &[String]) -> bool {
        self.matches_columns(columns)
            && key_columns.len() == 1
            && key_columns[0] == self.primary_key
    }
}

/// Checks a field name against the identifier grammar
///
/// Returns a human-readable reason on failure.
pub fn validate_identifier(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("field name must not be empty".to_string());
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(format!(
            "field name '{}' exceeds {} characters",
            name, MAX_IDENTIFIER_LEN
        ));
    }

    let mut bytes = name.bytes();
    let first_ok = bytes
        .next()
        .map(|b| b.is_ascii_alphabetic() || b == b'_')
        .unwrap_or(false);
    if !first_ok || !bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err(format!(
            "field name '{}' must contain only letters, digits and underscores and must not start with a digit",
            name.escape_debug()
        ));
    }

    Ok(())
}
