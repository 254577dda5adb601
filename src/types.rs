//! Field and table type definitions
//!
//! Includes field types (shared by metadata and the PostgreSQL adapter), column
//! definitions, and join-table definitions mapping record paths to columns.

use serde::{Deserialize, Serialize};

use crate::descriptor::RelationshipDescriptor;
use crate::sql::sanitize::{validate_identifier, validate_path};

// ============================================================================
// Field Types
// ============================================================================

/// Field type with validation, coercion and SQL mapping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ColumnType {
    /// Text field (maps to TEXT)
    String,

    /// Integer field (maps to BIGINT)
    Integer,

    /// Decimal field with precision and scale (maps to NUMERIC)
    Decimal {
        #[serde(default = "default_precision")]
        precision: u8,
        #[serde(default = "default_scale")]
        scale: u8,
    },

    /// Boolean field (maps to BOOLEAN)
    Boolean,

    /// Timestamp field, always stored in UTC (maps to TIMESTAMP WITH TIME ZONE)
    Timestamp,

    /// JSON field (maps to JSONB)
    Json,

    /// Enum field with allowed values
    Enum { values: Vec<String> },
}

fn default_precision() -> u8 {
    19
}

fn default_scale() -> u8 {
    4
}

impl ColumnType {
    /// Create a Decimal type with specified precision and scale
    pub fn decimal(precision: u8, scale: u8) -> Self {
        ColumnType::Decimal { precision, scale }
    }

    /// Convert to a PostgreSQL type string
    pub fn to_sql_type(&self, column_name: &str) -> String {
        match self {
            ColumnType::String => "TEXT".to_string(),
            ColumnType::Integer => "BIGINT".to_string(),
            ColumnType::Decimal { precision, scale } => {
                format!("NUMERIC({},{})", precision, scale)
            }
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Timestamp => "TIMESTAMP WITH TIME ZONE".to_string(),
            ColumnType::Json => "JSONB".to_string(),
            ColumnType::Enum { values } => format!(
                "TEXT CHECK ({} IN ({}))",
                crate::sql::sanitize::quote_identifier(column_name),
                values
                    .iter()
                    .map(|v| format!("'{}'", v.replace('\'', "''")))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    /// Validate that a JSON value is compatible with this type
    pub fn validate_value(&self, value: &serde_json::Value) -> Result<(), String> {
        if value.is_null() {
            return Ok(());
        }

        match (self, value) {
            (ColumnType::String, serde_json::Value::String(_)) => Ok(()),
            (ColumnType::Integer, serde_json::Value::Number(n)) if n.is_i64() => Ok(()),
            (ColumnType::Decimal { .. }, serde_json::Value::Number(_)) => Ok(()),
            (ColumnType::Boolean, serde_json::Value::Bool(_)) => Ok(()),
            (ColumnType::Json, _) => Ok(()),
            (_, serde_json::Value::String(s)) => self.coerce(s).map(|_| ()),
            _ => Err(format!("Type mismatch: expected {:?}, got {:?}", self, value)),
        }
    }

    /// Convert a submitted string into a typed JSON value
    pub fn coerce(&self, raw: &str) -> Result<serde_json::Value, String> {
        match self {
            ColumnType::String => Ok(serde_json::Value::String(raw.to_string())),
            ColumnType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(serde_json::Value::from)
                .map_err(|_| format!("Cannot convert '{}' to integer", raw)),
            ColumnType::Decimal { .. } => raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .ok_or_else(|| format!("Cannot convert '{}' to decimal", raw)),
            ColumnType::Boolean => match raw.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(serde_json::Value::Bool(true)),
                "false" | "0" | "no" => Ok(serde_json::Value::Bool(false)),
                _ => Err(format!("Cannot convert '{}' to boolean", raw)),
            },
            ColumnType::Timestamp => chrono::DateTime::parse_from_rfc3339(raw.trim())
                .map(|ts| serde_json::Value::String(ts.with_timezone(&chrono::Utc).to_rfc3339()))
                .map_err(|e| format!("Invalid timestamp format: {}", e)),
            ColumnType::Json => serde_json::from_str(raw)
                .or_else(|_| Ok(serde_json::Value::String(raw.to_string()))),
            ColumnType::Enum { values } => {
                if values.iter().any(|v| v == raw) {
                    Ok(serde_json::Value::String(raw.to_string()))
                } else {
                    Err(format!("Value '{}' not in enum values: {:?}", raw, values))
                }
            }
        }
    }
}

fn default_nullable() -> bool {
    true
}

/// Column definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDefinition {
    /// Column name (must be a valid PostgreSQL identifier)
    pub name: String,

    #[serde(flatten)]
    pub column_type: ColumnType,

    /// Whether the column allows NULL values (default: true)
    #[serde(default = "default_nullable")]
    pub nullable: bool,

    /// Default value (SQL expression)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "default")]
    pub default_value: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            default_value: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

// ============================================================================
// Join Tables
// ============================================================================

/// A column bound to the record path it stores
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinColumn {
    /// Record path (e.g. `category.id`)
    pub path: String,
    #[serde(flatten)]
    pub definition: ColumnDefinition,
}

/// Physical layout of a join entity type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinTable {
    /// Entity type stored in this table
    pub entity_type: String,
    pub table_name: String,
    /// Path of the BIGSERIAL identity column named `id`
    pub identity_path: String,
    pub columns: Vec<JoinColumn>,
    /// Paths covered by a unique index (the endpoint pair)
    #[serde(default)]
    pub unique_paths: Vec<String>,
}

/// Default column name for a path: dots become underscores
pub fn column_name_for_path(path: &str) -> String {
    path.replace('.', "_").to_lowercase()
}

impl JoinTable {
    pub fn new(entity_type: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            table_name: table_name.into(),
            identity_path: "id".to_string(),
            columns: Vec::new(),
            unique_paths: Vec::new(),
        }
    }

    /// Derive a table from a descriptor: both endpoint ids plus the sort field
    pub fn for_descriptor(descriptor: &RelationshipDescriptor, table_name: impl Into<String>) -> Self {
        let mut table = Self::new(descriptor.join_entity_type.clone(), table_name)
            .column(
                descriptor.linked_id_path(),
                ColumnType::Integer,
                false,
            )
            .column(
                descriptor.target_id_path(),
                ColumnType::Integer,
                false,
            );
        if let Some(sort_field) = &descriptor.sort_field {
            table = table.column(sort_field.clone(), ColumnType::Integer, true);
        }
        table.unique_over(vec![descriptor.linked_id_path(), descriptor.target_id_path()])
    }

    /// Add a column named after its path
    pub fn column(self, path: impl Into<String>, column_type: ColumnType, nullable: bool) -> Self {
        let path = path.into();
        let mut definition = ColumnDefinition::new(column_name_for_path(&path), column_type);
        definition.nullable = nullable;
        self.column_definition(path, definition)
    }

    /// Add a column with an explicit definition
    pub fn column_definition(mut self, path: impl Into<String>, definition: ColumnDefinition) -> Self {
        self.columns.push(JoinColumn {
            path: path.into(),
            definition,
        });
        self
    }

    pub fn unique_over(mut self, paths: Vec<String>) -> Self {
        self.unique_paths = paths;
        self
    }

    pub fn column_for_path(&self, path: &str) -> Option<&JoinColumn> {
        self.columns.iter().find(|c| c.path == path)
    }

    /// Column name for a path, including the identity path
    pub fn column_name(&self, path: &str) -> Option<&str> {
        if path == self.identity_path {
            return Some("id");
        }
        self.column_for_path(path).map(|c| c.definition.name.as_str())
    }

    /// Validate table and column names, and that unique paths are mapped
    pub fn validate(&self) -> Result<(), String> {
        validate_identifier(&self.table_name, &[])?;
        validate_path(&self.identity_path)?;
        for column in &self.columns {
            validate_path(&column.path)?;
            validate_identifier(&column.definition.name, &["id"])?;
        }
        for path in &self.unique_paths {
            if self.column_for_path(path).is_none() {
                return Err(format!("Unique path '{}' has no column", path));
            }
        }
        Ok(())
    }
}
