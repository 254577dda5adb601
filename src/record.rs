//! Record types and their field accessors
//!
//! [`JsonRecord`] is a dynamic record keyed by path, read through [`JsonFieldAccess`].
//! [`FieldRegistry`] gives typed structs the same capability through registered
//! getter/setter closures.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::collaborator::FieldAccess;
use crate::error::{Result, StoreError};

// ============================================================================
// Dynamic Records
// ============================================================================

/// Join record with values keyed by path (e.g. `category.id`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonRecord {
    pub entity_type: String,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl JsonRecord {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            fields: serde_json::Map::new(),
        }
    }

    /// Create a record with every path present and null
    pub fn with_paths<'a, I>(entity_type: impl Into<String>, paths: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut record = Self::new(entity_type);
        for path in paths {
            record
                .fields
                .insert(path.to_string(), serde_json::Value::Null);
        }
        record
    }

    pub fn with(mut self, path: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(path.into(), value);
        self
    }

    pub fn get(&self, path: &str) -> Option<&serde_json::Value> {
        self.fields.get(path)
    }
}

/// Field access over [`JsonRecord`]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFieldAccess;

impl FieldAccess<JsonRecord> for JsonFieldAccess {
    fn get(&self, record: &JsonRecord, path: &str) -> Result<serde_json::Value> {
        Ok(record.get(path).cloned().unwrap_or(serde_json::Value::Null))
    }

    fn set(&self, record: &mut JsonRecord, path: &str, value: serde_json::Value) -> Result<()> {
        record.fields.insert(path.to_string(), value);
        Ok(())
    }

    fn has_field(&self, record: &JsonRecord, path: &str) -> bool {
        record.fields.contains_key(path)
    }
}

// ============================================================================
// Registered Accessors
// ============================================================================

type Getter<R> = Arc<dyn Fn(&R) -> serde_json::Value + Send + Sync>;
type Setter<R> = Arc<dyn Fn(&mut R, serde_json::Value) -> Result<()> + Send + Sync>;

struct Accessor<R> {
    get: Getter<R>,
    set: Option<Setter<R>>,
}

impl<R> Clone for Accessor<R> {
    fn clone(&self) -> Self {
        Self {
            get: Arc::clone(&self.get),
            set: self.set.clone(),
        }
    }
}

/// Accessor table for a typed record
///
/// # Example
/// ```
/// use runtara_join_store::record::{FieldRegistry, optional_i64};
/// use runtara_join_store::FieldAccess;
///
/// #[derive(Default)]
/// struct Row {
///     sort: Option<i64>,
/// }
///
/// let registry = FieldRegistry::<Row>::new().field(
///     "sort",
///     |r| r.sort.into(),
///     |r, v| {
///         r.sort = optional_i64("sort", &v)?;
///         Ok(())
///     },
/// );
///
/// let mut row = Row::default();
/// registry.set(&mut row, "sort", 3.into()).unwrap();
/// assert_eq!(row.sort, Some(3));
/// ```
pub struct FieldRegistry<R> {
    accessors: HashMap<String, Accessor<R>>,
}

impl<R> Clone for FieldRegistry<R> {
    fn clone(&self) -> Self {
        Self {
            accessors: self.accessors.clone(),
        }
    }
}

impl<R> Default for FieldRegistry<R> {
    fn default() -> Self {
        Self {
            accessors: HashMap::new(),
        }
    }
}

impl<R> FieldRegistry<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a readable and writable field
    pub fn field<G, S>(mut self, path: impl Into<String>, get: G, set: S) -> Self
    where
        G: Fn(&R) -> serde_json::Value + Send + Sync + 'static,
        S: Fn(&mut R, serde_json::Value) -> Result<()> + Send + Sync + 'static,
    {
        self.accessors.insert(
            path.into(),
            Accessor {
                get: Arc::new(get),
                set: Some(Arc::new(set)),
            },
        );
        self
    }

    /// Register a field that can be read but not written
    pub fn read_only<G>(mut self, path: impl Into<String>, get: G) -> Self
    where
        G: Fn(&R) -> serde_json::Value + Send + Sync + 'static,
    {
        self.accessors.insert(
            path.into(),
            Accessor {
                get: Arc::new(get),
                set: None,
            },
        );
        self
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.accessors.keys().map(String::as_str)
    }

    fn accessor(&self, path: &str) -> Result<&Accessor<R>> {
        self.accessors
            .get(path)
            .ok_or_else(|| StoreError::field(path, "no accessor registered"))
    }
}

impl<R> FieldAccess<R> for FieldRegistry<R>
where
    R: Send + Sync,
{
    fn get(&self, record: &R, path: &str) -> Result<serde_json::Value> {
        Ok((self.accessor(path)?.get)(record))
    }

    fn set(&self, record: &mut R, path: &str, value: serde_json::Value) -> Result<()> {
        let setter = self
            .accessor(path)?
            .set
            .as_ref()
            .ok_or_else(|| StoreError::field(path, "field is read-only"))?;
        setter(record, value)
    }

    fn has_field(&self, _record: &R, path: &str) -> bool {
        self.accessors.contains_key(path)
    }
}

/// Read a nullable integer value for a setter
pub fn optional_i64(path: &str, value: &serde_json::Value) -> Result<Option<i64>> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| StoreError::field(path, format!("expected integer, got {}", n))),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| StoreError::field(path, format!("expected integer, got '{}'", s))),
        other => Err(StoreError::field(
            path,
            format!("expected integer, got {}", other),
        )),
    }
}

/// Read a required integer value for a setter
pub fn required_i64(path: &str, value: &serde_json::Value) -> Result<i64> {
    optional_i64(path, value)?.ok_or_else(|| StoreError::field(path, "value cannot be null"))
}

/// Read a nullable text value for a setter; non-strings use their JSON text
pub fn optional_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default)]
    struct Row {
        id: Option<i64>,
        owner: i64,
        label: Option<String>,
    }

    fn registry() -> FieldRegistry<Row> {
        FieldRegistry::new()
            .field(
                "id",
                |r: &Row| r.id.into(),
                |r, v| {
                    r.id = optional_i64("id", &v)?;
                    Ok(())
                },
            )
            .field(
                "owner.id",
                |r: &Row| r.owner.into(),
                |r, v| {
                    r.owner = required_i64("owner.id", &v)?;
                    Ok(())
                },
            )
            .read_only("label", |r: &Row| r.label.clone().into())
    }

    // ==================== JsonRecord ====================

    #[test]
    fn test_json_access() {
        let access = JsonFieldAccess;
        let mut record = JsonRecord::with_paths("Join", ["id", "left.id"]);

        assert!(access.has_field(&record, "id"));
        assert!(!access.has_field(&record, "right.id"));
        assert_eq!(access.get(&record, "id").unwrap(), json!(null));

        access.set(&mut record, "left.id", json!(7)).unwrap();
        assert_eq!(access.get(&record, "left.id").unwrap(), json!(7));
        assert_eq!(access.get(&record, "missing").unwrap(), json!(null));
    }

    #[test]
    fn test_json_record_serialization() {
        let record = JsonRecord::new("Join").with("left.id", json!(1));
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"entityType":"Join","fields":{"left.id":1}}"#);
    }

    // ==================== FieldRegistry ====================

    #[test]
    fn test_registry_get_set() {
        let registry = registry();
        let mut row = Row::default();

        registry.set(&mut row, "owner.id", json!("12")).unwrap();
        registry.set(&mut row, "id", json!(3)).unwrap();
        assert_eq!(row.owner, 12);
        assert_eq!(registry.get(&row, "id").unwrap(), json!(3));

        registry.set(&mut row, "id", json!(null)).unwrap();
        assert_eq!(row.id, None);
        assert!(registry.has_field(&row, "label"));
        assert!(!registry.has_field(&row, "other"));
    }

    #[test]
    fn test_registry_errors() {
        let registry = registry();
        let mut row = Row::default();

        let err = registry.set(&mut row, "label", json!("x")).unwrap_err();
        assert!(err.to_string().contains("read-only"));

        let err = registry.get(&row, "other").unwrap_err();
        assert!(matches!(err, StoreError::Field { ref path, .. } if path == "other"));

        assert!(registry.set(&mut row, "owner.id", json!(null)).is_err());
        assert!(registry.set(&mut row, "owner.id", json!(true)).is_err());
    }

    #[test]
    fn test_optional_string() {
        assert_eq!(optional_string(&json!("a")), Some("a".to_string()));
        assert_eq!(optional_string(&json!(5)), Some("5".to_string()));
        assert_eq!(optional_string(&json!(null)), None);
    }
}
