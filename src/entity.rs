//! Property-bag types exchanged with callers
//!
//! Includes Property, Entity, DynamicResultSet and the IdValue identifier union.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// A single named value in an [`Entity`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Property path (e.g. `category.id`, `displayOrder`)
    pub name: String,
    /// String representation of the value; `None` for null
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn null(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

/// Generic ordered property bag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity type name this bag describes
    #[serde(rename = "entityType")]
    pub entity_type: String,
    /// Properties in insertion order
    pub properties: Vec<Property>,
}

impl Entity {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            properties: Vec::new(),
        }
    }

    /// Add or replace a property value
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, Some(value.into()));
        self
    }

    /// Set a property, replacing an existing one with the same name in place
    pub fn set(&mut self, name: impl Into<String>, value: Option<String>) {
        let name = name.into();
        match self.properties.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.value = value,
            None => self.properties.push(Property { name, value }),
        }
    }

    pub fn find_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Value of a property, treating an absent property and a null value alike
    pub fn value(&self, name: &str) -> Option<&str> {
        self.find_property(name).and_then(|p| p.value.as_deref())
    }

    /// Parse a property as an identifier
    pub fn id_value(&self, name: &str) -> IdValue {
        IdValue::parse(self.value(name))
    }
}

/// Identifier as submitted across the boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdValue {
    Long(i64),
    Missing,
    Invalid(String),
}

impl IdValue {
    /// Parse a decimal string; blank strings count as missing
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => IdValue::Missing,
            Some(s) => s
                .parse::<i64>()
                .map(IdValue::Long)
                .unwrap_or_else(|_| IdValue::Invalid(s.to_string())),
        }
    }

    /// Require a usable identifier for the named property
    pub fn require(self, name: &str) -> Result<i64> {
        match self {
            IdValue::Long(id) => Ok(id),
            IdValue::Missing => Err(StoreError::validation(format!(
                "Identifier property '{}' is required",
                name
            ))),
            IdValue::Invalid(raw) => Err(StoreError::validation(format!(
                "Identifier property '{}' is not numeric: '{}'",
                name, raw
            ))),
        }
    }
}

/// A page of projected entities plus the total match count
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicResultSet {
    pub records: Vec<Entity>,
    #[serde(rename = "totalCount")]
    pub total_count: i64,
}

impl DynamicResultSet {
    pub fn new(records: Vec<Entity>, total_count: i64) -> Self {
        Self {
            records,
            total_count,
        }
    }
}
