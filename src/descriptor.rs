//! Relationship descriptor for a join structure
//!
//! A descriptor names the join entity type, the two endpoint identifier paths, and the
//! optional sort field that orders siblings sharing a linked endpoint.

use serde::{Deserialize, Serialize};

use crate::criteria::CriteriaMapping;
use crate::entity::Entity;
use crate::error::{Result, StoreError};
use crate::sql::sanitize::validate_path;

fn default_id_property() -> String {
    "id".to_string()
}

fn default_sort_ascending() -> bool {
    true
}

/// Static description of a join relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipDescriptor {
    /// Logical name, used as the filter key for the linked endpoint
    pub relationship_name: String,
    /// Entity type of the join records
    pub join_entity_type: String,
    /// Path from the join record to the linked endpoint (e.g. `category`)
    pub linked_path: String,
    /// Identifier property on the linked endpoint (default: "id")
    #[serde(default = "default_id_property")]
    pub linked_id_property: String,
    /// Path from the join record to the target endpoint (e.g. `product`)
    pub target_path: String,
    /// Identifier property on the target endpoint (default: "id")
    #[serde(default = "default_id_property")]
    pub target_id_property: String,
    /// Integer field ordering siblings that share a linked endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_field: Option<String>,
    /// Sort direction used when fetching (default: true)
    #[serde(default = "default_sort_ascending")]
    pub sort_ascending: bool,
    /// Swap which submitted endpoint is treated as linked during add and remove
    #[serde(default)]
    pub inverse: bool,
}

/// Endpoint identifiers resolved from a submitted entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointIds {
    pub linked: i64,
    pub target: i64,
}

impl RelationshipDescriptor {
    pub fn new(
        relationship_name: impl Into<String>,
        join_entity_type: impl Into<String>,
        linked_path: impl Into<String>,
        target_path: impl Into<String>,
    ) -> Self {
        Self {
            relationship_name: relationship_name.into(),
            join_entity_type: join_entity_type.into(),
            linked_path: linked_path.into(),
            linked_id_property: default_id_property(),
            target_path: target_path.into(),
            target_id_property: default_id_property(),
            sort_field: None,
            sort_ascending: true,
            inverse: false,
        }
    }

    pub fn with_linked_id_property(mut self, property: impl Into<String>) -> Self {
        self.linked_id_property = property.into();
        self
    }

    pub fn with_target_id_property(mut self, property: impl Into<String>) -> Self {
        self.target_id_property = property.into();
        self
    }

    pub fn with_sort_field(mut self, field: impl Into<String>) -> Self {
        self.sort_field = Some(field.into());
        self
    }

    pub fn descending(mut self) -> Self {
        self.sort_ascending = false;
        self
    }

    pub fn inverse(mut self) -> Self {
        self.inverse = true;
        self
    }

    /// `linkedPath.linkedIdProperty`
    pub fn linked_id_path(&self) -> String {
        format!("{}.{}", self.linked_path, self.linked_id_property)
    }

    /// `targetPath.targetIdProperty`
    pub fn target_id_path(&self) -> String {
        format!("{}.{}", self.target_path, self.target_id_property)
    }

    pub fn target_filter_name(&self, suffix: &str) -> String {
        format!("{}{}", self.relationship_name, suffix)
    }

    /// Criteria mapping with integer-equality entries for both endpoints
    pub fn criteria_mapping(&self, target_suffix: &str) -> CriteriaMapping {
        CriteriaMapping::new()
            .long_eq(self.relationship_name.clone(), self.linked_id_path())
            .long_eq(self.target_filter_name(target_suffix), self.target_id_path())
    }

    /// Resolve the linked and target identifiers of a submitted entity.
    ///
    /// With `inverse` set, the value submitted under the target path becomes the
    /// linked identifier and vice versa.
    pub fn resolve_endpoints(&self, entity: &Entity) -> Result<EndpointIds> {
        let (linked_source, target_source) = if self.inverse {
            (self.target_id_path(), self.linked_id_path())
        } else {
            (self.linked_id_path(), self.target_id_path())
        };

        Ok(EndpointIds {
            linked: entity.id_value(&linked_source).require(&linked_source)?,
            target: entity.id_value(&target_source).require(&target_source)?,
        })
    }

    /// Check names and paths are usable before any query runs
    pub fn validate(&self) -> Result<()> {
        if self.relationship_name.trim().is_empty() {
            return Err(StoreError::validation("Relationship name cannot be empty"));
        }
        if self.join_entity_type.trim().is_empty() {
            return Err(StoreError::validation("Join entity type cannot be empty"));
        }

        let mut paths = vec![self.linked_id_path(), self.target_id_path()];
        if let Some(sort_field) = &self.sort_field {
            paths.push(sort_field.clone());
        }
        for path in &paths {
            validate_path(path).map_err(StoreError::Validation)?;
        }

        if self.linked_id_path() == self.target_id_path() {
            return Err(StoreError::validation(format!(
                "Linked and target paths must differ, both are '{}'",
                self.linked_id_path()
            )));
        }

        Ok(())
    }
}
