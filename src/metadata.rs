//! Field metadata and the join-structure metadata joiner
//!
//! A [`MetadataProvider`] resolves the fields of an entity type. [`MetadataJoiner`] adds the
//! join entity's fields to an [`AggregateMetadata`] under
//! [`MergedPropertyType::JoinStructure`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use crate::entity::Property;
use crate::error::{JoinStructureError, Result, StoreError};
use crate::operations::PersistencePackage;
use crate::types::ColumnType;

/// Which part of an aggregate a field belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergedPropertyType {
    /// Fields of the ceiling entity itself
    Primary,
    /// Fields of a join record
    JoinStructure,
}

/// Presentation and typing information for one field path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMetadata {
    pub name: String,
    pub field_type: ColumnType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    pub merged_type: MergedPropertyType,
}

fn default_nullable() -> bool {
    true
}

impl FieldMetadata {
    pub fn new(name: impl Into<String>, field_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
            friendly_name: None,
            merged_type: MergedPropertyType::Primary,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = Some(name.into());
        self
    }
}

/// Field metadata keyed by path
pub type FieldMetadataMap = BTreeMap<String, FieldMetadata>;

/// Caller-supplied adjustment to one field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(default)]
    pub excluded: bool,
}

// ============================================================================
// Requests + Providers
// ============================================================================

/// Which fields of an entity type to resolve
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRequest {
    pub entity_type: String,
    /// Stamped onto every returned field
    pub merged_type: MergedPropertyType,
    /// When non-empty, only these paths are returned
    pub include_fields: Vec<String>,
    pub exclude_fields: Vec<String>,
    /// Whether dotted paths into to-one relations are returned
    pub populate_to_one_fields: bool,
    /// Paths kept regardless of the filters above
    pub required_fields: Vec<String>,
    pub overrides: BTreeMap<String, FieldOverride>,
}

impl MetadataRequest {
    pub fn new(entity_type: impl Into<String>, merged_type: MergedPropertyType) -> Self {
        Self {
            entity_type: entity_type.into(),
            merged_type,
            include_fields: Vec::new(),
            exclude_fields: Vec::new(),
            populate_to_one_fields: true,
            required_fields: Vec::new(),
            overrides: BTreeMap::new(),
        }
    }

    fn keeps(&self, path: &str) -> bool {
        if self.required_fields.iter().any(|f| f == path) {
            return true;
        }
        if self.overrides.get(path).is_some_and(|o| o.excluded) {
            return false;
        }
        if !self.include_fields.is_empty() && !self.include_fields.iter().any(|f| f == path) {
            return false;
        }
        if self.exclude_fields.iter().any(|f| f == path) {
            return false;
        }
        self.populate_to_one_fields || !path.contains('.')
    }

    /// Filter a full field list down to this request, applying overrides
    pub fn apply<I>(&self, fields: I) -> FieldMetadataMap
    where
        I: IntoIterator<Item = FieldMetadata>,
    {
        fields
            .into_iter()
            .filter(|field| self.keeps(&field.name))
            .map(|mut field| {
                field.merged_type = self.merged_type;
                if let Some(name) = self
                    .overrides
                    .get(&field.name)
                    .and_then(|o| o.friendly_name.clone())
                {
                    field.friendly_name = Some(name);
                }
                (field.name.clone(), field)
            })
            .collect()
    }
}

/// Resolves the fields of an entity type
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn merged_properties(&self, request: &MetadataRequest) -> Result<FieldMetadataMap>;
}

/// Metadata provider over a fixed set of entity types
#[derive(Debug, Clone, Default)]
pub struct StaticMetadataProvider {
    entities: HashMap<String, Vec<FieldMetadata>>,
}

impl StaticMetadataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the fields of an entity type
    pub fn with_entity(mut self, entity_type: impl Into<String>, fields: Vec<FieldMetadata>) -> Self {
        self.entities.insert(entity_type.into(), fields);
        self
    }
}

#[async_trait]
impl MetadataProvider for StaticMetadataProvider {
    async fn merged_properties(&self, request: &MetadataRequest) -> Result<FieldMetadataMap> {
        let fields = self
            .entities
            .get(&request.entity_type)
            .ok_or_else(|| StoreError::UnknownEntityType(request.entity_type.clone()))?;
        Ok(request.apply(fields.iter().cloned()))
    }
}

/// Asks each provider in turn until one knows the entity type
#[derive(Clone, Default)]
pub struct ChainedMetadataProvider {
    providers: Vec<Arc<dyn MetadataProvider>>,
}

impl ChainedMetadataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Arc<dyn MetadataProvider>) -> Self {
        self.providers.push(provider);
        self
    }
}

#[async_trait]
impl MetadataProvider for ChainedMetadataProvider {
    async fn merged_properties(&self, request: &MetadataRequest) -> Result<FieldMetadataMap> {
        for provider in &self.providers {
            match provider.merged_properties(request).await {
                Err(StoreError::UnknownEntityType(_)) => continue,
                other => return other,
            }
        }
        Err(StoreError::UnknownEntityType(request.entity_type.clone()))
    }
}

// ============================================================================
// Aggregate
// ============================================================================

/// Field metadata of one request, grouped by merged property type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateMetadata {
    groups: BTreeMap<MergedPropertyType, FieldMetadataMap>,
}

impl AggregateMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new aggregate with `fields` stored under `kind`
    pub fn with(mut self, kind: MergedPropertyType, fields: FieldMetadataMap) -> Self {
        self.groups.insert(kind, fields);
        self
    }

    pub fn get(&self, kind: MergedPropertyType) -> Option<&FieldMetadataMap> {
        self.groups.get(&kind)
    }

    pub fn contains(&self, kind: MergedPropertyType) -> bool {
        self.groups.contains_key(&kind)
    }
}

// ============================================================================
// Joiner
// ============================================================================

/// Merges join-entity field metadata into an aggregate
#[derive(Clone)]
pub struct MetadataJoiner {
    provider: Arc<dyn MetadataProvider>,
}

impl MetadataJoiner {
    pub fn new(provider: Arc<dyn MetadataProvider>) -> Self {
        Self { provider }
    }

    /// Build the metadata request for the join entity of a package
    pub fn join_request(
        package: &PersistencePackage,
        overrides: &BTreeMap<String, FieldOverride>,
    ) -> MetadataRequest {
        let descriptor = &package.descriptor;
        let perspective = &package.perspective;

        let mut required = vec![descriptor.linked_id_path(), descriptor.target_id_path()];
        required.extend(descriptor.sort_field.clone());

        MetadataRequest {
            entity_type: descriptor.join_entity_type.clone(),
            merged_type: MergedPropertyType::JoinStructure,
            include_fields: perspective.include_fields.clone(),
            exclude_fields: perspective.exclude_fields.clone(),
            populate_to_one_fields: perspective.populate_to_one_fields,
            required_fields: required,
            overrides: overrides.clone(),
        }
    }

    /// Resolve the join entity's fields and add them to `aggregate`
    #[instrument(skip_all, fields(ceiling = %package.ceiling_entity))]
    pub async fn join(
        &self,
        package: &PersistencePackage,
        aggregate: AggregateMetadata,
        overrides: &BTreeMap<String, FieldOverride>,
    ) -> std::result::Result<AggregateMetadata, JoinStructureError> {
        let request = Self::join_request(package, overrides);

        match self.provider.merged_properties(&request).await {
            Ok(fields) => Ok(aggregate.with(MergedPropertyType::JoinStructure, fields)),
            Err(e) => {
                error!(error = %e, "Problem fetching results for {}", package.ceiling_entity);
                Err(JoinStructureError::metadata(
                    package.descriptor.join_entity_type.clone(),
                    e,
                ))
            }
        }
    }

    /// The join-structure fields of an aggregate as value-less properties
    pub fn extract_properties(aggregate: &AggregateMetadata) -> Vec<Property> {
        aggregate
            .get(MergedPropertyType::JoinStructure)
            .map(|fields| fields.keys().map(Property::null).collect())
            .unwrap_or_default()
    }
}
