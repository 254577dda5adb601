//! Join-structure CRUD
//!
//! [`JoinStructureOperations`] adds, updates, removes and fetches join records through
//! the collaborator traits. Every public operation reports failures as a
//! [`JoinStructureError`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use crate::collaborator::{CriteriaTranslator, FieldAccess, ProjectionContext, Projector, Storage};
use crate::config::{OperationsConfig, SortPersistence};
use crate::criteria::{FilterRequest, FilterSortCriteria, translate};
use crate::descriptor::RelationshipDescriptor;
use crate::entity::{DynamicResultSet, Entity};
use crate::error::{JoinStructureError, Result, StoreError};
use crate::metadata::{
    AggregateMetadata, FieldMetadataMap, FieldOverride, MergedPropertyType, MetadataJoiner,
    MetadataProvider, MetadataRequest,
};
use crate::record::optional_i64;
use crate::sequence::SortSequencer;

/// Kind of persistence operation a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationType {
    Basic,
    JoinStructure,
}

fn default_populate_to_one() -> bool {
    true
}

/// Field selection settings of a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistencePerspective {
    #[serde(default)]
    pub include_fields: Vec<String>,
    #[serde(default)]
    pub exclude_fields: Vec<String>,
    #[serde(default = "default_populate_to_one")]
    pub populate_to_one_fields: bool,
}

impl Default for PersistencePerspective {
    fn default() -> Self {
        Self {
            include_fields: Vec::new(),
            exclude_fields: Vec::new(),
            populate_to_one_fields: true,
        }
    }
}

/// One operation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistencePackage {
    /// Target entity type the request is issued for
    pub ceiling_entity: String,
    pub descriptor: RelationshipDescriptor,
    /// Submitted properties; required by add, update and remove
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<Entity>,
    /// Not supported for join structures; logged and ignored
    #[serde(default)]
    pub custom_criteria: Vec<String>,
    #[serde(default)]
    pub perspective: PersistencePerspective,
}

impl PersistencePackage {
    pub fn new(ceiling_entity: impl Into<String>, descriptor: RelationshipDescriptor) -> Self {
        Self {
            ceiling_entity: ceiling_entity.into(),
            descriptor,
            entity: None,
            custom_criteria: Vec::new(),
            perspective: PersistencePerspective::default(),
        }
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn with_custom_criteria(mut self, criteria: Vec<String>) -> Self {
        self.custom_criteria = criteria;
        self
    }

    pub fn with_perspective(mut self, perspective: PersistencePerspective) -> Self {
        self.perspective = perspective;
        self
    }

    fn submitted(&self) -> Result<&Entity> {
        self.entity
            .as_ref()
            .ok_or_else(|| StoreError::validation("Request carries no entity"))
    }
}

type OpResult<T> = std::result::Result<T, JoinStructureError>;

/// CRUD over join records of one record type `R`
pub struct JoinStructureOperations<R> {
    access: Arc<dyn FieldAccess<R>>,
    translator: Arc<dyn CriteriaTranslator<R>>,
    storage: Arc<dyn Storage<R>>,
    projector: Arc<dyn Projector<R>>,
    metadata: Arc<dyn MetadataProvider>,
    joiner: MetadataJoiner,
    config: OperationsConfig,
}

impl<R> JoinStructureOperations<R> {
    pub fn new(
        access: Arc<dyn FieldAccess<R>>,
        translator: Arc<dyn CriteriaTranslator<R>>,
        storage: Arc<dyn Storage<R>>,
        projector: Arc<dyn Projector<R>>,
        metadata: Arc<dyn MetadataProvider>,
    ) -> Self {
        Self {
            access,
            translator,
            storage,
            projector,
            joiner: MetadataJoiner::new(Arc::clone(&metadata)),
            metadata,
            config: OperationsConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OperationsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &OperationsConfig {
        &self.config
    }

    /// These operations only handle join structures
    pub fn is_compatible(&self, operation: OperationType) -> bool {
        operation == OperationType::JoinStructure
    }

    /// Add the join entity's fields to `aggregate`
    pub async fn update_merged_properties(
        &self,
        package: &PersistencePackage,
        aggregate: AggregateMetadata,
        overrides: &BTreeMap<String, FieldOverride>,
    ) -> OpResult<AggregateMetadata> {
        self.joiner.join(package, aggregate, overrides).await
    }

    /// Fetch a page of join records projected for the ceiling entity
    #[instrument(skip_all, fields(ceiling = %package.ceiling_entity, join = %package.descriptor.join_entity_type))]
    pub async fn fetch(
        &self,
        package: &PersistencePackage,
        criteria: &FilterSortCriteria,
    ) -> OpResult<DynamicResultSet> {
        self.try_fetch(package, criteria).await.map_err(|e| {
            error!(error = %e, "Problem fetching results for {}", package.descriptor.join_entity_type);
            JoinStructureError::lookup(package.descriptor.join_entity_type.clone(), e)
        })
    }

    /// Link the submitted endpoints; returns the existing link when already present
    #[instrument(skip_all, fields(ceiling = %package.ceiling_entity, join = %package.descriptor.join_entity_type))]
    pub async fn add(&self, package: &PersistencePackage) -> OpResult<Entity> {
        warn_custom_criteria(package, "add");
        self.try_add(package).await.map_err(|e| {
            error!(error = %e, "Problem adding entity {}", package.ceiling_entity);
            JoinStructureError::mutation("adding", package.descriptor.join_entity_type.clone(), e)
        })
    }

    /// Update a link's attributes, reordering its siblings when a new position is submitted
    #[instrument(skip_all, fields(ceiling = %package.ceiling_entity, join = %package.descriptor.join_entity_type))]
    pub async fn update(&self, package: &PersistencePackage) -> OpResult<Entity> {
        warn_custom_criteria(package, "update");
        self.try_update(package).await.map_err(|e| {
            error!(error = %e, "Problem updating entity {}", package.ceiling_entity);
            JoinStructureError::mutation("updating", package.descriptor.join_entity_type.clone(), e)
        })
    }

    /// Remove the link between the submitted endpoints; siblings keep their positions
    #[instrument(skip_all, fields(ceiling = %package.ceiling_entity, join = %package.descriptor.join_entity_type))]
    pub async fn remove(&self, package: &PersistencePackage) -> OpResult<()> {
        warn_custom_criteria(package, "remove");
        self.try_remove(package).await.map_err(|e| {
            error!(error = %e, "Problem removing entity {}", package.ceiling_entity);
            JoinStructureError::mutation("removing", package.descriptor.join_entity_type.clone(), e)
        })
    }

    // ------------------------------------------------------------------------
    // Operation bodies
    // ------------------------------------------------------------------------

    async fn try_fetch(
        &self,
        package: &PersistencePackage,
        criteria: &FilterSortCriteria,
    ) -> Result<DynamicResultSet> {
        let descriptor = &package.descriptor;
        descriptor.validate()?;
        let context = self.projection_context(package).await?;

        let mapping = descriptor.criteria_mapping(&self.config.target_suffix);
        let mut request = translate(criteria, &mapping, Some(self.config.default_limit))?;
        if request.sort.is_empty() {
            if let Some(sort_field) = &descriptor.sort_field {
                request = request.with_sort(sort_field.clone(), descriptor.sort_ascending);
            }
        }

        let (records, total) = self
            .translator
            .query(&descriptor.join_entity_type, &request)
            .await?;
        debug!(count = records.len(), total, "Fetched join records");

        let entities = records
            .iter()
            .map(|record| self.projector.to_entity(record, &context))
            .collect::<Result<Vec<_>>>()?;

        Ok(DynamicResultSet::new(entities, total))
    }

    async fn try_add(&self, package: &PersistencePackage) -> Result<Entity> {
        let descriptor = &package.descriptor;
        descriptor.validate()?;
        let entity = package.submitted()?;
        let ids = descriptor.resolve_endpoints(entity)?;
        let context = self.projection_context(package).await?;
        let entity_type = &descriptor.join_entity_type;

        let pair = self.endpoint_filter(descriptor, ids.linked, Some(ids.target))?;
        let (existing, _) = self.translator.query(entity_type, &pair).await?;
        if let Some(record) = existing.first() {
            debug!(linked = ids.linked, target = ids.target, "Link already present");
            return self.projector.to_entity(record, &context);
        }

        let mut record = self.storage.instantiate(entity_type).await?;
        self.projector
            .populate(&mut record, entity, &self.writable_fields(&context.join_fields))?;
        self.access
            .set(&mut record, &descriptor.linked_id_path(), ids.linked.into())?;
        self.access
            .set(&mut record, &descriptor.target_id_path(), ids.target.into())?;
        if self.access.has_field(&record, &self.config.identity_field) {
            self.access
                .set(&mut record, &self.config.identity_field, serde_json::Value::Null)?;
        }

        if let Some(sort_field) = &descriptor.sort_field {
            let siblings = self.endpoint_filter(descriptor, ids.linked, None)?;
            let count = self.translator.count(entity_type, &siblings).await?;
            let position = SortSequencer::next_position(count);
            self.access.set(&mut record, sort_field, position.into())?;
        }

        self.storage.merge(record).await?;
        self.storage.flush().await?;
        self.storage.clear_identity_cache().await?;

        let (inserted, _) = self.translator.query(entity_type, &pair).await?;
        let record = inserted.first().ok_or_else(|| {
            StoreError::database(format!(
                "{} linking {} to {} was not readable after insert",
                entity_type, ids.linked, ids.target
            ))
        })?;
        self.projector.to_entity(record, &context)
    }

    async fn try_update(&self, package: &PersistencePackage) -> Result<Entity> {
        let descriptor = &package.descriptor;
        descriptor.validate()?;
        let entity = package.submitted()?;
        let entity_type = &descriptor.join_entity_type;

        let linked_path = descriptor.linked_id_path();
        let target_path = descriptor.target_id_path();
        let linked = entity.id_value(&linked_path).require(&linked_path)?;
        let target = entity.id_value(&target_path).require(&target_path)?;

        let join_fields = self.writable_fields(&self.join_fields(descriptor).await?);

        let mut request = self.endpoint_filter(descriptor, linked, None)?;
        if let Some(sort_field) = &descriptor.sort_field {
            request = request.with_sort(sort_field.clone(), true);
        }
        let (mut siblings, _) = self.translator.query(entity_type, &request).await?;

        let mut index = None;
        for (i, record) in siblings.iter().enumerate() {
            if optional_i64(&target_path, &self.access.get(record, &target_path)?)? == Some(target) {
                index = Some(i);
                break;
            }
        }
        let index = index.ok_or_else(|| {
            StoreError::not_found(format!(
                "No {} links {} to {}",
                entity_type, linked, target
            ))
        })?;

        let position = match &descriptor.sort_field {
            Some(sort_field) => entity
                .value(sort_field)
                .map(|raw| {
                    raw.trim().parse::<i64>().map_err(|_| {
                        StoreError::validation(format!(
                            "Sort position '{}' for '{}' is not numeric",
                            raw, sort_field
                        ))
                    })
                })
                .transpose()?
                .map(|position| (sort_field, position)),
            None => None,
        };

        match position {
            Some((sort_field, position)) => {
                let moved = SortSequencer::reinsert(&mut siblings, index, position)
                    .ok_or_else(|| StoreError::not_found("Sibling vanished during update"))?;
                self.projector
                    .populate(&mut siblings[moved], entity, &join_fields)?;

                let current = siblings
                    .iter()
                    .map(|record| optional_i64(sort_field, &self.access.get(record, sort_field)?))
                    .collect::<Result<Vec<_>>>()?;
                let changes = SortSequencer::renumber(&current);
                for (i, value) in &changes {
                    self.access.set(&mut siblings[*i], sort_field, (*value).into())?;
                }

                let mut dirty = BTreeSet::from([moved]);
                if self.config.sort_persistence == SortPersistence::RenumberedSet {
                    dirty.extend(changes.iter().map(|(i, _)| *i));
                }
                debug!(moved, persisted = dirty.len(), "Resequenced siblings");

                for (i, record) in siblings.into_iter().enumerate() {
                    if dirty.contains(&i) {
                        self.storage.merge(record).await?;
                    }
                }
            }
            None => {
                let mut record = siblings.swap_remove(index);
                self.projector.populate(&mut record, entity, &join_fields)?;
                self.storage.merge(record).await?;
            }
        }
        self.storage.flush().await?;

        Ok(entity.clone())
    }

    async fn try_remove(&self, package: &PersistencePackage) -> Result<()> {
        let descriptor = &package.descriptor;
        descriptor.validate()?;
        let entity = package.submitted()?;
        let ids = descriptor.resolve_endpoints(entity)?;

        let pair = self.endpoint_filter(descriptor, ids.linked, Some(ids.target))?;
        let (records, _) = self
            .translator
            .query(&descriptor.join_entity_type, &pair)
            .await?;
        let record = records.first().ok_or_else(|| {
            StoreError::not_found(format!(
                "No {} links {} to {}",
                descriptor.join_entity_type, ids.linked, ids.target
            ))
        })?;

        self.storage.remove(record).await?;
        self.storage.flush().await
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Unpaged filter on the linked id and, when given, the target id
    fn endpoint_filter(
        &self,
        descriptor: &RelationshipDescriptor,
        linked: i64,
        target: Option<i64>,
    ) -> Result<FilterRequest> {
        let suffix = &self.config.target_suffix;
        let mut criteria =
            FilterSortCriteria::new().filter(&descriptor.relationship_name, linked.to_string());
        if let Some(target) = target {
            criteria = criteria.filter(&descriptor.target_filter_name(suffix), target.to_string());
        }
        translate(&criteria, &descriptor.criteria_mapping(suffix), None)
    }

    async fn join_fields(&self, descriptor: &RelationshipDescriptor) -> Result<FieldMetadataMap> {
        let mut request =
            MetadataRequest::new(descriptor.join_entity_type.clone(), MergedPropertyType::JoinStructure);
        request.populate_to_one_fields = false;
        request.required_fields = vec![descriptor.linked_id_path(), descriptor.target_id_path()];
        request.required_fields.extend(descriptor.sort_field.clone());
        self.metadata.merged_properties(&request).await
    }

    async fn target_fields(&self, package: &PersistencePackage) -> Result<FieldMetadataMap> {
        let perspective = &package.perspective;
        let mut request =
            MetadataRequest::new(package.ceiling_entity.clone(), MergedPropertyType::Primary);
        request.include_fields = perspective.include_fields.clone();
        request.exclude_fields = perspective.exclude_fields.clone();
        request.populate_to_one_fields = perspective.populate_to_one_fields;
        self.metadata.merged_properties(&request).await
    }

    async fn projection_context(&self, package: &PersistencePackage) -> Result<ProjectionContext> {
        Ok(ProjectionContext {
            ceiling_entity: package.ceiling_entity.clone(),
            join_fields: self.join_fields(&package.descriptor).await?,
            target_fields: self.target_fields(package).await?,
            target_path: package.descriptor.target_path.clone(),
        })
    }

    /// Join fields a caller may write; the identity field is store-managed
    fn writable_fields(&self, fields: &FieldMetadataMap) -> FieldMetadataMap {
        let mut fields = fields.clone();
        fields.remove(&self.config.identity_field);
        fields
    }
}

fn warn_custom_criteria(package: &PersistencePackage, operation: &str) {
    if !package.custom_criteria.is_empty() {
        warn!(
            operation,
            criteria = ?package.custom_criteria,
            "Custom criteria are not supported for join structures and were ignored"
        );
    }
}
