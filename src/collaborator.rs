//! Collaborator traits used by [`JoinStructureOperations`](crate::JoinStructureOperations)
//!
//! The operations never touch a record directly: field access, query execution,
//! persistence and projection all go through these traits. `R` is the opaque join
//! record type.

use async_trait::async_trait;

use crate::criteria::FilterRequest;
use crate::entity::Entity;
use crate::error::Result;
use crate::metadata::FieldMetadataMap;

/// Get and set named fields on a record
pub trait FieldAccess<R>: Send + Sync {
    /// Read a field; absent and null fields both read as `Value::Null`
    fn get(&self, record: &R, path: &str) -> Result<serde_json::Value>;

    fn set(&self, record: &mut R, path: &str, value: serde_json::Value) -> Result<()>;

    fn has_field(&self, record: &R, path: &str) -> bool;
}

/// Executes filter requests against stored join records
#[async_trait]
pub trait CriteriaTranslator<R>: Send + Sync {
    /// Matching records for one page plus the total match count
    async fn query(&self, entity_type: &str, filter: &FilterRequest) -> Result<(Vec<R>, i64)>;

    async fn count(&self, entity_type: &str, filter: &FilterRequest) -> Result<i64>;
}

/// Record lifecycle
#[async_trait]
pub trait Storage<R>: Send + Sync {
    /// A fresh, unsaved record of the entity type
    async fn instantiate(&self, entity_type: &str) -> Result<R>;

    /// Insert or update; returns the record as stored
    async fn merge(&self, record: R) -> Result<R>;

    async fn remove(&self, record: &R) -> Result<()>;

    async fn flush(&self) -> Result<()>;

    /// Forget cached record identities so the next query reads from storage
    async fn clear_identity_cache(&self) -> Result<()>;
}

/// What a projection should emit for one record
#[derive(Debug, Clone, Default)]
pub struct ProjectionContext {
    /// Entity type stamped on the projected entity
    pub ceiling_entity: String,
    /// Fields of the join record, by path
    pub join_fields: FieldMetadataMap,
    /// Fields of the target entity, relative to `target_path`
    pub target_fields: FieldMetadataMap,
    pub target_path: String,
}

/// Converts between records and property bags
pub trait Projector<R>: Send + Sync {
    fn to_entity(&self, record: &R, context: &ProjectionContext) -> Result<Entity>;

    /// Write submitted properties that have metadata onto `record`
    fn populate(&self, record: &mut R, entity: &Entity, fields: &FieldMetadataMap) -> Result<()>;
}
