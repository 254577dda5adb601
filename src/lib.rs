//! # runtara-join-store
//!
//! Metadata-driven CRUD for join-structure records: rows that link two entities,
//! optionally ordered among their siblings by an integer sort field.
//!
//! Neither the join table nor the linked entities are known at compile time. A
//! [`RelationshipDescriptor`] names the join entity type, the two endpoint identifier
//! paths and the sort field. [`JoinStructureOperations`] then adds, updates, removes and
//! fetches join records through collaborator traits:
//!
//! - [`FieldAccess`]: get/set a field of a record by path
//! - [`CriteriaTranslator`]: execute filter requests
//! - [`Storage`]: instantiate, merge, remove, flush
//! - [`Projector`]: record <-> property bag
//! - [`MetadataProvider`]: field metadata of an entity type
//!
//! ## Features
//!
//! - **Idempotent add**: adding an existing link returns it instead of inserting a duplicate
//! - **Contiguous ordering**: sort values among siblings stay 1..N across add and reorder
//! - **Inverse descriptors**: swap which submitted endpoint is the linked side
//! - **Typed failures**: validation, not-found, metadata, lookup and mutation errors
//! - **Reference collaborators**: an in-memory store and a PostgreSQL adapter
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use runtara_join_store::{
//!     ColumnType, Entity, FieldAccess, FieldMetadata, FieldProjector, JoinStructureOperations,
//!     JsonFieldAccess, JsonRecord, MemoryStore, PersistencePackage, RelationshipDescriptor,
//!     StaticMetadataProvider,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let access: Arc<dyn FieldAccess<JsonRecord>> = Arc::new(JsonFieldAccess);
//! let store = Arc::new(MemoryStore::new("CategoryProduct", Arc::clone(&access), || {
//!     JsonRecord::with_paths("CategoryProduct", ["id", "category.id", "product.id", "displayOrder"])
//! }));
//! let metadata = StaticMetadataProvider::new()
//!     .with_entity(
//!         "CategoryProduct",
//!         vec![
//!             FieldMetadata::new("category.id", ColumnType::Integer).not_null(),
//!             FieldMetadata::new("product.id", ColumnType::Integer).not_null(),
//!             FieldMetadata::new("displayOrder", ColumnType::Integer),
//!         ],
//!     )
//!     .with_entity("Product", vec![FieldMetadata::new("id", ColumnType::Integer)]);
//!
//! let operations = JoinStructureOperations::new(
//!     Arc::clone(&access),
//!     store.clone(),
//!     store.clone(),
//!     Arc::new(FieldProjector::new(access)),
//!     Arc::new(metadata),
//! );
//!
//! let descriptor =
//!     RelationshipDescriptor::new("allParentCategories", "CategoryProduct", "category", "product")
//!         .with_sort_field("displayOrder");
//! let package = PersistencePackage::new("Product", descriptor).with_entity(
//!     Entity::new("Product")
//!         .with("category.id", "5")
//!         .with("product.id", "42"),
//! );
//!
//! let added = operations.add(&package).await?;
//! assert_eq!(added.value("displayOrder"), Some("1"));
//! # Ok(())
//! # }
//! ```
//!
//! ## PostgreSQL
//!
//! [`PgJoinStore`] implements storage, criteria execution and metadata for registered
//! [`JoinTable`]s:
//!
//! ```rust,no_run
//! use runtara_join_store::{JoinTable, PgJoinStore, RelationshipDescriptor, StoreConfig};
//!
//! # async fn run() -> runtara_join_store::Result<()> {
//! let store = PgJoinStore::new(StoreConfig::builder("postgres://localhost/mydb").build()).await?;
//! let descriptor =
//!     RelationshipDescriptor::new("allParentCategories", "CategoryProduct", "category", "product")
//!         .with_sort_field("displayOrder");
//! store
//!     .register_table(JoinTable::for_descriptor(&descriptor, "category_product"))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! A store built on the pool autocommits every statement. To make one operation atomic,
//! build the operations over a transaction-scoped store and finish the transaction
//! yourself:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use runtara_join_store::{
//!     FieldAccess, FieldProjector, JoinStructureOperations, JsonFieldAccess, JsonRecord,
//!     MetadataProvider, PersistencePackage, PgJoinStore,
//! };
//!
//! # async fn run(
//! #     store: &PgJoinStore,
//! #     metadata: Arc<dyn MetadataProvider>,
//! #     package: PersistencePackage,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let tx = Arc::new(store.begin().await?);
//! let access: Arc<dyn FieldAccess<JsonRecord>> = Arc::new(JsonFieldAccess);
//! let operations = JoinStructureOperations::new(
//!     Arc::clone(&access),
//!     tx.clone(),
//!     tx.clone(),
//!     Arc::new(FieldProjector::new(access)),
//!     metadata,
//! );
//!
//! match operations.update(&package).await {
//!     Ok(_) => tx.commit().await?,
//!     Err(e) => {
//!         tx.rollback().await?;
//!         return Err(e.into());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Pool sizing stays with the caller.

pub mod collaborator;
pub mod config;
pub mod criteria;
pub mod descriptor;
pub mod entity;
pub mod error;
pub mod memory;
pub mod metadata;
pub mod operations;
pub mod projector;
pub mod record;
pub mod sequence;
pub mod sql;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use collaborator::{CriteriaTranslator, FieldAccess, ProjectionContext, Projector, Storage};
pub use config::{
    OperationsConfig, OperationsConfigBuilder, SortPersistence, StoreConfig, StoreConfigBuilder,
};
pub use criteria::{
    Condition, CriteriaMapping, Criterion, FilterRequest, FilterSortCriteria, SortDirective,
    condition_helpers, translate,
};
pub use descriptor::{EndpointIds, RelationshipDescriptor};
pub use entity::{DynamicResultSet, Entity, IdValue, Property};
pub use error::{JoinStructureError, Result, StoreError};
pub use memory::MemoryStore;
pub use metadata::{
    AggregateMetadata, ChainedMetadataProvider, FieldMetadata, FieldMetadataMap, FieldOverride,
    MergedPropertyType, MetadataJoiner, MetadataProvider, MetadataRequest, StaticMetadataProvider,
};
pub use operations::{
    JoinStructureOperations, OperationType, PersistencePackage, PersistencePerspective,
};
pub use projector::FieldProjector;
pub use record::{FieldRegistry, JsonFieldAccess, JsonRecord};
pub use sequence::SortSequencer;
pub use store::PgJoinStore;
pub use types::{ColumnDefinition, ColumnType, JoinColumn, JoinTable};

// Re-export SQL utilities for advanced users
pub use sql::condition::{SqlParam, SqlQuery, build_condition_clause, build_order_by_clause};
pub use sql::ddl::DdlGenerator;
pub use sql::sanitize::{quote_identifier, validate_identifier, validate_path};
