//! End-to-end tests for join-structure operations over the in-memory store
//!
//! Records are a typed struct exposed through a `FieldRegistry`.

use std::collections::BTreeMap;
use std::sync::Arc;

use runtara_join_store::record::{optional_i64, optional_string, required_i64};
use runtara_join_store::{
    AggregateMetadata, ColumnType, Entity, FieldAccess, FieldMetadata, FieldProjector,
    FieldRegistry, FilterSortCriteria, JoinStructureError, JoinStructureOperations,
    MemoryStore, MergedPropertyType, MetadataJoiner, OperationsConfig, PersistencePackage,
    RelationshipDescriptor, SortPersistence, StaticMetadataProvider,
};

#[derive(Debug, Clone, Default, PartialEq)]
struct CategoryProduct {
    id: Option<i64>,
    category_id: i64,
    product_id: i64,
    product_name: Option<String>,
    display_order: Option<i64>,
    featured: bool,
}

fn registry() -> FieldRegistry<CategoryProduct> {
    FieldRegistry::new()
        .field(
            "id",
            |r: &CategoryProduct| r.id.into(),
            |r, v| {
                r.id = optional_i64("id", &v)?;
                Ok(())
            },
        )
        .field(
            "category.id",
            |r: &CategoryProduct| r.category_id.into(),
            |r, v| {
                r.category_id = required_i64("category.id", &v)?;
                Ok(())
            },
        )
        .field(
            "product.id",
            |r: &CategoryProduct| r.product_id.into(),
            |r, v| {
                r.product_id = required_i64("product.id", &v)?;
                Ok(())
            },
        )
        .field(
            "product.name",
            |r: &CategoryProduct| r.product_name.clone().into(),
            |r, v| {
                r.product_name = optional_string(&v);
                Ok(())
            },
        )
        .field(
            "displayOrder",
            |r: &CategoryProduct| r.display_order.into(),
            |r, v| {
                r.display_order = optional_i64("displayOrder", &v)?;
                Ok(())
            },
        )
        .field(
            "featured",
            |r: &CategoryProduct| r.featured.into(),
            |r, v| {
                r.featured = v.as_bool().unwrap_or(false);
                Ok(())
            },
        )
}

fn metadata() -> StaticMetadataProvider {
    StaticMetadataProvider::new()
        .with_entity(
            "CategoryProduct",
            vec![
                FieldMetadata::new("id", ColumnType::Integer),
                FieldMetadata::new("category.id", ColumnType::Integer).not_null(),
                FieldMetadata::new("product.id", ColumnType::Integer).not_null(),
                FieldMetadata::new("displayOrder", ColumnType::Integer),
                FieldMetadata::new("featured", ColumnType::Boolean).not_null(),
            ],
        )
        .with_entity(
            "Product",
            vec![
                FieldMetadata::new("id", ColumnType::Integer),
                FieldMetadata::new("name", ColumnType::String).friendly_name("Product name"),
            ],
        )
}

struct Fixture {
    store: Arc<MemoryStore<CategoryProduct>>,
    ops: JoinStructureOperations<CategoryProduct>,
}

fn fixture(config: OperationsConfig) -> Fixture {
    let access: Arc<dyn FieldAccess<CategoryProduct>> = Arc::new(registry());
    let store = Arc::new(MemoryStore::new(
        "CategoryProduct",
        Arc::clone(&access),
        CategoryProduct::default,
    ));
    let ops = JoinStructureOperations::new(
        Arc::clone(&access),
        store.clone(),
        store.clone(),
        Arc::new(FieldProjector::new(access)),
        Arc::new(metadata()),
    )
    .with_config(config);
    Fixture { store, ops }
}

fn default_fixture() -> Fixture {
    fixture(OperationsConfig::default())
}

fn descriptor() -> RelationshipDescriptor {
    RelationshipDescriptor::new("allParentCategories", "CategoryProduct", "category", "product")
        .with_sort_field("displayOrder")
}

fn package(descriptor: RelationshipDescriptor, category: &str, product: &str) -> PersistencePackage {
    PersistencePackage::new("Product", descriptor).with_entity(
        Entity::new("Product")
            .with("category.id", category)
            .with("product.id", product),
    )
}

fn link(category: &str, product: &str) -> PersistencePackage {
    package(descriptor(), category, product)
}

/// (product id, display order) of the stored rows for a category, by product id
async fn positions(store: &MemoryStore<CategoryProduct>, category: i64) -> BTreeMap<i64, Option<i64>> {
    store
        .rows()
        .await
        .into_iter()
        .filter(|r| r.category_id == category)
        .map(|r| (r.product_id, r.display_order))
        .collect()
}

fn in_category(category: &str) -> FilterSortCriteria {
    FilterSortCriteria::new().filter("allParentCategories", category)
}

// ==================== Add ====================

#[tokio::test]
async fn test_add_is_idempotent() {
    let fx = default_fixture();

    let first = fx.ops.add(&link("5", "42")).await.unwrap();
    let second = fx.ops.add(&link("5", "42")).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.value("id"), Some("1"));
    assert_eq!(fx.store.rows().await.len(), 1);
}

#[tokio::test]
async fn test_add_appends_contiguous_positions() {
    let fx = default_fixture();

    for product in ["42", "43", "44"] {
        fx.ops.add(&link("5", product)).await.unwrap();
    }
    let other = fx.ops.add(&link("6", "42")).await.unwrap();

    assert_eq!(
        positions(&fx.store, 5).await,
        BTreeMap::from([(42, Some(1)), (43, Some(2)), (44, Some(3))])
    );
    assert_eq!(other.value("displayOrder"), Some("1"));
}

#[tokio::test]
async fn test_add_populates_attributes_and_clears_identity() {
    let fx = default_fixture();
    let mut package = link("5", "42");
    if let Some(entity) = package.entity.as_mut() {
        entity.set("featured", Some("true".to_string()));
        entity.set("id", Some("77".to_string()));
        entity.set("displayOrder", Some("9".to_string()));
    }

    let added = fx.ops.add(&package).await.unwrap();

    assert_eq!(added.value("featured"), Some("true"));
    assert_eq!(added.value("id"), Some("1"));
    assert_eq!(added.value("displayOrder"), Some("1"));
}

#[tokio::test]
async fn test_add_without_sort_field_leaves_order_unset() {
    let fx = default_fixture();
    let unordered =
        RelationshipDescriptor::new("allParentCategories", "CategoryProduct", "category", "product");

    fx.ops.add(&package(unordered, "5", "42")).await.unwrap();

    assert_eq!(positions(&fx.store, 5).await, BTreeMap::from([(42, None)]));
}

// ==================== Update ====================

#[tokio::test]
async fn test_update_reorders_siblings() {
    let fx = default_fixture();
    let first = fx.ops.add(&link("5", "42")).await.unwrap();
    let second = fx.ops.add(&link("5", "43")).await.unwrap();
    assert_eq!(first.value("displayOrder"), Some("1"));
    assert_eq!(second.value("displayOrder"), Some("2"));

    let mut package = link("5", "43");
    if let Some(entity) = package.entity.as_mut() {
        entity.set("displayOrder", Some("1".to_string()));
    }
    let echoed = fx.ops.update(&package).await.unwrap();

    assert_eq!(Some(&echoed), package.entity.as_ref());
    assert_eq!(
        positions(&fx.store, 5).await,
        BTreeMap::from([(42, Some(2)), (43, Some(1))])
    );

    let page = fx.ops.fetch(&link("5", "0"), &in_category("5")).await.unwrap();
    let order: Vec<_> = page
        .records
        .iter()
        .map(|e| e.value("product.id").map(str::to_string))
        .collect();
    assert_eq!(order, vec![Some("43".to_string()), Some("42".to_string())]);
}

#[tokio::test]
async fn test_update_position_is_clamped() {
    let fx = default_fixture();
    for product in ["42", "43", "44"] {
        fx.ops.add(&link("5", product)).await.unwrap();
    }

    let mut package = link("5", "42");
    if let Some(entity) = package.entity.as_mut() {
        entity.set("displayOrder", Some("99".to_string()));
    }
    fx.ops.update(&package).await.unwrap();

    assert_eq!(
        positions(&fx.store, 5).await,
        BTreeMap::from([(42, Some(3)), (43, Some(1)), (44, Some(2))])
    );
}

#[tokio::test]
async fn test_renumbered_set_persists_every_shifted_sibling() {
    let fx = fixture(
        OperationsConfig::builder()
            .sort_persistence(SortPersistence::RenumberedSet)
            .build(),
    );
    for product in ["42", "43", "44"] {
        fx.ops.add(&link("5", product)).await.unwrap();
    }

    let mut package = link("5", "44");
    if let Some(entity) = package.entity.as_mut() {
        entity.set("displayOrder", Some("1".to_string()));
    }
    fx.ops.update(&package).await.unwrap();

    assert_eq!(
        positions(&fx.store, 5).await,
        BTreeMap::from([(42, Some(2)), (43, Some(3)), (44, Some(1))])
    );
}

#[tokio::test]
async fn test_moved_only_persists_just_the_moved_record() {
    let fx = fixture(
        OperationsConfig::builder()
            .sort_persistence(SortPersistence::MovedOnly)
            .build(),
    );
    for product in ["42", "43", "44"] {
        fx.ops.add(&link("5", product)).await.unwrap();
    }

    let mut package = link("5", "44");
    if let Some(entity) = package.entity.as_mut() {
        entity.set("displayOrder", Some("1".to_string()));
    }
    fx.ops.update(&package).await.unwrap();

    // Shifted siblings keep their stored values
    assert_eq!(
        positions(&fx.store, 5).await,
        BTreeMap::from([(42, Some(1)), (43, Some(2)), (44, Some(1))])
    );
}

#[tokio::test]
async fn test_update_without_reorder_preserves_position() {
    let fx = default_fixture();
    fx.ops.add(&link("5", "42")).await.unwrap();
    fx.ops.add(&link("5", "43")).await.unwrap();

    let mut package = link("5", "42");
    if let Some(entity) = package.entity.as_mut() {
        entity.set("featured", Some("yes".to_string()));
    }
    fx.ops.update(&package).await.unwrap();

    let rows = fx.store.rows().await;
    let updated = rows.iter().find(|r| r.product_id == 42).unwrap();
    assert!(updated.featured);
    assert_eq!(updated.display_order, Some(1));
    assert_eq!(
        positions(&fx.store, 5).await,
        BTreeMap::from([(42, Some(1)), (43, Some(2))])
    );
}

#[tokio::test]
async fn test_update_missing_link_is_not_found() {
    let fx = default_fixture();
    fx.ops.add(&link("5", "42")).await.unwrap();

    let err = fx.ops.update(&link("5", "99")).await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.status_code(), 404);
}

// ==================== Remove ====================

#[tokio::test]
async fn test_remove_then_fetch() {
    let fx = default_fixture();
    for product in ["42", "43", "44"] {
        fx.ops.add(&link("5", product)).await.unwrap();
    }
    let before = fx.ops.fetch(&link("5", "0"), &in_category("5")).await.unwrap();

    fx.ops.remove(&link("5", "43")).await.unwrap();
    let after = fx.ops.fetch(&link("5", "0"), &in_category("5")).await.unwrap();

    assert_eq!(after.total_count, before.total_count - 1);
    assert!(
        after
            .records
            .iter()
            .all(|e| e.value("product.id") != Some("43"))
    );
    // Remaining siblings are not renumbered
    assert_eq!(
        positions(&fx.store, 5).await,
        BTreeMap::from([(42, Some(1)), (44, Some(3))])
    );
}

#[tokio::test]
async fn test_remove_missing_link_is_not_found() {
    let fx = default_fixture();

    let err = fx.ops.remove(&link("5", "42")).await.unwrap_err();

    assert!(matches!(err, JoinStructureError::NotFound { .. }));
}

#[tokio::test]
async fn test_add_after_remove_appends_at_count_plus_one() {
    let fx = default_fixture();
    for product in ["1", "2", "3"] {
        fx.ops.add(&link("5", product)).await.unwrap();
    }
    fx.ops.remove(&link("5", "2")).await.unwrap();

    let added = fx.ops.add(&link("5", "4")).await.unwrap();

    // Remove leaves a gap, so the next add repeats the last position
    assert_eq!(added.value("displayOrder"), Some("3"));
    assert_eq!(
        positions(&fx.store, 5).await,
        BTreeMap::from([(1, Some(1)), (3, Some(3)), (4, Some(3))])
    );

    // Any reorder renumbers the whole sibling set
    let mut package = link("5", "4");
    if let Some(entity) = package.entity.as_mut() {
        entity.set("displayOrder", Some("3".to_string()));
    }
    fx.ops.update(&package).await.unwrap();
    assert_eq!(
        positions(&fx.store, 5).await,
        BTreeMap::from([(1, Some(1)), (3, Some(2)), (4, Some(3))])
    );
}

// ==================== Inverse ====================

#[tokio::test]
async fn test_inverse_symmetry() {
    let inverse = default_fixture();
    let forward = default_fixture();

    inverse
        .ops
        .add(&package(descriptor().inverse(), "5", "42"))
        .await
        .unwrap();
    forward
        .ops
        .add(&package(descriptor(), "42", "5"))
        .await
        .unwrap();

    assert_eq!(inverse.store.rows().await, forward.store.rows().await);

    inverse
        .ops
        .remove(&package(descriptor().inverse(), "5", "42"))
        .await
        .unwrap();
    assert!(inverse.store.rows().await.is_empty());
}

#[tokio::test]
async fn test_inverse_update_reads_endpoints_as_submitted() {
    let fx = default_fixture();
    fx.ops
        .add(&package(descriptor().inverse(), "5", "42"))
        .await
        .unwrap();

    // Stored as category 42 -> product 5; update does not swap endpoints
    let err = fx
        .ops
        .update(&package(descriptor().inverse(), "5", "42"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let mut stored_orientation = package(descriptor().inverse(), "42", "5");
    if let Some(entity) = stored_orientation.entity.as_mut() {
        entity.set("featured", Some("true".to_string()));
    }
    fx.ops.update(&stored_orientation).await.unwrap();
    assert!(fx.store.rows().await[0].featured);

    fx.ops
        .remove(&package(descriptor().inverse(), "5", "42"))
        .await
        .unwrap();
    assert!(fx.store.rows().await.is_empty());
}

// ==================== Fetch ====================

#[tokio::test]
async fn test_fetch_projects_join_and_target_fields() {
    let fx = default_fixture();
    fx.ops.add(&link("5", "42")).await.unwrap();

    let page = fx.ops.fetch(&link("5", "0"), &in_category("5")).await.unwrap();

    assert_eq!(page.total_count, 1);
    let entity = &page.records[0];
    assert_eq!(entity.entity_type, "Product");
    assert_eq!(entity.value("category.id"), Some("5"));
    assert_eq!(entity.value("product.id"), Some("42"));
    assert_eq!(entity.value("displayOrder"), Some("1"));
    assert!(entity.find_property("product.name").is_some());
}

#[tokio::test]
async fn test_fetch_by_target_and_page() {
    let fx = default_fixture();
    for product in ["42", "43", "44"] {
        fx.ops.add(&link("5", product)).await.unwrap();
    }
    fx.ops.add(&link("6", "43")).await.unwrap();

    let by_target = FilterSortCriteria::new().filter("allParentCategoriesTarget", "43");
    let page = fx.ops.fetch(&link("5", "0"), &by_target).await.unwrap();
    assert_eq!(page.total_count, 2);

    let paged = in_category("5").sort("displayOrder", false).paginate(1, 1);
    let page = fx.ops.fetch(&link("5", "0"), &paged).await.unwrap();
    assert_eq!(page.total_count, 3);
    assert_eq!(page.records.len(), 1);
    assert_eq!(page.records[0].value("product.id"), Some("43"));
}

// ==================== Failures ====================

#[tokio::test]
async fn test_malformed_identifiers_are_validation_failures() {
    let fx = default_fixture();

    let err = fx.ops.add(&link("5", "abc")).await.unwrap_err();
    assert!(matches!(err, JoinStructureError::ValidationFailure { .. }));

    let err = fx
        .ops
        .fetch(&link("5", "0"), &in_category("five"))
        .await
        .unwrap_err();
    assert!(matches!(err, JoinStructureError::ValidationFailure { .. }));
    assert!(fx.store.rows().await.is_empty());
}

#[tokio::test]
async fn test_merged_properties() {
    let fx = default_fixture();

    let joined = fx
        .ops
        .update_merged_properties(&link("5", "42"), AggregateMetadata::new(), &BTreeMap::new())
        .await
        .unwrap();
    let fields = joined.get(MergedPropertyType::JoinStructure).unwrap();
    assert!(fields.contains_key("featured"));
    assert_eq!(MetadataJoiner::extract_properties(&joined).len(), fields.len());

    let unknown = RelationshipDescriptor::new("rel", "Unknown", "left", "right");
    let err = fx
        .ops
        .update_merged_properties(
            &package(unknown, "1", "2"),
            AggregateMetadata::new(),
            &BTreeMap::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, JoinStructureError::MetadataFailure { .. }));
}
