//! Metadata-driven projection between records and property bags

use std::sync::Arc;

use crate::collaborator::{FieldAccess, ProjectionContext, Projector};
use crate::criteria::json_value_to_string;
use crate::entity::Entity;
use crate::error::{Result, StoreError};
use crate::metadata::FieldMetadataMap;

/// Projects records through a [`FieldAccess`], typing values with field metadata
pub struct FieldProjector<R> {
    access: Arc<dyn FieldAccess<R>>,
}

impl<R> Clone for FieldProjector<R> {
    fn clone(&self) -> Self {
        Self {
            access: Arc::clone(&self.access),
        }
    }
}

impl<R> FieldProjector<R> {
    pub fn new(access: Arc<dyn FieldAccess<R>>) -> Self {
        Self { access }
    }

    fn read(&self, record: &R, path: &str) -> Result<Option<String>> {
        let value = self.access.get(record, path)?;
        Ok((!value.is_null()).then(|| json_value_to_string(&value)))
    }
}

impl<R> Projector<R> for FieldProjector<R> {
    /// Emit the join fields first, then the target's fields as `target_path.field`.
    /// Fields the record does not carry are skipped.
    fn to_entity(&self, record: &R, context: &ProjectionContext) -> Result<Entity> {
        let mut entity = Entity::new(context.ceiling_entity.clone());

        for path in context.join_fields.keys() {
            if self.access.has_field(record, path) {
                entity.set(path.clone(), self.read(record, path)?);
            }
        }

        for name in context.target_fields.keys() {
            let path = format!("{}.{}", context.target_path, name);
            if entity.find_property(&path).is_none() && self.access.has_field(record, &path) {
                let value = self.read(record, &path)?;
                entity.set(path, value);
            }
        }

        Ok(entity)
    }

    fn populate(&self, record: &mut R, entity: &Entity, fields: &FieldMetadataMap) -> Result<()> {
        for property in &entity.properties {
            let Some(field) = fields.get(&property.name) else {
                continue;
            };

            let value = match property.value.as_deref() {
                None => {
                    if !field.nullable {
                        return Err(StoreError::validation(format!(
                            "Field '{}' cannot be null",
                            field.name
                        )));
                    }
                    serde_json::Value::Null
                }
                Some(raw) => field
                    .field_type
                    .coerce(raw)
                    .map_err(|e| StoreError::validation(format!("Field '{}': {}", field.name, e)))?,
            };

            self.access.set(record, &property.name, value)?;
        }
        Ok(())
    }
}
