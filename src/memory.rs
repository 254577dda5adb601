//! In-memory storage and criteria execution for one join entity type
//!
//! Writes apply immediately, so `flush` and `clear_identity_cache` only count their calls.

use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::collaborator::{CriteriaTranslator, FieldAccess, Storage};
use crate::criteria::{FilterRequest, compare_json_values, json_value_to_string};
use crate::error::{Result, StoreError};

type Factory<R> = Box<dyn Fn() -> R + Send + Sync>;

/// Join records of one entity type held in memory
pub struct MemoryStore<R> {
    entity_type: String,
    access: Arc<dyn FieldAccess<R>>,
    factory: Factory<R>,
    identity_field: String,
    rows: Mutex<Vec<R>>,
    next_id: AtomicI64,
    flushes: AtomicUsize,
    clears: AtomicUsize,
}

impl<R> MemoryStore<R>
where
    R: Clone + Send + Sync + 'static,
{
    /// Create an empty store; `factory` builds fresh records for `instantiate`
    pub fn new<F>(entity_type: impl Into<String>, access: Arc<dyn FieldAccess<R>>, factory: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
    {
        Self {
            entity_type: entity_type.into(),
            access,
            factory: Box::new(factory),
            identity_field: "id".to_string(),
            rows: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            flushes: AtomicUsize::new(0),
            clears: AtomicUsize::new(0),
        }
    }

    /// Set the identity field assigned on insert (default: "id")
    pub fn with_identity_field(mut self, field: impl Into<String>) -> Self {
        self.identity_field = field.into();
        self
    }

    /// Snapshot of every stored row in insertion order
    pub async fn rows(&self) -> Vec<R> {
        self.rows.lock().await.clone()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(AtomicOrdering::SeqCst)
    }

    pub fn clear_count(&self) -> usize {
        self.clears.load(AtomicOrdering::SeqCst)
    }

    fn check_type(&self, entity_type: &str) -> Result<()> {
        if entity_type == self.entity_type {
            Ok(())
        } else {
            Err(StoreError::UnknownEntityType(entity_type.to_string()))
        }
    }

    fn value(&self, record: &R, path: &str) -> serde_json::Value {
        self.access
            .get(record, path)
            .unwrap_or(serde_json::Value::Null)
    }

    fn identity(&self, record: &R) -> Result<Option<String>> {
        let value = self.access.get(record, &self.identity_field)?;
        Ok((!value.is_null()).then(|| json_value_to_string(&value)))
    }

    fn position_of(&self, rows: &[R], id: &str) -> Result<Option<usize>> {
        for (i, row) in rows.iter().enumerate() {
            if self.identity(row)?.as_deref() == Some(id) {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    /// Rows matching the filter's condition, sorted by its directives
    fn matching(&self, rows: &[R], filter: &FilterRequest) -> Vec<R> {
        let mut matched: Vec<R> = rows
            .iter()
            .filter(|row| match &filter.condition {
                Some(condition) => condition.matches(&|path: &str| self.access.get(row, path).ok()),
                None => true,
            })
            .cloned()
            .collect();

        if !filter.sort.is_empty() {
            matched.sort_by(|a, b| {
                for directive in &filter.sort {
                    let ordering = compare_json_values(
                        &self.value(a, &directive.path),
                        &self.value(b, &directive.path),
                    );
                    let ordering = if directive.ascending {
                        ordering
                    } else {
                        ordering.reverse()
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }
        matched
    }
}

#[async_trait]
impl<R> CriteriaTranslator<R> for MemoryStore<R>
where
    R: Clone + Send + Sync + 'static,
{
    async fn query(&self, entity_type: &str, filter: &FilterRequest) -> Result<(Vec<R>, i64)> {
        self.check_type(entity_type)?;
        let rows = self.rows.lock().await;
        let matched = self.matching(&rows, filter);
        let total = matched.len() as i64;

        let offset = filter.offset.max(0) as usize;
        let page: Vec<R> = match filter.limit {
            Some(limit) => matched
                .into_iter()
                .skip(offset)
                .take(limit.max(0) as usize)
                .collect(),
            None => matched.into_iter().skip(offset).collect(),
        };
        Ok((page, total))
    }

    async fn count(&self, entity_type: &str, filter: &FilterRequest) -> Result<i64> {
        self.check_type(entity_type)?;
        let rows = self.rows.lock().await;
        Ok(self.matching(&rows, filter).len() as i64)
    }
}

#[async_trait]
impl<R> Storage<R> for MemoryStore<R>
where
    R: Clone + Send + Sync + 'static,
{
    async fn instantiate(&self, entity_type: &str) -> Result<R> {
        self.check_type(entity_type)?;
        Ok((self.factory)())
    }

    async fn merge(&self, mut record: R) -> Result<R> {
        let mut rows = self.rows.lock().await;

        match self.identity(&record)? {
            None => {
                let id = self.next_id.fetch_add(1, AtomicOrdering::SeqCst);
                self.access
                    .set(&mut record, &self.identity_field, id.into())?;
                debug!(id, "Inserted in-memory row");
                rows.push(record.clone());
            }
            Some(id) => {
                match self.position_of(&rows, &id)? {
                    Some(i) => rows[i] = record.clone(),
                    None => {
                        if let Ok(numeric) = id.parse::<i64>() {
                            self.next_id.fetch_max(numeric + 1, AtomicOrdering::SeqCst);
                        }
                        rows.push(record.clone());
                    }
                }
            }
        }
        Ok(record)
    }

    async fn remove(&self, record: &R) -> Result<()> {
        let id = self
            .identity(record)?
            .ok_or_else(|| StoreError::validation("Cannot remove a record without identity"))?;

        let mut rows = self.rows.lock().await;
        let position = self.position_of(&rows, &id)?.ok_or_else(|| {
            StoreError::not_found(format!(
                "{} with identity {} not found",
                self.entity_type, id
            ))
        })?;
        rows.remove(position);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(())
    }

    async fn clear_identity_cache(&self) -> Result<()> {
        self.clears.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(())
    }
}
