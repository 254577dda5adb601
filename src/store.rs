//! PgJoinStore - PostgreSQL storage for join records
//!
//! Join entity types are registered as [`JoinTable`]s mapping record paths to typed
//! columns. The store then executes filter requests, persists [`JsonRecord`]s and
//! reports field metadata for every registered type.
//!
//! A store built with [`PgJoinStore::new`] or [`PgJoinStore::from_pool`] runs each
//! statement on the pool, where it autocommits. [`PgJoinStore::begin`] opens a
//! transaction and returns a store whose statements all run on it until
//! [`commit`](PgJoinStore::commit) or [`rollback`](PgJoinStore::rollback).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgQueryResult, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::collaborator::{CriteriaTranslator, Storage};
use crate::config::StoreConfig;
use crate::criteria::FilterRequest;
use crate::error::{Result, StoreError};
use crate::metadata::{FieldMetadata, FieldMetadataMap, MetadataProvider, MetadataRequest};
use crate::record::{JsonRecord, optional_i64};
use crate::sql::condition::{SqlParam, SqlQuery, select_columns};
use crate::sql::ddl::DdlGenerator;
use crate::sql::sanitize::quote_identifier;
use crate::types::{ColumnDefinition, ColumnType, JoinTable};

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>;

/// Join-record store backed by PostgreSQL
///
/// Statements write through, so `flush` and `clear_identity_cache` have nothing to do.
/// Run an operation inside one transaction by building the operations over the store
/// returned from [`begin`](Self::begin).
pub struct PgJoinStore {
    /// Database connection pool
    pool: PgPool,
    /// Store configuration
    config: StoreConfig,
    /// Registered join tables by entity type, shared with transaction-scoped stores
    tables: Arc<RwLock<HashMap<String, JoinTable>>>,
    /// Open transaction of a store returned by `begin`; `None` once finished
    transaction: Option<Mutex<Option<Transaction<'static, Postgres>>>>,
}

impl PgJoinStore {
    /// Connect to the configured database
    pub async fn new(config: StoreConfig) -> Result<Self> {
        let pool = PgPool::connect(&config.database_url).await.map_err(|e| {
            StoreError::Connection(format!("Database connection failed: {}", e))
        })?;

        Ok(Self::from_pool(pool, config))
    }

    /// Create a store sharing an existing pool
    pub fn from_pool(pool: PgPool, config: StoreConfig) -> Self {
        Self {
            pool,
            config,
            tables: Arc::new(RwLock::new(HashMap::new())),
            transaction: None,
        }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Open a transaction and return a store that runs every statement on it
    ///
    /// The returned store shares this store's registered tables. Dropping it without
    /// committing rolls the transaction back.
    pub async fn begin(&self) -> Result<PgJoinStore> {
        let transaction = self.pool.begin().await.map_err(|e| {
            StoreError::transaction(format!("Failed to begin transaction: {}", e))
        })?;
        debug!("Began join store transaction");

        Ok(Self {
            pool: self.pool.clone(),
            config: self.config.clone(),
            tables: Arc::clone(&self.tables),
            transaction: Some(Mutex::new(Some(transaction))),
        })
    }

    /// True for a store returned by [`begin`](Self::begin)
    pub fn is_transactional(&self) -> bool {
        self.transaction.is_some()
    }

    /// Commit the open transaction; later statements on this store fail
    pub async fn commit(&self) -> Result<()> {
        let transaction = self.take_transaction().await?;
        transaction.commit().await.map_err(|e| {
            StoreError::transaction(format!("Failed to commit transaction: {}", e))
        })?;
        debug!("Committed join store transaction");
        Ok(())
    }

    /// Roll back the open transaction; later statements on this store fail
    pub async fn rollback(&self) -> Result<()> {
        let transaction = self.take_transaction().await?;
        transaction.rollback().await.map_err(|e| {
            StoreError::transaction(format!("Failed to roll back transaction: {}", e))
        })?;
        debug!("Rolled back join store transaction");
        Ok(())
    }

    async fn take_transaction(&self) -> Result<Transaction<'static, Postgres>> {
        let slot = self
            .transaction
            .as_ref()
            .ok_or_else(|| StoreError::transaction("Store was not opened with begin()"))?;
        slot.lock().await.take().ok_or_else(Self::finished)
    }

    fn finished() -> StoreError {
        StoreError::transaction("Transaction has already been committed or rolled back")
    }

    // =========================================================================
    // Statement Execution
    // =========================================================================

    async fn fetch_all(&self, query: PgQuery<'_>) -> Result<Vec<PgRow>> {
        match &self.transaction {
            None => Ok(query.fetch_all(&self.pool).await?),
            Some(slot) => {
                let mut guard = slot.lock().await;
                let transaction = guard.as_mut().ok_or_else(Self::finished)?;
                Ok(query.fetch_all(&mut **transaction).await?)
            }
        }
    }

    async fn fetch_optional(&self, query: PgQuery<'_>) -> Result<Option<PgRow>> {
        match &self.transaction {
            None => Ok(query.fetch_optional(&self.pool).await?),
            Some(slot) => {
                let mut guard = slot.lock().await;
                let transaction = guard.as_mut().ok_or_else(Self::finished)?;
                Ok(query.fetch_optional(&mut **transaction).await?)
            }
        }
    }

    async fn fetch_one(&self, query: PgQuery<'_>) -> Result<PgRow> {
        self.fetch_optional(query)
            .await?
            .ok_or_else(|| StoreError::database("Statement returned no rows"))
    }

    async fn execute(&self, query: PgQuery<'_>) -> Result<PgQueryResult> {
        match &self.transaction {
            None => Ok(query.execute(&self.pool).await?),
            Some(slot) => {
                let mut guard = slot.lock().await;
                let transaction = guard.as_mut().ok_or_else(Self::finished)?;
                Ok(query.execute(&mut **transaction).await?)
            }
        }
    }

    async fn count_rows(&self, sql: &SqlQuery) -> Result<i64> {
        let query = Self::bind_params(sqlx::query(&sql.count), &sql.params);
        let row = self.fetch_one(query).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    // =========================================================================
    // Table Registry
    // =========================================================================

    /// Register a join table, creating it when `create_tables` is enabled
    pub async fn register_table(&self, table: JoinTable) -> Result<()> {
        table.validate().map_err(StoreError::Validation)?;

        if self.config.create_tables {
            for statement in DdlGenerator::new(&table).statements() {
                debug!(sql = %statement, "Executing DDL");
                self.execute(sqlx::query(&statement)).await?;
            }
        }

        debug!(entity_type = %table.entity_type, table = %table.table_name, "Registered join table");
        self.tables
            .write()
            .await
            .insert(table.entity_type.clone(), table);
        Ok(())
    }

    /// Drop a registered table and forget it
    pub async fn drop_table(&self, entity_type: &str) -> Result<()> {
        let table = self.table(entity_type).await?;
        let statement = DdlGenerator::new(&table).generate_drop_table();
        self.execute(sqlx::query(&statement)).await?;
        self.tables.write().await.remove(entity_type);
        Ok(())
    }

    /// Registered table for an entity type
    pub async fn table(&self, entity_type: &str) -> Result<JoinTable> {
        self.tables
            .read()
            .await
            .get(entity_type)
            .cloned()
            .ok_or_else(|| StoreError::UnknownEntityType(entity_type.to_string()))
    }

    // =========================================================================
    // Row Mapping
    // =========================================================================

    fn row_to_record(row: &sqlx::postgres::PgRow, table: &JoinTable) -> Result<JsonRecord> {
        let id: i64 = row.try_get("id")?;
        let mut record =
            JsonRecord::new(table.entity_type.clone()).with(table.identity_path.clone(), id.into());

        for column in &table.columns {
            let value = Self::extract_column_value(row, &column.definition)
                .unwrap_or(serde_json::Value::Null);
            record.fields.insert(column.path.clone(), value);
        }
        Ok(record)
    }

    fn extract_column_value(
        row: &sqlx::postgres::PgRow,
        col: &ColumnDefinition,
    ) -> Option<serde_json::Value> {
        match &col.column_type {
            ColumnType::String | ColumnType::Enum { .. } => row
                .try_get::<Option<String>, _>(col.name.as_str())
                .ok()
                .flatten()
                .map(serde_json::Value::String),
            ColumnType::Integer => row
                .try_get::<Option<i64>, _>(col.name.as_str())
                .ok()
                .flatten()
                .map(serde_json::Value::from),
            ColumnType::Decimal { .. } => {
                use rust_decimal::prelude::ToPrimitive;
                row.try_get::<Option<rust_decimal::Decimal>, _>(col.name.as_str())
                    .ok()
                    .flatten()
                    .and_then(|d| d.to_f64())
                    .and_then(serde_json::Number::from_f64)
                    .map(serde_json::Value::Number)
            }
            ColumnType::Boolean => row
                .try_get::<Option<bool>, _>(col.name.as_str())
                .ok()
                .flatten()
                .map(serde_json::Value::Bool),
            ColumnType::Timestamp => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(col.name.as_str())
                .ok()
                .flatten()
                .map(|v| serde_json::Value::String(v.to_rfc3339())),
            ColumnType::Json => row
                .try_get::<Option<serde_json::Value>, _>(col.name.as_str())
                .ok()
                .flatten(),
        }
    }

    /// Column values of a record in table column order, validated against the column types
    fn column_values(table: &JoinTable, record: &JsonRecord) -> Result<Vec<serde_json::Value>> {
        let mut values = Vec::with_capacity(table.columns.len());
        for column in &table.columns {
            let value = record
                .get(&column.path)
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            let definition = &column.definition;

            if value.is_null() && !definition.nullable && definition.default_value.is_none() {
                return Err(StoreError::validation(format!(
                    "Column '{}' does not allow NULL values",
                    definition.name
                )));
            }
            definition.column_type.validate_value(&value).map_err(|e| {
                StoreError::validation(format!(
                    "Invalid value for column '{}': {}",
                    definition.name, e
                ))
            })?;
            values.push(value);
        }
        Ok(values)
    }

    fn bind_value<'q>(
        query: PgQuery<'q>,
        column_type: &ColumnType,
        column_name: &str,
        value: &'q serde_json::Value,
    ) -> Result<PgQuery<'q>> {
        Ok(match column_type {
            ColumnType::String | ColumnType::Enum { .. } => {
                if value.is_null() {
                    query.bind(None::<String>)
                } else {
                    query.bind(value.as_str().ok_or_else(|| {
                        StoreError::validation(format!("Column '{}' expected string", column_name))
                    })?)
                }
            }
            ColumnType::Integer => {
                if value.is_null() {
                    query.bind(None::<i64>)
                } else {
                    let int_val = value
                        .as_i64()
                        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
                        .ok_or_else(|| {
                            StoreError::validation(format!(
                                "Column '{}' expected integer",
                                column_name
                            ))
                        })?;
                    query.bind(int_val)
                }
            }
            ColumnType::Decimal { .. } => {
                if value.is_null() {
                    query.bind(None::<rust_decimal::Decimal>)
                } else {
                    let text = match value {
                        serde_json::Value::String(s) => s.trim().to_string(),
                        other => other.to_string(),
                    };
                    let dec_val = text.parse::<rust_decimal::Decimal>().map_err(|_| {
                        StoreError::validation(format!("Column '{}' expected decimal", column_name))
                    })?;
                    query.bind(dec_val)
                }
            }
            ColumnType::Boolean => {
                if value.is_null() {
                    query.bind(None::<bool>)
                } else {
                    let bool_val = value
                        .as_bool()
                        .or_else(|| {
                            value
                                .as_str()
                                .and_then(|s| match s.to_lowercase().as_str() {
                                    "true" | "1" | "yes" => Some(true),
                                    "false" | "0" | "no" => Some(false),
                                    _ => None,
                                })
                        })
                        .ok_or_else(|| {
                            StoreError::validation(format!(
                                "Column '{}' expected boolean",
                                column_name
                            ))
                        })?;
                    query.bind(bool_val)
                }
            }
            ColumnType::Timestamp => {
                if value.is_null() {
                    query.bind(None::<chrono::DateTime<chrono::Utc>>)
                } else {
                    let timestamp_str = value.as_str().ok_or_else(|| {
                        StoreError::validation(format!(
                            "Column '{}' expected timestamp string",
                            column_name
                        ))
                    })?;
                    let timestamp = chrono::DateTime::parse_from_rfc3339(timestamp_str)
                        .map_err(|e| {
                            StoreError::validation(format!(
                                "Column '{}' has invalid timestamp: {}",
                                column_name, e
                            ))
                        })?
                        .with_timezone(&chrono::Utc);
                    query.bind(timestamp)
                }
            }
            ColumnType::Json => query.bind(value),
        })
    }

    fn bind_columns<'q>(
        mut query: PgQuery<'q>,
        table: &JoinTable,
        values: &'q [serde_json::Value],
    ) -> Result<PgQuery<'q>> {
        for (column, value) in table.columns.iter().zip(values) {
            query = Self::bind_value(
                query,
                &column.definition.column_type,
                &column.definition.name,
                value,
            )?;
        }
        Ok(query)
    }

    fn bind_params<'q>(mut query: PgQuery<'q>, params: &'q [SqlParam]) -> PgQuery<'q> {
        for param in params {
            query = match param {
                SqlParam::Integer(value) => query.bind(*value),
                SqlParam::Text(value) => query.bind(value.as_str()),
            };
        }
        query
    }

    fn identity_of(table: &JoinTable, record: &JsonRecord) -> Result<Option<i64>> {
        let value = record
            .get(&table.identity_path)
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        optional_i64(&table.identity_path, &value)
    }
}

#[async_trait]
impl CriteriaTranslator<JsonRecord> for PgJoinStore {
    async fn query(
        &self,
        entity_type: &str,
        filter: &FilterRequest,
    ) -> Result<(Vec<JsonRecord>, i64)> {
        let table = self.table(entity_type).await?;
        let sql = SqlQuery::build(&table, filter).map_err(StoreError::InvalidCondition)?;
        debug!(sql = %sql.select, params = ?sql.params, "Querying join records");

        let total_count = self.count_rows(&sql).await?;

        let mut select_query = Self::bind_params(sqlx::query(&sql.select), &sql.params);
        if let Some(limit) = sql.limit {
            select_query = select_query.bind(limit);
        }
        let rows = self.fetch_all(select_query.bind(sql.offset)).await?;

        let records = rows
            .iter()
            .map(|row| Self::row_to_record(row, &table))
            .collect::<Result<Vec<_>>>()?;

        Ok((records, total_count))
    }

    async fn count(&self, entity_type: &str, filter: &FilterRequest) -> Result<i64> {
        let table = self.table(entity_type).await?;
        let sql = SqlQuery::build(&table, filter).map_err(StoreError::InvalidCondition)?;
        self.count_rows(&sql).await
    }
}

#[async_trait]
impl Storage<JsonRecord> for PgJoinStore {
    async fn instantiate(&self, entity_type: &str) -> Result<JsonRecord> {
        let table = self.table(entity_type).await?;
        let paths = std::iter::once(table.identity_path.as_str())
            .chain(table.columns.iter().map(|c| c.path.as_str()));
        Ok(JsonRecord::with_paths(entity_type, paths))
    }

    async fn merge(&self, record: JsonRecord) -> Result<JsonRecord> {
        let table = self.table(&record.entity_type).await?;
        let values = Self::column_values(&table, &record)?;
        let quoted_table = quote_identifier(&table.table_name);
        let returning = select_columns(&table).join(", ");

        let row = match Self::identity_of(&table, &record)? {
            None => {
                let columns: Vec<String> = table
                    .columns
                    .iter()
                    .map(|c| quote_identifier(&c.definition.name))
                    .collect();
                let placeholders: Vec<String> =
                    (1..=columns.len()).map(|i| format!("${}", i)).collect();
                let insert_sql = format!(
                    "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                    quoted_table,
                    columns.join(", "),
                    placeholders.join(", "),
                    returning
                );
                debug!(sql = %insert_sql, "Inserting join record");

                let query = Self::bind_columns(sqlx::query(&insert_sql), &table, &values)?;
                self.fetch_one(query).await?
            }
            Some(id) => {
                let assignments: Vec<String> = table
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, c)| format!("{} = ${}", quote_identifier(&c.definition.name), i + 1))
                    .collect();
                let update_sql = format!(
                    "UPDATE {} SET {} WHERE \"id\" = ${} RETURNING {}",
                    quoted_table,
                    assignments.join(", "),
                    values.len() + 1,
                    returning
                );
                debug!(sql = %update_sql, id, "Updating join record");

                let query = Self::bind_columns(sqlx::query(&update_sql), &table, &values)?.bind(id);
                self.fetch_optional(query).await?.ok_or_else(|| {
                    StoreError::not_found(format!("{} with id {} not found", table.entity_type, id))
                })?
            }
        };

        Self::row_to_record(&row, &table)
    }

    async fn remove(&self, record: &JsonRecord) -> Result<()> {
        let table = self.table(&record.entity_type).await?;
        let id = Self::identity_of(&table, record)?
            .ok_or_else(|| StoreError::validation("Cannot remove a record without identity"))?;

        let delete_sql = format!(
            "DELETE FROM {} WHERE \"id\" = $1",
            quote_identifier(&table.table_name)
        );
        debug!(sql = %delete_sql, id, "Deleting join record");

        let result = self.execute(sqlx::query(&delete_sql).bind(id)).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!(
                "{} with id {} not found",
                table.entity_type, id
            )));
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn clear_identity_cache(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl MetadataProvider for PgJoinStore {
    async fn merged_properties(&self, request: &MetadataRequest) -> Result<FieldMetadataMap> {
        let table = self.table(&request.entity_type).await?;

        let identity = FieldMetadata::new(table.identity_path.clone(), ColumnType::Integer);
        let columns = table.columns.iter().map(|column| {
            let mut field =
                FieldMetadata::new(column.path.clone(), column.definition.column_type.clone());
            field.nullable = column.definition.nullable;
            field
        });

        Ok(request.apply(std::iter::once(identity).chain(columns)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::RelationshipDescriptor;
    use serde_json::json;

    fn category_product() -> JoinTable {
        let descriptor =
            RelationshipDescriptor::new("allParentCategories", "CategoryProduct", "category", "product")
                .with_sort_field("displayOrder");
        JoinTable::for_descriptor(&descriptor, "category_product")
    }

    #[test]
    fn test_column_values_in_column_order() {
        let record = JsonRecord::new("CategoryProduct")
            .with("product.id", json!(42))
            .with("category.id", json!(5));

        let values = PgJoinStore::column_values(&category_product(), &record).unwrap();
        assert_eq!(values, vec![json!(5), json!(42), json!(null)]);
    }

    #[test]
    fn test_column_values_reject_null_endpoint() {
        let record = JsonRecord::new("CategoryProduct").with("category.id", json!(5));
        let err = PgJoinStore::column_values(&category_product(), &record).unwrap_err();
        assert!(err.to_string().contains("does not allow NULL"));
    }

    #[test]
    fn test_column_values_reject_type_mismatch() {
        let record = JsonRecord::new("CategoryProduct")
            .with("category.id", json!(5))
            .with("product.id", json!(true));
        assert!(matches!(
            PgJoinStore::column_values(&category_product(), &record),
            Err(StoreError::Validation(_))
        ));
    }

    fn lazy_store() -> PgJoinStore {
        let url = "postgres://localhost/join_store_unit";
        let pool = PgPool::connect_lazy(url).unwrap();
        PgJoinStore::from_pool(pool, StoreConfig::builder(url).build())
    }

    #[tokio::test]
    async fn test_commit_requires_open_transaction() {
        let store = lazy_store();
        assert!(!store.is_transactional());

        let err = store.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::Transaction(_)));
        assert!(matches!(
            store.rollback().await,
            Err(StoreError::Transaction(_))
        ));
    }

    #[test]
    fn test_identity_of() {
        let table = category_product();
        let record = JsonRecord::new("CategoryProduct").with("id", json!(null));
        assert_eq!(PgJoinStore::identity_of(&table, &record).unwrap(), None);

        let record = record.with("id", json!(12));
        assert_eq!(PgJoinStore::identity_of(&table, &record).unwrap(), Some(12));
    }
}
