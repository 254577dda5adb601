//! DDL generation for join tables
//!
//! Generates PostgreSQL DDL statements for registered [`JoinTable`]s. Every statement is
//! idempotent so registration can run on each startup.

use crate::sql::sanitize::quote_identifier;
use crate::types::{ColumnDefinition, JoinTable};

/// DDL generator for one join table
pub struct DdlGenerator<'a> {
    table: &'a JoinTable,
}

impl<'a> DdlGenerator<'a> {
    pub fn new(table: &'a JoinTable) -> Self {
        Self { table }
    }

    /// Generate CREATE TABLE IF NOT EXISTS with a BIGSERIAL identity column
    pub fn generate_create_table(&self) -> String {
        let quoted_table = quote_identifier(&self.table.table_name);

        let mut column_defs = vec!["\"id\" BIGSERIAL PRIMARY KEY".to_string()];
        for column in &self.table.columns {
            column_defs.push(Self::format_column_definition(&column.definition));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quoted_table,
            column_defs.join(", ")
        )
    }

    /// Generate the unique index over the endpoint pair, if the table declares one
    pub fn generate_unique_index(&self) -> Option<String> {
        if self.table.unique_paths.is_empty() {
            return None;
        }

        let columns: Vec<String> = self
            .table
            .unique_paths
            .iter()
            .filter_map(|path| self.table.column_name(path))
            .map(quote_identifier)
            .collect();
        let index_name = format!("uq_{}_endpoints", self.table.table_name);

        Some(format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {}({})",
            quote_identifier(&index_name),
            quote_identifier(&self.table.table_name),
            columns.join(", ")
        ))
    }

    /// Generate DROP TABLE statement
    pub fn generate_drop_table(&self) -> String {
        format!(
            "DROP TABLE IF EXISTS {} CASCADE",
            quote_identifier(&self.table.table_name)
        )
    }

    /// Every statement needed to create the table, in execution order
    pub fn statements(&self) -> Vec<String> {
        let mut statements = vec![self.generate_create_table()];
        statements.extend(self.generate_unique_index());
        statements
    }

    /// Format a single column definition for CREATE TABLE
    pub fn format_column_definition(col: &ColumnDefinition) -> String {
        let mut parts = vec![
            quote_identifier(&col.name),
            col.column_type.to_sql_type(&col.name),
        ];

        if !col.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(default) = &col.default_value {
            parts.push(format!("DEFAULT {}", default));
        }

        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::RelationshipDescriptor;
    use crate::types::ColumnType;

    fn category_product() -> JoinTable {
        let descriptor =
            RelationshipDescriptor::new("allParentCategories", "CategoryProduct", "category", "product")
                .with_sort_field("displayOrder");
        JoinTable::for_descriptor(&descriptor, "category_product")
    }

    // ==================== CREATE TABLE Tests ====================

    #[test]
    fn test_generate_create_table() {
        let table = category_product();
        let ddl = DdlGenerator::new(&table).generate_create_table();

        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS \"category_product\" (\"id\" BIGSERIAL PRIMARY KEY, \"category_id\" BIGINT NOT NULL, \"product_id\" BIGINT NOT NULL, \"displayorder\" BIGINT)"
        );
    }

    #[test]
    fn test_generate_create_table_with_default() {
        let table = JoinTable::new("Tagging", "tagging").column_definition(
            "label",
            ColumnDefinition::new("label", ColumnType::String)
                .not_null()
                .default("'none'"),
        );
        let ddl = DdlGenerator::new(&table).generate_create_table();

        assert!(ddl.contains("\"label\" TEXT NOT NULL DEFAULT 'none'"));
    }

    // ==================== Index Tests ====================

    #[test]
    fn test_generate_unique_index() {
        let table = category_product();
        let index = DdlGenerator::new(&table).generate_unique_index().unwrap();

        assert_eq!(
            index,
            "CREATE UNIQUE INDEX IF NOT EXISTS \"uq_category_product_endpoints\" ON \"category_product\"(\"category_id\", \"product_id\")"
        );
    }

    #[test]
    fn test_no_unique_index_without_paths() {
        let table = JoinTable::new("Tagging", "tagging").column("tag.id", ColumnType::Integer, false);
        let generator = DdlGenerator::new(&table);

        assert!(generator.generate_unique_index().is_none());
        assert_eq!(generator.statements().len(), 1);
    }

    #[test]
    fn test_statements_order_and_drop() {
        let table = category_product();
        let generator = DdlGenerator::new(&table);
        let statements = generator.statements();

        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE"));
        assert!(statements[1].starts_with("CREATE UNIQUE INDEX"));
        assert_eq!(
            generator.generate_drop_table(),
            "DROP TABLE IF EXISTS \"category_product\" CASCADE"
        );
    }
}
