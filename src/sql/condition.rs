//! Condition building for SQL WHERE / ORDER BY clauses
//!
//! Converts a [`FilterRequest`] over record paths into parameterised SQL against a
//! registered [`JoinTable`].

use crate::criteria::{Condition, FilterRequest, SortDirective, json_value_to_string};
use crate::sql::sanitize::quote_identifier;
use crate::types::{ColumnType, JoinTable};

/// A bound condition value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Integer(i64),
    Text(String),
}

/// Build a SQL WHERE clause from a Condition
///
/// Returns (clause, params) where `clause` uses `$n` placeholders starting at
/// `param_offset` (mutated to the next free number). Integer columns, the identity
/// included, compare against a bound `BIGINT` so their indexes stay usable; other
/// columns compare as text.
pub fn build_condition_clause(
    condition: &Condition,
    table: &JoinTable,
    param_offset: &mut i32,
) -> Result<(String, Vec<SqlParam>), String> {
    match condition {
        Condition::Eq { path, value } => {
            let column = column_for(table, path)?;

            if value.is_null() {
                return Ok((format!("{} IS NULL", column), Vec::new()));
            }

            let (clause, param) = if is_integer_path(table, path) {
                let id = value
                    .as_i64()
                    .or_else(|| value.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
                    .ok_or_else(|| {
                        format!("Path '{}' expects an integer, got {}", path, value)
                    })?;
                (format!("{} = ${}", column, param_offset), SqlParam::Integer(id))
            } else {
                (
                    format!("{}::text = ${}::text", column, param_offset),
                    SqlParam::Text(json_value_to_string(value)),
                )
            };
            *param_offset += 1;

            Ok((clause, vec![param]))
        }
        Condition::And(conditions) => join_clauses(conditions, " AND ", "AND", table, param_offset),
        Condition::Or(conditions) => join_clauses(conditions, " OR ", "OR", table, param_offset),
    }
}

fn is_integer_path(table: &JoinTable, path: &str) -> bool {
    path == table.identity_path
        || table
            .column_for_path(path)
            .is_some_and(|c| c.definition.column_type == ColumnType::Integer)
}

fn join_clauses(
    conditions: &[Condition],
    separator: &str,
    name: &str,
    table: &JoinTable,
    param_offset: &mut i32,
) -> Result<(String, Vec<SqlParam>), String> {
    if conditions.is_empty() {
        return Err(format!("{} operation requires at least one condition", name));
    }

    let mut clauses = Vec::new();
    let mut params = Vec::new();
    for condition in conditions {
        let (clause, mut sub_params) = build_condition_clause(condition, table, param_offset)?;
        clauses.push(format!("({})", clause));
        params.append(&mut sub_params);
    }

    Ok((clauses.join(separator), params))
}

/// Build an ORDER BY clause (without the keyword); defaults to the identity column
pub fn build_order_by_clause(sort: &[SortDirective], table: &JoinTable) -> Result<String, String> {
    if sort.is_empty() {
        return Ok("\"id\" ASC".to_string());
    }

    let mut parts = Vec::new();
    for directive in sort {
        let column = column_for(table, &directive.path).map_err(|_| {
            format!(
                "Invalid sort field: '{}'. Must be the identity path or a mapped column.",
                directive.path
            )
        })?;
        let order = if directive.ascending { "ASC" } else { "DESC" };
        parts.push(format!("{} {}", column, order));
    }

    Ok(parts.join(", "))
}

fn column_for(table: &JoinTable, path: &str) -> Result<String, String> {
    table
        .column_name(path)
        .map(quote_identifier)
        .ok_or_else(|| format!("Path '{}' is not mapped on table '{}'", path, table.table_name))
}

/// SELECT + COUNT statements for one filter request
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub select: String,
    pub count: String,
    /// Condition parameters, shared by both statements
    pub params: Vec<SqlParam>,
    /// LIMIT / OFFSET are bound after `params` on the select statement
    pub limit: Option<i64>,
    pub offset: i64,
}

impl SqlQuery {
    pub fn build(table: &JoinTable, filter: &FilterRequest) -> Result<Self, String> {
        let (where_clause, params) = match &filter.condition {
            Some(condition) => {
                let mut param_offset = 1;
                build_condition_clause(condition, table, &mut param_offset)?
            }
            None => ("TRUE".to_string(), Vec::new()),
        };
        let order_by = build_order_by_clause(&filter.sort, table)?;
        let quoted_table = quote_identifier(&table.table_name);

        let count = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            quoted_table, where_clause
        );

        let mut select = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {}",
            select_columns(table).join(", "),
            quoted_table,
            where_clause,
            order_by
        );
        let mut next = params.len() + 1;
        if filter.limit.is_some() {
            select.push_str(&format!(" LIMIT ${}", next));
            next += 1;
        }
        select.push_str(&format!(" OFFSET ${}", next));

        Ok(Self {
            select,
            count,
            params,
            limit: filter.limit,
            offset: filter.offset,
        })
    }
}

/// Identity column followed by every mapped column, quoted
pub fn select_columns(table: &JoinTable) -> Vec<String> {
    std::iter::once(quote_identifier("id"))
        .chain(
            table
                .columns
                .iter()
                .map(|c| quote_identifier(&c.definition.name)),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::condition_helpers;
    use crate::types::ColumnType;
    use serde_json::json;

    fn make_table() -> JoinTable {
        JoinTable::new("CategoryProduct", "category_product")
            .column("category.id", ColumnType::Integer, false)
            .column("product.id", ColumnType::Integer, false)
            .column("displayOrder", ColumnType::Integer, true)
            .column("note", ColumnType::String, true)
    }

    // ==================== Conditions ====================

    #[test]
    fn test_eq_condition() {
        let condition = condition_helpers::eq("category.id", json!(5));

        let mut offset = 1;
        let (clause, params) = build_condition_clause(&condition, &make_table(), &mut offset).unwrap();

        assert_eq!(clause, "\"category_id\" = $1");
        assert_eq!(params, vec![SqlParam::Integer(5)]);
        assert_eq!(offset, 2);
    }

    #[test]
    fn test_integer_condition_accepts_decimal_string() {
        let condition = condition_helpers::eq("id", json!("12"));

        let mut offset = 1;
        let (clause, params) = build_condition_clause(&condition, &make_table(), &mut offset).unwrap();

        assert_eq!(clause, "\"id\" = $1");
        assert_eq!(params, vec![SqlParam::Integer(12)]);
    }

    #[test]
    fn test_integer_condition_rejects_text() {
        let condition = condition_helpers::eq("product.id", json!("widget"));
        let mut offset = 1;
        let err = build_condition_clause(&condition, &make_table(), &mut offset).unwrap_err();
        assert!(err.contains("expects an integer"));
    }

    #[test]
    fn test_text_condition() {
        let condition = condition_helpers::eq("note", json!("gift"));

        let mut offset = 1;
        let (clause, params) = build_condition_clause(&condition, &make_table(), &mut offset).unwrap();

        assert_eq!(clause, "\"note\"::text = $1::text");
        assert_eq!(params, vec![SqlParam::Text("gift".to_string())]);
    }

    #[test]
    fn test_eq_null_condition() {
        let condition = condition_helpers::eq("displayOrder", serde_json::Value::Null);

        let mut offset = 1;
        let (clause, params) = build_condition_clause(&condition, &make_table(), &mut offset).unwrap();

        assert_eq!(clause, "\"displayorder\" IS NULL");
        assert!(params.is_empty());
        assert_eq!(offset, 1);
    }

    #[test]
    fn test_and_or_condition() {
        let condition = condition_helpers::and(vec![
            condition_helpers::eq("category.id", json!(5)),
            condition_helpers::or(vec![
                condition_helpers::eq("product.id", json!(42)),
                condition_helpers::eq("product.id", json!(43)),
            ]),
        ]);

        let mut offset = 3;
        let (clause, params) = build_condition_clause(&condition, &make_table(), &mut offset).unwrap();

        assert_eq!(
            clause,
            "(\"category_id\" = $3) AND ((\"product_id\" = $4) OR (\"product_id\" = $5))"
        );
        assert_eq!(
            params,
            vec![SqlParam::Integer(5), SqlParam::Integer(42), SqlParam::Integer(43)]
        );
        assert_eq!(offset, 6);
    }

    #[test]
    fn test_unmapped_path_is_rejected() {
        let condition = condition_helpers::eq("product.name", json!("Widget"));
        let mut offset = 1;
        let err = build_condition_clause(&condition, &make_table(), &mut offset).unwrap_err();
        assert!(err.contains("not mapped"));
    }

    #[test]
    fn test_empty_and_is_rejected() {
        let mut offset = 1;
        assert!(build_condition_clause(&Condition::And(vec![]), &make_table(), &mut offset).is_err());
    }

    // ==================== ORDER BY ====================

    #[test]
    fn test_order_by_default() {
        assert_eq!(build_order_by_clause(&[], &make_table()).unwrap(), "\"id\" ASC");
    }

    #[test]
    fn test_order_by_sort_field() {
        let sort = vec![
            SortDirective {
                path: "displayOrder".to_string(),
                ascending: false,
            },
            SortDirective {
                path: "id".to_string(),
                ascending: true,
            },
        ];
        assert_eq!(
            build_order_by_clause(&sort, &make_table()).unwrap(),
            "\"displayorder\" DESC, \"id\" ASC"
        );
    }

    #[test]
    fn test_order_by_invalid_field() {
        let sort = vec![SortDirective {
            path: "nonexistent".to_string(),
            ascending: true,
        }];
        let err = build_order_by_clause(&sort, &make_table()).unwrap_err();
        assert!(err.contains("Invalid sort field"));
    }

    // ==================== Full Query ====================

    #[test]
    fn test_sql_query_paged() {
        let filter = FilterRequest::new()
            .with_condition(condition_helpers::eq("category.id", json!(5)))
            .with_sort("displayOrder", true)
            .with_pagination(10, 5);

        let query = SqlQuery::build(&make_table(), &filter).unwrap();

        assert_eq!(
            query.select,
            "SELECT \"id\", \"category_id\", \"product_id\", \"displayorder\", \"note\" FROM \"category_product\" WHERE \"category_id\" = $1 ORDER BY \"displayorder\" ASC LIMIT $2 OFFSET $3"
        );
        assert_eq!(
            query.count,
            "SELECT COUNT(*) FROM \"category_product\" WHERE \"category_id\" = $1"
        );
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.offset, 10);
    }

    #[test]
    fn test_sql_query_unpaged() {
        let query = SqlQuery::build(&make_table(), &FilterRequest::new()).unwrap();
        assert!(query.select.ends_with("WHERE TRUE ORDER BY \"id\" ASC OFFSET $1"));
        assert!(query.params.is_empty());
    }
}
