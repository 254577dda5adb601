//! SQL identifier and record-path sanitization
//!
//! Identifiers are always quoted before reaching SQL; names and paths are validated
//! before they are registered.

use regex::Regex;

/// PostgreSQL reserved keywords that cannot be used as table or column names
pub const POSTGRES_RESERVED_WORDS: &[&str] = &[
    "ALL", "ANALYSE", "ANALYZE", "AND", "ANY", "ARRAY", "AS", "ASC", "ASYMMETRIC", "BOTH",
    "CASE", "CAST", "CHECK", "COLLATE", "COLUMN", "CONSTRAINT", "CREATE", "CURRENT_CATALOG",
    "CURRENT_DATE", "CURRENT_ROLE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "CURRENT_USER",
    "DEFAULT", "DEFERRABLE", "DESC", "DISTINCT", "DO", "ELSE", "END", "EXCEPT", "FALSE",
    "FETCH", "FOR", "FOREIGN", "FROM", "GRANT", "GROUP", "HAVING", "IN", "INITIALLY",
    "INTERSECT", "INTO", "LATERAL", "LEADING", "LIMIT", "LOCALTIME", "LOCALTIMESTAMP", "NOT",
    "NULL", "OFFSET", "ON", "ONLY", "OR", "ORDER", "PLACING", "PRIMARY", "REFERENCES",
    "RETURNING", "SELECT", "SESSION_USER", "SOME", "SYMMETRIC", "TABLE", "THEN", "TO",
    "TRAILING", "TRUE", "UNION", "UNIQUE", "USER", "USING", "VARIADIC", "WHEN", "WHERE",
    "WINDOW", "WITH",
];

const IDENTIFIER_PATTERN: &str = r"^[a-z][a-z0-9_]*$";
const PATH_SEGMENT_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

/// Quote a SQL identifier, doubling any embedded quotes
///
/// # Example
/// ```
/// use runtara_join_store::sql::quote_identifier;
///
/// assert_eq!(quote_identifier("category_product"), "\"category_product\"");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    let escaped = identifier.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Validate a table or column name
///
/// Rules:
/// - Must start with a lowercase letter
/// - Only lowercase letters, numbers, and underscores
/// - Not a PostgreSQL reserved word
/// - Not one of `reserved_columns`
///
/// # Example
/// ```
/// use runtara_join_store::sql::validate_identifier;
///
/// assert!(validate_identifier("category_product", &[]).is_ok());
/// assert!(validate_identifier("select", &[]).is_err());
/// assert!(validate_identifier("id", &["id"]).is_err());
/// ```
pub fn validate_identifier(name: &str, reserved_columns: &[&str]) -> Result<(), String> {
    if name.is_empty() {
        return Err("Identifier cannot be empty".to_string());
    }

    let re = Regex::new(IDENTIFIER_PATTERN).map_err(|e| e.to_string())?;
    if !re.is_match(name) {
        return Err(format!(
            "Identifier '{}' is invalid. Must start with a lowercase letter and contain only lowercase letters, numbers, and underscores.",
            name
        ));
    }

    if POSTGRES_RESERVED_WORDS.contains(&name.to_uppercase().as_str()) {
        return Err(format!(
            "Identifier '{}' is a PostgreSQL reserved keyword and cannot be used.",
            name
        ));
    }

    if reserved_columns.contains(&name) {
        return Err(format!(
            "Column name '{}' is reserved and cannot be used.",
            name
        ));
    }

    Ok(())
}

/// Validate a dotted record path such as `category.id`
///
/// Each segment must start with a letter or underscore and contain only ASCII
/// letters, digits and underscores.
pub fn validate_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("Path cannot be empty".to_string());
    }

    let re = Regex::new(PATH_SEGMENT_PATTERN).map_err(|e| e.to_string())?;
    for segment in path.split('.') {
        if !re.is_match(segment) {
            return Err(format!(
                "Path '{}' has an invalid segment '{}'",
                path, segment
            ));
        }
    }

    Ok(())
}
