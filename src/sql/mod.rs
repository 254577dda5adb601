//! SQL utilities for the PostgreSQL adapter
//!
//! Provides DDL generation, condition translation, and identifier sanitization.

pub mod condition;
pub mod ddl;
pub mod sanitize;

pub use condition::{SqlParam, SqlQuery, build_condition_clause, build_order_by_clause};
pub use ddl::DdlGenerator;
pub use sanitize::{POSTGRES_RESERVED_WORDS, quote_identifier, validate_identifier, validate_path};
