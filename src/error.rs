//! Error types for join-structure operations
//!
//! Collaborators report [`StoreError`]. The public operations re-report every failure as
//! a [`JoinStructureError`], which keeps the collaborator error as its source.

use thiserror::Error;

/// Errors raised by collaborators (field access, criteria execution, storage, metadata)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Field access error on '{path}': {message}")]
    Field { path: String, message: String },

    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn field(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Field {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }
}

/// Failure taxonomy reported by [`JoinStructureOperations`](crate::JoinStructureOperations)
#[derive(Debug, Error)]
pub enum JoinStructureError {
    /// Malformed identifier, position or path in the request
    #[error("{source}")]
    ValidationFailure {
        #[source]
        source: StoreError,
    },

    /// The expected join record or sibling does not exist
    #[error("{source}")]
    NotFound {
        #[source]
        source: StoreError,
    },

    /// Field metadata for the join entity type could not be resolved
    #[error("Unable to resolve metadata for {entity_type}: {source}")]
    MetadataFailure {
        entity_type: String,
        #[source]
        source: StoreError,
    },

    /// A fetch could not be executed
    #[error("Unable to fetch results for {entity_type}: {source}")]
    LookupFailure {
        entity_type: String,
        #[source]
        source: StoreError,
    },

    /// An add, update or remove could not be applied
    #[error("Problem {operation} entity {entity_type}: {source}")]
    MutationFailure {
        operation: &'static str,
        entity_type: String,
        #[source]
        source: StoreError,
    },
}

impl JoinStructureError {
    /// Classify a failed lookup. Validation and not-found keep their own kind.
    pub fn lookup(entity_type: impl Into<String>, source: StoreError) -> Self {
        match source {
            StoreError::Validation(_) => Self::ValidationFailure { source },
            StoreError::NotFound(_) => Self::NotFound { source },
            source => Self::LookupFailure {
                entity_type: entity_type.into(),
                source,
            },
        }
    }

    /// Classify a failed mutation. Validation and not-found keep their own kind.
    pub fn mutation(
        operation: &'static str,
        entity_type: impl Into<String>,
        source: StoreError,
    ) -> Self {
        match source {
            StoreError::Validation(_) => Self::ValidationFailure { source },
            StoreError::NotFound(_) => Self::NotFound { source },
            source => Self::MutationFailure {
                operation,
                entity_type: entity_type.into(),
                source,
            },
        }
    }

    pub fn metadata(entity_type: impl Into<String>, source: StoreError) -> Self {
        Self::MetadataFailure {
            entity_type: entity_type.into(),
            source,
        }
    }

    /// True when nothing matched, as opposed to the store failing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// HTTP-style status a presentation layer can surface
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ValidationFailure { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::MetadataFailure { .. }
            | Self::LookupFailure { .. }
            | Self::MutationFailure { .. } => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_lookup_keeps_validation_kind() {
        let err = JoinStructureError::lookup("CategoryProduct", StoreError::validation("bad id"));
        assert!(matches!(err, JoinStructureError::ValidationFailure { .. }));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_mutation_keeps_not_found_kind() {
        let err = JoinStructureError::mutation(
            "removing",
            "CategoryProduct",
            StoreError::not_found("no join record"),
        );
        assert!(err.is_not_found());
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.to_string(), "Not found: no join record");
    }

    #[test]
    fn test_validation_message_is_not_repeated() {
        let err = JoinStructureError::mutation(
            "adding",
            "CategoryProduct",
            StoreError::validation("'product.id' is not numeric"),
        );
        assert_eq!(
            err.to_string(),
            "Validation error: 'product.id' is not numeric"
        );
    }

    #[test]
    fn test_store_failure_wraps_cause() {
        let err = JoinStructureError::lookup(
            "CategoryProduct",
            StoreError::database("connection reset"),
        );
        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().contains("CategoryProduct"));
        let source = err.source().map(|s| s.to_string()).unwrap_or_default();
        assert!(source.contains("connection reset"));
    }

    #[test]
    fn test_mutation_message_names_operation() {
        let err = JoinStructureError::mutation(
            "adding",
            "CategoryProduct",
            StoreError::database("duplicate key"),
        );
        assert_eq!(
            err.to_string(),
            "Problem adding entity CategoryProduct: Database error: duplicate key"
        );
    }
}
