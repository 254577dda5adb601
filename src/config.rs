//! Configuration for join-structure operations and the PostgreSQL adapter
//!
//! Both configurations use the builder pattern.

/// How `update` persists a sibling set after a reorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortPersistence {
    /// Persist every sibling whose sort value changed, keeping 1..N contiguous in storage
    #[default]
    RenumberedSet,
    /// Persist only the moved record; shifted siblings keep their stored values
    MovedOnly,
}

/// Configuration for [`JoinStructureOperations`](crate::JoinStructureOperations)
#[derive(Debug, Clone)]
pub struct OperationsConfig {
    /// Identity field cleared on new join records (default: "id")
    pub identity_field: String,
    /// Suffix appended to the relationship name for the target filter (default: "Target")
    pub target_suffix: String,
    /// Page size used when the criteria carry no `max_results` (default: 100)
    pub default_limit: i64,
    /// Sort persistence policy for reorders
    pub sort_persistence: SortPersistence,
}

impl Default for OperationsConfig {
    fn default() -> Self {
        OperationsConfigBuilder::new().build()
    }
}

impl OperationsConfig {
    /// Create a new configuration builder
    pub fn builder() -> OperationsConfigBuilder {
        OperationsConfigBuilder::new()
    }
}

/// Builder for OperationsConfig
#[derive(Debug)]
pub struct OperationsConfigBuilder {
    identity_field: String,
    target_suffix: String,
    default_limit: i64,
    sort_persistence: SortPersistence,
}

impl Default for OperationsConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationsConfigBuilder {
    pub fn new() -> Self {
        Self {
            identity_field: "id".to_string(),
            target_suffix: "Target".to_string(),
            default_limit: 100,
            sort_persistence: SortPersistence::default(),
        }
    }

    /// Set the identity field name (default: "id")
    pub fn identity_field(mut self, name: impl Into<String>) -> Self {
        self.identity_field = name.into();
        self
    }

    /// Set the target filter suffix (default: "Target")
    pub fn target_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.target_suffix = suffix.into();
        self
    }

    /// Set the default page size (default: 100)
    pub fn default_limit(mut self, limit: i64) -> Self {
        self.default_limit = limit;
        self
    }

    /// Set the sort persistence policy (default: RenumberedSet)
    pub fn sort_persistence(mut self, policy: SortPersistence) -> Self {
        self.sort_persistence = policy;
        self
    }

    /// Build the configuration
    pub fn build(self) -> OperationsConfig {
        OperationsConfig {
            identity_field: self.identity_field,
            target_suffix: self.target_suffix,
            default_limit: self.default_limit,
            sort_persistence: self.sort_persistence,
        }
    }
}

/// Configuration for [`PgJoinStore`](crate::PgJoinStore)
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// PostgreSQL database URL
    pub database_url: String,
    /// Whether registering a join table creates it when missing
    pub create_tables: bool,
}

impl StoreConfig {
    /// Create a new configuration builder
    pub fn builder(database_url: impl Into<String>) -> StoreConfigBuilder {
        StoreConfigBuilder::new(database_url)
    }
}

/// Builder for StoreConfig
#[derive(Debug)]
pub struct StoreConfigBuilder {
    database_url: String,
    create_tables: bool,
}

impl StoreConfigBuilder {
    /// Create a new builder with the database URL
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            create_tables: true,
        }
    }

    /// Enable or disable table creation on registration (default: true)
    pub fn create_tables(mut self, enabled: bool) -> Self {
        self.create_tables = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> StoreConfig {
        StoreConfig {
            database_url: self.database_url,
            create_tables: self.create_tables,
        }
    }
}
