//! Repository configuration.
//!
//! [`RepositoryConfig`] can be deserialized from a service's configuration file (any serde
//! format) or assembled with its builder:
//!
//! ```ignore
//! let config = RepositoryConfig::builder("3")
//!     .with_schema_version_field("schemaVersion")
//!     .with_migration_batch_size(50)
//!     .build();
//! ```

use serde::{Deserialize, Serialize};

use crate::schema::{DEFAULT_SCHEMA_VERSION_FIELD, SchemaVersion};

fn default_schema_version_field() -> String {
    DEFAULT_SCHEMA_VERSION_FIELD.to_string()
}

fn default_migration_batch_size() -> u64 {
    100
}

fn default_max_migration_documents() -> u64 {
    10_000
}

/// Settings shared by every operation of a repository.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RepositoryConfig {
    /// Schema version written by the running service.
    pub schema_version: String,
    /// Name of the reserved marker field. Must not collide with a domain field.
    #[serde(default = "default_schema_version_field")]
    pub schema_version_field: String,
    /// Number of migration candidates fetched per round-trip.
    #[serde(default = "default_migration_batch_size")]
    pub migration_batch_size: u64,
    /// Document budget of one registry-driven migration run, per collection.
    #[serde(default = "default_max_migration_documents")]
    pub max_migration_documents: u64,
}

impl RepositoryConfig {
    pub fn new(schema_version: impl Into<String>) -> Self {
        Self {
            schema_version: schema_version.into(),
            schema_version_field: default_schema_version_field(),
            migration_batch_size: default_migration_batch_size(),
            max_migration_documents: default_max_migration_documents(),
        }
    }

    pub fn builder(schema_version: impl Into<String>) -> RepositoryConfigBuilder {
        RepositoryConfigBuilder::new(schema_version)
    }

    pub fn version(&self) -> SchemaVersion {
        SchemaVersion::new(self.schema_version.as_str())
    }
}

/// Builder for [`RepositoryConfig`].
pub struct RepositoryConfigBuilder {
    config: RepositoryConfig,
}

impl RepositoryConfigBuilder {
    pub fn new(schema_version: impl Into<String>) -> Self {
        Self { config: RepositoryConfig::new(schema_version) }
    }

    pub fn with_schema_version_field(mut self, field: impl Into<String>) -> Self {
        self.config.schema_version_field = field.into();
        self
    }

    /// Sets the candidate batch size; zero is raised to one.
    pub fn with_migration_batch_size(mut self, size: u64) -> Self {
        self.config.migration_batch_size = size.max(1);
        self
    }

    pub fn with_max_migration_documents(mut self, max: u64) -> Self {
        self.config.max_migration_documents = max;
        self
    }

    pub fn build(self) -> RepositoryConfig {
        self.config
    }
}
