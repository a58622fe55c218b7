//! Convenient re-exports of commonly used types from docrepo.
//!
//! ```ignore
//! use docrepo::prelude::*;
//! ```
//!
//! This provides access to:
//! - The repository, its configuration and the backend traits
//! - Filter, pipeline, sort and find-option builders
//! - Page results, mappers and migration tools
//! - Error types and the `doc!` macro

pub use bson::{Bson, Document, doc};

pub use docrepo_core::{
    backend::{BackendBuilder, DocumentBackend, UpdateOutcome},
    config::{RepositoryConfig, RepositoryConfigBuilder},
    error::{RepositoryError, RepositoryResult},
    filter::{QueryBuilder, split_element_path},
    mapping::{DocumentMapper, MapperError, compose, rename_store_id, strip_field},
    migrate::{MigrationCodec, MigrationReport, SchemaRegistry, SerdeCodec},
    options::{FindOptions, FindOptionsBuilder},
    page::PageResult,
    pipeline::AggregationBuilder,
    repository::Repository,
    schema::SchemaVersion,
    sort::{query_param_to_sort, sort_from_query_param},
};
