//! Main docrepo crate providing a document repository over schemaless document stores.
//!
//! This crate is the primary entry point for users of the docrepo framework. It re-exports the
//! core types and functionality from the sub-crates and provides access to the storage
//! backends.
//!
//! # Features
//!
//! - **Filter composition** - Build native filter documents from optional request parameters
//! - **Paginated search and aggregation** - Pages carrying offset, total and the items
//! - **Element aggregation** - Page through the elements of nested arrays
//! - **Single-document CRUD** - Find, store, partially update and delete with not-found signaling
//! - **Schema migration** - Per-document forward migration driven by a schema-version marker
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docrepo::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> RepositoryResult<()> {
//!     let repository = Repository::new(InMemoryStore::new(), "1");
//!
//!     for index in 0..10 {
//!         repository
//!             .store_one_document("items", doc! { "index": index }, None)
//!             .await?;
//!     }
//!
//!     let page = repository
//!         .search_page_object(
//!             "items",
//!             QueryBuilder::new().with_mod("index", 2, 0).build(),
//!             FindOptions::builder()
//!                 .sort(Some(doc! { "index": 1 }))
//!                 .skip(1)
//!                 .limit(3)
//!                 .build(),
//!             "items",
//!             Some(&rename_store_id),
//!         )
//!         .await?;
//!
//!     assert_eq!(page.total, 5);
//!     println!("{}", page.to_json()?);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Sorting From Query Parameters
//!
//! ```ignore
//! use docrepo::sort::sort_from_query_param;
//!
//! // "name,-createdAt" -> { "name": 1, "created_at": -1 }
//! let order = sort_from_query_param(Some("name,-createdAt"), "order", |key| match key {
//!     "name" => Some("name".to_string()),
//!     "createdAt" => Some("created_at".to_string()),
//!     _ => None,
//! })?;
//! ```
//!
//! # Migrations
//!
//! Every stored document carries a schema-version marker. Documents written by an older schema
//! are rewritten one at a time, through the current model:
//!
//! ```ignore
//! use docrepo::{prelude::*, memory::InMemoryStore};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Task {
//!     title: String,
//!     #[serde(default)]
//!     labels: Vec<String>,
//! }
//!
//! let repository = Repository::new(InMemoryStore::new(), "2");
//! let registry = SchemaRegistry::new().register_model::<Task>("tasks");
//!
//! let report = repository.migrate_registered(&registry).await?;
//! println!("migrated {} documents", report.total());
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docrepo_core::{
    backend, config, error, filter, mapping, migrate, options, page, pipeline, repository, schema, sort,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docrepo_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docrepo_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
