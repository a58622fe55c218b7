//! In-memory document storage backend for docrepo.
//!
//! This crate provides a thread-safe, in-memory implementation of the `DocumentBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is meant for development and
//! testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Native filters** - Evaluates the same filter documents a document database accepts,
//!   including dotted paths through arrays, regex, `$elemMatch`, `$all` and `$mod`
//! - **Aggregation** - Runs `$unwind`, `$match`, `$sort`, `$limit`, `$skip` and `$count` stages
//! - **Updates** - `$set` and `$unset` on dotted paths, whole-document replacement
//! - **Store identifiers** - Assigns an `ObjectId` to every inserted document without `_id`
//!
//! # Quick Start
//!
//! ```ignore
//! use docrepo::{memory::InMemoryStore, repository::Repository};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repository = Repository::new(InMemoryStore::new(), "1");
//!
//!     let stored = repository
//!         .store_one_document("users", doc! { "name": "Alice" }, None)
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_memory;

pub mod store;
mod aggregate;
mod evaluator;
mod update;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
