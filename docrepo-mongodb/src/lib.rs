//! MongoDB backend implementation for docrepo.
//!
//! This crate provides a MongoDB-based implementation of the `DocumentBackend` trait. Filter
//! documents, update documents and aggregation pipelines built by the repository are handed to
//! the server unchanged.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docrepo = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data is persisted to MongoDB Atlas or self-hosted MongoDB
//! - **Native queries** - Filters and pipelines run on MongoDB's query engine
//! - **Server-side counting** - Aggregation totals use a `$count` stage
//! - **Async/await** - Fully asynchronous API built on MongoDB's async driver
//!
//! # Example
//!
//! ```ignore
//! use docrepo::{backend::BackendBuilder, mongodb::MongoDbStore, repository::Repository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!     let repository = Repository::new(store, "3");
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_mongodb;

pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
