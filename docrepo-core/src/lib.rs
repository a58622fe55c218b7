//! A document repository layer over schemaless document stores.
//!
//! This crate is the core of the docrepo project and provides:
//!
//! - **Filter composition** ([`filter`]) - Fluent construction of native filter documents
//! - **Aggregation pipelines** ([`pipeline`]) - Unwind, match, sort and paging stages
//! - **Sort parsing** ([`sort`]) - Query-parameter sort keys with alias resolution and validation
//! - **Paginated results** ([`page`]) - The page envelope returned by searches and aggregations
//! - **Store backend abstraction** ([`backend`]) - The capability a database must provide
//! - **Repository** ([`repository`]) - Paginated search, aggregation, CRUD and migration
//! - **Schema versions** ([`schema`]) and **migrations** ([`migrate`]) - Per-document forward migration
//! - **Mapping** ([`mapping`]) - Transforms applied to documents at the repository edges
//! - **Configuration** ([`config`]) - Repository settings loadable with serde
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docrepo_core::{filter::QueryBuilder, options::FindOptions, repository::Repository};
//!
//! let repository = Repository::new(backend, "2");
//!
//! let query = QueryBuilder::new()
//!     .with_eq_or_regex("name", Some("/^al/"))
//!     .with_range("age", Some(18), None)
//!     .build();
//!
//! let page = repository
//!     .search_page_object("people", query, FindOptions::builder().limit(20).build(), "people", None)
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_core;

pub mod backend;
pub mod config;
pub mod error;
pub mod filter;
pub mod mapping;
pub mod migrate;
pub mod options;
pub mod page;
pub mod pipeline;
pub mod repository;
pub mod schema;
pub mod sort;
