//! Database capability injected into the repository.
//!
//! The [`DocumentBackend`] trait is the narrow, asynchronous interface the repository needs from a
//! document database: counting, finding, inserting, updating, replacing, deleting and running
//! aggregation pipelines against named collections. Filters, updates and pipelines are passed as
//! native BSON documents (the shapes produced by [`QueryBuilder`](crate::filter::QueryBuilder) and
//! [`AggregationBuilder`](crate::pipeline::AggregationBuilder)).
//!
//! Implementations own their connection pooling and must be safe to share between tasks.
//! Errors raised by the database while executing a filter or pipeline are reported as
//! [`RepositoryError::Query`](crate::error::RepositoryError::Query) with the driver's message.
//!
//! # Example
//!
//! ```ignore
//! use docrepo::backend::DocumentBackend;
//! use bson::doc;
//!
//! let id = backend.insert_one("tasks", doc! { "title": "Review" }).await?;
//! let total = backend.count_documents("tasks", doc! {}).await?;
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use std::{fmt::Debug, sync::Arc};

use crate::{error::RepositoryResult, options::FindOptions};

/// Number of documents matched and modified by an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

/// Abstract interface for document database handles.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple async
/// tasks. Each single-document mutation must be applied atomically by the implementation.
#[async_trait]
pub trait DocumentBackend: Send + Sync + Debug {
    /// Counts the documents of `collection` matching `filter`.
    ///
    /// A collection that does not exist counts zero documents.
    async fn count_documents(&self, collection: &str, filter: Document) -> RepositoryResult<u64>;

    /// Finds the documents of `collection` matching `filter`.
    ///
    /// # Arguments
    ///
    /// * `collection` - The name of the collection to query
    /// * `filter` - The filter document; the empty document matches everything
    /// * `options` - Sort, skip, limit and projection applied after filtering
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> RepositoryResult<Vec<Document>>;

    /// Finds the first document of `collection` matching `filter`.
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` when no document matches.
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> RepositoryResult<Option<Document>>;

    /// Inserts a document, returning the identifier the store assigned to it.
    async fn insert_one(&self, collection: &str, document: Document) -> RepositoryResult<Bson>;

    /// Applies an update document (`$set`, `$unset`) to the first document matching `filter`.
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> RepositoryResult<UpdateOutcome>;

    /// Applies an update document to every document matching `filter`.
    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> RepositoryResult<UpdateOutcome>;

    /// Replaces the first document matching `filter`, keeping its identifier.
    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> RepositoryResult<UpdateOutcome>;

    /// Deletes the first document matching `filter`, returning the number of deleted documents.
    async fn delete_one(&self, collection: &str, filter: Document) -> RepositoryResult<u64>;

    /// Runs an aggregation pipeline and collects its output documents.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> RepositoryResult<Vec<Document>>;

    /// Counts the output documents of an aggregation pipeline.
    ///
    /// The default implementation collects the whole output; backends able to count on the
    /// server side should override it.
    async fn count_aggregation(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> RepositoryResult<u64> {
        Ok(self.aggregate(collection, pipeline).await?.len() as u64)
    }
}

macro_rules! forward_document_backend {
    ($($wrapper:ty),* $(,)?) => {$(
        #[async_trait]
        impl<B> DocumentBackend for $wrapper
        where
            B: DocumentBackend + ?Sized,
        {
            async fn count_documents(&self, collection: &str, filter: Document) -> RepositoryResult<u64> {
                (**self).count_documents(collection, filter).await
            }

            async fn find(
                &self,
                collection: &str,
                filter: Document,
                options: FindOptions,
            ) -> RepositoryResult<Vec<Document>> {
                (**self).find(collection, filter, options).await
            }

            async fn find_one(
                &self,
                collection: &str,
                filter: Document,
                projection: Option<Document>,
            ) -> RepositoryResult<Option<Document>> {
                (**self).find_one(collection, filter, projection).await
            }

            async fn insert_one(&self, collection: &str, document: Document) -> RepositoryResult<Bson> {
                (**self).insert_one(collection, document).await
            }

            async fn update_one(
                &self,
                collection: &str,
                filter: Document,
                update: Document,
            ) -> RepositoryResult<UpdateOutcome> {
                (**self).update_one(collection, filter, update).await
            }

            async fn update_many(
                &self,
                collection: &str,
                filter: Document,
                update: Document,
            ) -> RepositoryResult<UpdateOutcome> {
                (**self).update_many(collection, filter, update).await
            }

            async fn replace_one(
                &self,
                collection: &str,
                filter: Document,
                replacement: Document,
            ) -> RepositoryResult<UpdateOutcome> {
                (**self).replace_one(collection, filter, replacement).await
            }

            async fn delete_one(&self, collection: &str, filter: Document) -> RepositoryResult<u64> {
                (**self).delete_one(collection, filter).await
            }

            async fn aggregate(
                &self,
                collection: &str,
                pipeline: Vec<Document>,
            ) -> RepositoryResult<Vec<Document>> {
                (**self).aggregate(collection, pipeline).await
            }

            async fn count_aggregation(
                &self,
                collection: &str,
                pipeline: Vec<Document>,
            ) -> RepositoryResult<u64> {
                (**self).count_aggregation(collection, pipeline).await
            }
        }
    )*};
}

forward_document_backend!(&B, Arc<B>, Box<B>);

/// Factory for asynchronously constructed backends.
#[async_trait]
pub trait BackendBuilder {
    type Backend: DocumentBackend;

    async fn build(self) -> RepositoryResult<Self::Backend>;
}
