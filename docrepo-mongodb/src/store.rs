use async_trait::async_trait;
use bson::{Bson, Document};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::ClientOptions,
};
use tracing::{debug, trace};

use docrepo_core::{
    backend::{BackendBuilder, DocumentBackend, UpdateOutcome},
    error::{RepositoryError, RepositoryResult},
    options::FindOptions,
};

const DUPLICATE_KEY: i32 = 11000;
const NAMESPACE_NOT_FOUND: i32 = 26;
const COUNT_FIELD: &str = "total";

/// Maps a driver failure on `collection` to the repository error taxonomy.
///
/// Duplicate keys become conflicts and a missing namespace becomes a missing collection; every
/// other failure is reported as a query error carrying the driver's message.
fn map_error(collection: &str, error: MongoError) -> RepositoryError {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY => {
            RepositoryError::Conflict(write_error.message.clone())
        }
        ErrorKind::Command(command_error) if command_error.code == NAMESPACE_NOT_FOUND => {
            RepositoryError::CollectionNotFound(collection.to_string())
        }
        _ => RepositoryError::Query(error.to_string()),
    }
}

fn as_count(value: Option<&Bson>) -> u64 {
    match value {
        Some(Bson::Int32(count)) => u64::try_from(*count).unwrap_or(0),
        Some(Bson::Int64(count)) => u64::try_from(*count).unwrap_or(0),
        Some(Bson::Double(count)) if *count > 0.0 => *count as u64,
        _ => 0,
    }
}

/// MongoDB implementation of [`DocumentBackend`].
///
/// Every operation is a single driver request, so single-document mutations are atomic on the
/// server. Connection pooling is handled by the driver's [`Client`].
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self { client, database: database.into() }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    /// Closes the connection pool, waiting for in-flight operations.
    pub async fn shutdown(self) {
        self.client.shutdown().await;
    }
}

#[async_trait]
impl DocumentBackend for MongoDbStore {
    async fn count_documents(&self, collection: &str, filter: Document) -> RepositoryResult<u64> {
        self.get_collection(collection)
            .count_documents(filter)
            .await
            .map_err(|e| map_error(collection, e))
    }

    async fn find(&self, collection: &str, filter: Document, options: FindOptions) -> RepositoryResult<Vec<Document>> {
        let coll = self.get_collection(collection);
        let mut find = coll.find(filter).skip(options.skip);
        if let Some(limit) = options.limit.filter(|limit| *limit > 0) {
            find = find.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(sort) = options.sort {
            find = find.sort(sort);
        }
        if let Some(projection) = options.projection {
            find = find.projection(projection);
        }

        find.await
            .map_err(|e| map_error(collection, e))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| map_error(collection, e))
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> RepositoryResult<Option<Document>> {
        let coll = self.get_collection(collection);
        let mut find = coll.find_one(filter);
        if let Some(projection) = projection {
            find = find.projection(projection);
        }

        find.await.map_err(|e| map_error(collection, e))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> RepositoryResult<Bson> {
        let inserted = self
            .get_collection(collection)
            .insert_one(document)
            .await
            .map_err(|e| map_error(collection, e))?;

        trace!(collection, id = %inserted.inserted_id, "Inserted document");

        Ok(inserted.inserted_id)
    }

    async fn update_one(&self, collection: &str, filter: Document, update: Document) -> RepositoryResult<UpdateOutcome> {
        let result = self
            .get_collection(collection)
            .update_one(filter, update)
            .await
            .map_err(|e| map_error(collection, e))?;

        Ok(UpdateOutcome { matched: result.matched_count, modified: result.modified_count })
    }

    async fn update_many(&self, collection: &str, filter: Document, update: Document) -> RepositoryResult<UpdateOutcome> {
        let result = self
            .get_collection(collection)
            .update_many(filter, update)
            .await
            .map_err(|e| map_error(collection, e))?;

        Ok(UpdateOutcome { matched: result.matched_count, modified: result.modified_count })
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> RepositoryResult<UpdateOutcome> {
        let result = self
            .get_collection(collection)
            .replace_one(filter, replacement)
            .await
            .map_err(|e| map_error(collection, e))?;

        Ok(UpdateOutcome { matched: result.matched_count, modified: result.modified_count })
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> RepositoryResult<u64> {
        Ok(self
            .get_collection(collection)
            .delete_one(filter)
            .await
            .map_err(|e| map_error(collection, e))?
            .deleted_count)
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> RepositoryResult<Vec<Document>> {
        debug!(collection, stages = pipeline.len(), "Running aggregation");

        self.get_collection(collection)
            .aggregate(pipeline)
            .await
            .map_err(|e| map_error(collection, e))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| map_error(collection, e))
    }

    /// Counts on the server by appending a `$count` stage.
    async fn count_aggregation(&self, collection: &str, mut pipeline: Vec<Document>) -> RepositoryResult<u64> {
        let mut count_stage = Document::new();
        count_stage.insert("$count", COUNT_FIELD);
        pipeline.push(count_stage);

        let counted = self.aggregate(collection, pipeline).await?;

        Ok(as_count(counted.first().and_then(|document| document.get(COUNT_FIELD))))
    }
}

/// Builder connecting a [`MongoDbStore`] from a connection string and a database name.
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl BackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> RepositoryResult<Self::Backend> {
        if self.database.trim().is_empty() {
            return Err(RepositoryError::Initialization("A database name is required".to_string()));
        }

        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| RepositoryError::Initialization(e.to_string()))?,
            )
            .map_err(|e| RepositoryError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn count_reads_any_integer_width() {
        let counted = doc! { "total": 5_i32 };

        assert_eq!(as_count(counted.get(COUNT_FIELD)), 5);
        assert_eq!(as_count(Some(&Bson::Int64(7))), 7);
        assert_eq!(as_count(None), 0);
        assert_eq!(as_count(Some(&Bson::Int32(-1))), 0);
    }

    #[tokio::test]
    async fn builder_rejects_malformed_dsn() {
        let err = MongoDbStore::builder("not-a-dsn", "db").build().await.unwrap_err();

        assert!(matches!(err, RepositoryError::Initialization(_)));
    }

    #[tokio::test]
    async fn builder_requires_database_name() {
        let err = MongoDbStore::builder("mongodb://localhost:27017", " ").build().await.unwrap_err();

        assert!(matches!(err, RepositoryError::Initialization(_)));
    }
}
