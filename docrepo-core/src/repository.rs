//! The single point of access to the document store.
//!
//! [`Repository`] composes filter documents and aggregation pipelines into paginated search,
//! paginated aggregation, single-document CRUD and per-document schema migration. It returns
//! plain documents; mapping to and from domain models happens at the edges through
//! [`DocumentMapper`]s and [`MigrationCodec`]s.
//!
//! The repository holds no locks and caches nothing: every call round-trips to the backend.
//! Single-document mutations are one request each and therefore atomic per document, while a
//! collection migration is a sequence of such requests and is not atomic as a whole.
//!
//! # Example
//!
//! ```ignore
//! use docrepo::prelude::*;
//!
//! let repository = Repository::new(InMemoryStore::new(), "2");
//!
//! let task = repository
//!     .store_one_document("tasks", doc! { "title": "Review" }, Some(&rename_store_id))
//!     .await?;
//!
//! let page = repository
//!     .search_page_object(
//!         "tasks",
//!         QueryBuilder::new().with_eq_or_regex("title", "/rev/").build(),
//!         FindOptions::builder().limit(10).build(),
//!         "tasks",
//!         Some(&rename_store_id),
//!     )
//!     .await?;
//! ```

use bson::{Bson, Document, doc};
use tracing::{debug, info, warn};

use crate::{
    backend::DocumentBackend,
    config::RepositoryConfig,
    error::{RepositoryError, RepositoryResult},
    mapping::{self, DocumentMapper, STORE_ID_FIELD},
    migrate::{MigrationCodec, MigrationReport, SchemaRegistry, SerdeCodec},
    options::FindOptions,
    page::PageResult,
    pipeline::AggregationBuilder,
    schema::SchemaVersion,
};

/// Treats a missing collection as an empty one when counting.
fn zero_if_missing(result: RepositoryResult<u64>) -> RepositoryResult<u64> {
    match result {
        Err(RepositoryError::CollectionNotFound(_)) => Ok(0),
        other => other,
    }
}

/// Splits a partial update into `$set` for values and `$unset` for nulls.
fn partial_update(update: Document) -> Document {
    let mut set = Document::new();
    let mut unset = Document::new();
    for (field, value) in update {
        match value {
            Bson::Null => {
                unset.insert(field, "");
            }
            value => {
                set.insert(field, value);
            }
        }
    }

    let mut operations = Document::new();
    if !set.is_empty() {
        operations.insert("$set", set);
    }
    if !unset.is_empty() {
        operations.insert("$unset", unset);
    }
    operations
}

/// Document store access bound to a backend and the service's current schema version.
#[derive(Debug)]
pub struct Repository<B: DocumentBackend> {
    backend: B,
    config: RepositoryConfig,
    version: SchemaVersion,
}

impl<B: DocumentBackend> Repository<B> {
    /// Creates a repository writing `schema_version`, with default settings.
    pub fn new(backend: B, schema_version: impl Into<String>) -> Self {
        Self::with_config(backend, RepositoryConfig::new(schema_version))
    }

    pub fn with_config(backend: B, config: RepositoryConfig) -> Self {
        let version = config.version();
        Self { backend, config, version }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn schema_version(&self) -> &SchemaVersion {
        &self.version
    }

    /// Name of the reserved schema marker field.
    pub fn schema_version_field(&self) -> &str {
        &self.config.schema_version_field
    }

    /// Searches a flat collection and returns one page of it.
    ///
    /// Counting and finding run concurrently; a failure of either fails the whole search.
    /// `offset` of the page is `options.skip` and `total` counts every document matching
    /// `query`. `map` is applied to each found document.
    pub async fn search_page_object(
        &self,
        collection: &str,
        query: Document,
        options: FindOptions,
        items_key: &str,
        map: Option<&DocumentMapper>,
    ) -> RepositoryResult<PageResult> {
        let offset = options.skip;
        let count_query = query.clone();
        let (total, found) = futures::try_join!(
            async { zero_if_missing(self.backend.count_documents(collection, count_query).await) },
            self.backend.find(collection, query, options),
        )?;

        let items = found
            .into_iter()
            .map(|document| mapping::apply(map, document))
            .collect::<RepositoryResult<Vec<_>>>()?;

        debug!(collection, offset, total, found = items.len(), "Searched page");

        Ok(PageResult::builder(items_key)
            .with_offset(offset)
            .with_total(total)
            .with_items(items)
            .build())
    }

    /// Counts the documents an aggregation over `collection` filtered by `query` produces.
    ///
    /// Ordering and paging do not change the count, so only the `$match` stage is run. An empty
    /// or missing collection counts zero.
    pub async fn count_aggregation(
        &self,
        collection: &str,
        query: Option<Document>,
    ) -> RepositoryResult<u64> {
        self.count_pipeline(collection, AggregationBuilder::new().r#match(query))
            .await
    }

    async fn count_pipeline(
        &self,
        collection: &str,
        pipeline: AggregationBuilder,
    ) -> RepositoryResult<u64> {
        zero_if_missing(
            self.backend
                .count_aggregation(collection, pipeline.build())
                .await,
        )
    }

    /// Aggregates one page of `collection`.
    ///
    /// The page pipeline is `$match(query)` followed by the ordering and paging stages of
    /// [`AggregationBuilder::sort`]; `total` is the size of the unpaged output.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidArgument`] when `offset + limit` is zero, since the page
    /// would be bounded by an empty `$limit`.
    pub async fn aggregate_page_object(
        &self,
        collection: &str,
        query: Option<Document>,
        order: Option<Document>,
        offset: u64,
        limit: u64,
        items_key: &str,
    ) -> RepositoryResult<PageResult> {
        self.aggregate_page(collection, AggregationBuilder::new(), query, order, offset, limit, items_key)
            .await
    }

    /// Aggregates one page of the elements found under the dotted `element_path`.
    ///
    /// Every array level of the path is unwound first, recording each level's index in
    /// `<segment>Index`; `query` and `order` then apply to the flattened rows.
    #[allow(clippy::too_many_arguments)]
    pub async fn aggregate_element_page_object(
        &self,
        collection: &str,
        element_path: &str,
        query: Option<Document>,
        order: Option<Document>,
        offset: u64,
        limit: u64,
        items_key: &str,
    ) -> RepositoryResult<PageResult> {
        self.aggregate_page(
            collection,
            AggregationBuilder::new().unwind(element_path),
            query,
            order,
            offset,
            limit,
            items_key,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn aggregate_page(
        &self,
        collection: &str,
        base: AggregationBuilder,
        query: Option<Document>,
        order: Option<Document>,
        offset: u64,
        limit: u64,
        items_key: &str,
    ) -> RepositoryResult<PageResult> {
        if offset.saturating_add(limit) == 0 {
            return Err(RepositoryError::InvalidArgument(
                "An aggregation page needs a positive offset + limit".to_string(),
            ));
        }

        let count_pipeline = base.clone().r#match(query.clone());
        let page_pipeline = base
            .r#match(query)
            .sort(order, offset, limit)
            .build();

        let (total, items) = futures::try_join!(
            self.count_pipeline(collection, count_pipeline),
            self.backend.aggregate(collection, page_pipeline),
        )?;

        debug!(collection, offset, total, found = items.len(), "Aggregated page");

        Ok(PageResult::builder(items_key)
            .with_offset(offset)
            .with_total(total)
            .with_items(items)
            .build())
    }

    /// Finds the document matching `query`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] when no document matches.
    pub async fn find_one_document(
        &self,
        collection: &str,
        query: Document,
        projection: Option<Document>,
        map: Option<&DocumentMapper>,
    ) -> RepositoryResult<Document> {
        let found = self
            .backend
            .find_one(collection, query, projection)
            .await?
            .ok_or_else(|| RepositoryError::not_found(collection))?;

        mapping::apply(map, found)
    }

    /// Stores a new document stamped with the current schema version.
    ///
    /// The returned document carries the identifier assigned by the store, after `map` has been
    /// applied to it. A failing `map` is reported as [`RepositoryError::Mapping`] although the
    /// document has been stored; the insert is not compensated.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Conflict`] when the document already carries a store
    /// identifier.
    pub async fn store_one_document(
        &self,
        collection: &str,
        mut document: Document,
        map: Option<&DocumentMapper>,
    ) -> RepositoryResult<Document> {
        if document.contains_key(STORE_ID_FIELD) {
            return Err(RepositoryError::Conflict(format!(
                "Cannot store a document with a predefined {STORE_ID_FIELD} in collection {collection}"
            )));
        }

        document.insert(self.schema_version_field(), self.version.marker());
        let id = self.backend.insert_one(collection, document.clone()).await?;
        document.insert(STORE_ID_FIELD, id.clone());

        debug!(collection, id = %id, "Stored document");

        mapping::apply(map, document).inspect_err(|e| {
            warn!(collection, id = %id, error = %e, "Stored document could not be mapped");
        })
    }

    /// Applies a partial update to the document matching `query`.
    ///
    /// Fields with a null value are removed, every other field is set. The schema marker is left
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidArgument`] without an update document and
    /// [`RepositoryError::NotFound`] when no document matches.
    pub async fn update_one_document(
        &self,
        collection: &str,
        query: Document,
        update: Option<Document>,
    ) -> RepositoryResult<()> {
        let update = update.ok_or_else(|| {
            RepositoryError::InvalidArgument("An update document is required".to_string())
        })?;

        let operations = partial_update(update);
        let matched = if operations.is_empty() {
            zero_if_missing(self.backend.count_documents(collection, query).await)?
        } else {
            self.backend
                .update_one(collection, query, operations)
                .await?
                .matched
        };

        if matched == 0 {
            return Err(RepositoryError::not_found(collection));
        }
        Ok(())
    }

    /// Deletes the document matching `query`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] when no document matches.
    pub async fn delete_one_document(&self, collection: &str, query: Document) -> RepositoryResult<()> {
        match self.backend.delete_one(collection, query).await {
            Ok(0) | Err(RepositoryError::CollectionNotFound(_)) => {
                Err(RepositoryError::not_found(collection))
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Fetches the next batch of possibly stale documents, leaving out the `skipped` ones.
    ///
    /// Rewritten documents drop out of the candidate set on their own, so only candidates found
    /// current need excluding. Identifier order is kept for determinism only; it is not a cursor,
    /// since identifiers of different BSON types never compare.
    async fn next_candidates(
        &self,
        collection: &str,
        skipped: &[Bson],
        limit: u64,
    ) -> RepositoryResult<Vec<Document>> {
        let mut filter = self.version.candidates_filter(self.schema_version_field());
        if !skipped.is_empty() {
            filter.insert(STORE_ID_FIELD, doc! { "$nin": skipped.to_vec() });
        }

        self.backend
            .find(
                collection,
                filter,
                FindOptions::builder()
                    .sort(Some(doc! { STORE_ID_FIELD: 1 }))
                    .limit(limit)
                    .build(),
            )
            .await
    }

    fn store_id(collection: &str, document: &Document) -> RepositoryResult<Bson> {
        document.get(STORE_ID_FIELD).cloned().ok_or_else(|| {
            RepositoryError::Migration(format!(
                "Found a document without {STORE_ID_FIELD} in collection {collection}"
            ))
        })
    }

    /// Decodes, re-encodes, stamps and writes back one stored document.
    ///
    /// Returns whether a document was replaced.
    async fn rewrite(
        &self,
        collection: &str,
        codec: &dyn MigrationCodec,
        mut stored: Document,
    ) -> RepositoryResult<bool> {
        let id = Self::store_id(collection, &stored)?;
        stored.remove(STORE_ID_FIELD);
        stored.remove(self.schema_version_field());

        let mut migrated = codec.migrate(stored)?;
        migrated.remove(STORE_ID_FIELD);
        migrated.insert(self.schema_version_field(), self.version.marker());

        let outcome = self
            .backend
            .replace_one(collection, doc! { STORE_ID_FIELD: id.clone() }, migrated)
            .await?;

        if outcome.matched == 0 {
            debug!(collection, id = %id, "Stale document vanished before it was migrated");
        }
        Ok(outcome.matched > 0)
    }

    /// Migrates up to `max_documents` stale documents of `collection` with `codec`.
    ///
    /// Returns the number of rewritten documents. Having no stale document left is a success.
    ///
    /// # Errors
    ///
    /// A document that cannot be decoded fails the whole call; documents migrated before it stay
    /// migrated.
    pub async fn migrate_collection(
        &self,
        collection: &str,
        codec: &dyn MigrationCodec,
        max_documents: u64,
    ) -> RepositoryResult<u64> {
        let batch_size = self.config.migration_batch_size.max(1);
        let mut migrated = 0;
        let mut skipped = Vec::new();

        'batches: while migrated < max_documents {
            let batch = self
                .next_candidates(collection, &skipped, batch_size)
                .await?;
            let exhausted = (batch.len() as u64) < batch_size;

            for document in batch {
                if migrated >= max_documents {
                    break 'batches;
                }

                if !self.version.is_stale(document.get(self.schema_version_field())) {
                    skipped.push(Self::store_id(collection, &document)?);
                    continue;
                }
                if self.rewrite(collection, codec, document).await? {
                    migrated += 1;
                }
            }

            if exhausted {
                break;
            }
        }

        info!(collection, migrated, version = %self.version, "Migrated collection");

        Ok(migrated)
    }

    /// Same as [`migrate_collection`](Self::migrate_collection), decoding through model `M`.
    pub async fn migrate_collection_as<M>(&self, collection: &str, max_documents: u64) -> RepositoryResult<u64>
    where
        M: serde::Serialize + serde::de::DeserializeOwned + 'static,
    {
        self.migrate_collection(collection, &SerdeCodec::<M>::new(), max_documents)
            .await
    }

    /// Migrates the document matching `query` if it is stale.
    ///
    /// Returns whether the document was rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] when no document matches.
    pub async fn migrate_one_document(
        &self,
        collection: &str,
        query: Document,
        codec: &dyn MigrationCodec,
    ) -> RepositoryResult<bool> {
        let stored = self
            .backend
            .find_one(collection, query, None)
            .await?
            .ok_or_else(|| RepositoryError::not_found(collection))?;

        if !self.version.is_stale(stored.get(self.schema_version_field())) {
            return Ok(false);
        }
        self.rewrite(collection, codec, stored).await
    }

    /// Stamps the current schema version on every stale document, leaving payloads untouched.
    ///
    /// Returns the number of modified documents.
    pub async fn update_schema_version_on_collection(&self, collection: &str) -> RepositoryResult<u64> {
        let batch_size = self.config.migration_batch_size.max(1);
        let mut modified = 0;
        let mut skipped = Vec::new();

        loop {
            let batch = self
                .next_candidates(collection, &skipped, batch_size)
                .await?;
            let exhausted = (batch.len() as u64) < batch_size;

            let mut stale = Vec::new();
            for document in &batch {
                let id = Self::store_id(collection, document)?;
                if self.version.is_stale(document.get(self.schema_version_field())) {
                    stale.push(id);
                } else {
                    skipped.push(id);
                }
            }

            if !stale.is_empty() {
                modified += self
                    .backend
                    .update_many(
                        collection,
                        doc! { STORE_ID_FIELD: { "$in": stale } },
                        doc! { "$set": { self.schema_version_field(): self.version.marker() } },
                    )
                    .await?
                    .modified;
            }

            if exhausted {
                break;
            }
        }

        info!(collection, modified, version = %self.version, "Updated schema version markers");

        Ok(modified)
    }

    /// Migrates every collection of `registry`, each within the configured document budget.
    pub async fn migrate_registered(&self, registry: &SchemaRegistry) -> RepositoryResult<MigrationReport> {
        let mut report = MigrationReport::default();
        for (collection, codec) in registry.iter() {
            let migrated = self
                .migrate_collection(collection, codec, self.config.max_migration_documents)
                .await?;
            report.migrated.push((collection.to_string(), migrated));
        }

        Ok(report)
    }
}
