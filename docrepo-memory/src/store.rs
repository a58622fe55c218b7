//! In-memory storage implementation of the document backend.
//!
//! Collections are kept as insertion-ordered vectors of BSON documents behind an async-aware
//! read-write lock. Filters, updates and pipelines are evaluated natively, so code written
//! against the in-memory store behaves the same against a real document database.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;
use tracing::trace;

use docrepo_core::{
    backend::{BackendBuilder, DocumentBackend, UpdateOutcome},
    error::{RepositoryError, RepositoryResult},
    mapping::STORE_ID_FIELD,
    options::FindOptions,
};

use crate::{
    aggregate::{run_pipeline, sort_documents},
    evaluator::FilterEvaluator,
    update::{apply_update, get_path, replacement_of, set_path, unset_path},
};

type StoreMap = HashMap<String, Vec<Document>>;

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(flag) => *flag,
        Bson::Int32(value) => *value != 0,
        Bson::Int64(value) => *value != 0,
        Bson::Double(value) => *value != 0.0,
        _ => true,
    }
}

/// Applies an inclusion or exclusion projection.
fn project(document: Document, projection: &Document) -> RepositoryResult<Document> {
    let include_id = projection.get(STORE_ID_FIELD).is_none_or(is_truthy);
    let fields = projection
        .iter()
        .filter(|(field, _)| *field != STORE_ID_FIELD)
        .map(|(field, value)| (field.as_str(), is_truthy(value)))
        .collect::<Vec<_>>();

    let inclusion = fields.iter().any(|(_, include)| *include);
    if inclusion && fields.iter().any(|(_, include)| !*include) {
        return Err(RepositoryError::Query(
            "Cannot mix inclusion and exclusion in a projection".to_string(),
        ));
    }

    if inclusion {
        let mut projected = Document::new();
        if include_id && let Some(id) = document.get(STORE_ID_FIELD) {
            projected.insert(STORE_ID_FIELD, id.clone());
        }
        for (field, _) in fields {
            if let Some(value) = get_path(&document, field) {
                set_path(&mut projected, field, value.clone())?;
            }
        }
        Ok(projected)
    } else {
        let mut projected = document;
        for (field, _) in fields {
            unset_path(&mut projected, field);
        }
        if !include_id {
            projected.remove(STORE_ID_FIELD);
        }
        Ok(projected)
    }
}

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing it to be
/// safely shared across async tasks. Multiple clones of the same instance share the same
/// underlying data.
///
/// # Performance
///
/// Queries scan every document of a collection (no indexing). Intended for development and
/// tests.
///
/// # Example
///
/// ```ignore
/// use docrepo_memory::InMemoryStore;
/// use docrepo_core::backend::DocumentBackend;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// let id = store.insert_one("users", doc! { "name": "Alice", "age": 30 }).await?;
/// assert_eq!(store.count_documents("users", doc! { "age": { "$gt": 18 } }).await?, 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self { store: Arc::new(RwLock::new(StoreMap::new())) }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Names of the collections holding at least one insert so far.
    pub async fn collection_names(&self) -> Vec<String> {
        self.store.read().await.keys().cloned().collect()
    }

    /// Removes a collection with all its documents, returning whether it existed.
    pub async fn drop_collection(&self, name: &str) -> bool {
        self.store.write().await.remove(name).is_some()
    }

    /// Filters, sorts and pages the documents of one collection.
    fn select(documents: &[Document], filter: &Document, options: &FindOptions) -> RepositoryResult<Vec<Document>> {
        let mut selected = FilterEvaluator::new(filter)
            .filter_documents(documents)?
            .into_iter()
            .cloned()
            .collect::<Vec<_>>();

        if let Some(sort) = options.sort.as_ref().filter(|sort| !sort.is_empty()) {
            sort_documents(&mut selected, sort)?;
        }

        let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
        let limit = options
            .limit
            .filter(|limit| *limit > 0)
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));

        selected
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|document| match &options.projection {
                Some(projection) if !projection.is_empty() => project(document, projection),
                _ => Ok(document),
            })
            .collect()
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        many: bool,
    ) -> RepositoryResult<UpdateOutcome> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(UpdateOutcome::default());
        };

        let evaluator = FilterEvaluator::new(filter);
        let mut outcome = UpdateOutcome::default();
        for document in documents.iter_mut() {
            if !evaluator.matches(document)? {
                continue;
            }

            let mut updated = document.clone();
            outcome.matched += 1;
            if apply_update(&mut updated, update)? {
                outcome.modified += 1;
                *document = updated;
            }
            if !many {
                break;
            }
        }

        trace!(collection, matched = outcome.matched, modified = outcome.modified, "Updated documents");

        Ok(outcome)
    }
}

#[async_trait]
impl DocumentBackend for InMemoryStore {
    async fn count_documents(&self, collection: &str, filter: Document) -> RepositoryResult<u64> {
        let store = self.store.read().await;
        match store.get(collection) {
            Some(documents) => Ok(FilterEvaluator::new(&filter).filter_documents(documents)?.len() as u64),
            None => Ok(0),
        }
    }

    async fn find(&self, collection: &str, filter: Document, options: FindOptions) -> RepositoryResult<Vec<Document>> {
        let store = self.store.read().await;
        match store.get(collection) {
            Some(documents) => Self::select(documents, &filter, &options),
            None => Ok(Vec::new()),
        }
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> RepositoryResult<Option<Document>> {
        let options = FindOptions { limit: Some(1), projection, ..FindOptions::default() };
        Ok(self.find(collection, filter, options).await?.into_iter().next())
    }

    async fn insert_one(&self, collection: &str, mut document: Document) -> RepositoryResult<Bson> {
        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        let id = match document.get(STORE_ID_FIELD) {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                document.insert(STORE_ID_FIELD, id.clone());
                id
            }
        };

        if documents.iter().any(|stored| stored.get(STORE_ID_FIELD) == Some(&id)) {
            return Err(RepositoryError::Conflict(format!(
                "Duplicate {STORE_ID_FIELD} {id} in collection {collection}"
            )));
        }

        documents.push(document);
        trace!(collection, id = %id, "Inserted document");

        Ok(id)
    }

    async fn update_one(&self, collection: &str, filter: Document, update: Document) -> RepositoryResult<UpdateOutcome> {
        self.update(collection, &filter, &update, false).await
    }

    async fn update_many(&self, collection: &str, filter: Document, update: Document) -> RepositoryResult<UpdateOutcome> {
        self.update(collection, &filter, &update, true).await
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> RepositoryResult<UpdateOutcome> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(UpdateOutcome::default());
        };

        let evaluator = FilterEvaluator::new(&filter);
        for document in documents.iter_mut() {
            if evaluator.matches(document)? {
                let replaced = replacement_of(document, replacement)?;
                let modified = u64::from(replaced != *document);
                *document = replaced;
                return Ok(UpdateOutcome { matched: 1, modified });
            }
        }

        Ok(UpdateOutcome::default())
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> RepositoryResult<u64> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(0);
        };

        let evaluator = FilterEvaluator::new(&filter);
        let mut position = None;
        for (index, document) in documents.iter().enumerate() {
            if evaluator.matches(document)? {
                position = Some(index);
                break;
            }
        }

        match position {
            Some(index) => {
                documents.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> RepositoryResult<Vec<Document>> {
        let documents = match self.store.read().await.get(collection) {
            Some(documents) => documents.clone(),
            None => Vec::new(),
        };

        run_pipeline(documents, &pipeline)
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use docrepo_memory::InMemoryStore;
/// use docrepo_core::backend::BackendBuilder;
///
/// let store = InMemoryStore::builder()
///     .with_collection("tasks", vec![doc! { "title": "Review" }])
///     .build()
///     .await?;
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder {
    seed: Vec<(String, Vec<Document>)>,
}

impl InMemoryStoreBuilder {
    /// Seeds `collection` with `documents`, assigning identifiers to those without one.
    pub fn with_collection(mut self, collection: impl Into<String>, documents: Vec<Document>) -> Self {
        self.seed.push((collection.into(), documents));
        self
    }
}

#[async_trait]
impl BackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> RepositoryResult<Self::Backend> {
        let store = InMemoryStore::new();
        for (collection, documents) in self.seed {
            for document in documents {
                store.insert_one(&collection, document).await?;
            }
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    async fn seeded() -> InMemoryStore {
        InMemoryStore::builder()
            .with_collection("items", (0..10).map(|i| doc! { "index": i }).collect())
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn insert_assigns_object_ids() {
        let store = InMemoryStore::new();
        let id = store.insert_one("items", doc! { "a": 1 }).await.unwrap();

        assert!(matches!(id, Bson::ObjectId(_)));
        let found = store.find_one("items", doc! { "_id": id.clone() }, None).await.unwrap().unwrap();
        assert_eq!(found.get("a"), Some(&Bson::Int32(1)));
    }

    #[tokio::test]
    async fn duplicate_ids_conflict() {
        let store = InMemoryStore::new();
        store.insert_one("items", doc! { "_id": 1 }).await.unwrap();

        let err = store.insert_one("items", doc! { "_id": 1 }).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn missing_collection_is_empty() {
        let store = InMemoryStore::new();

        assert_eq!(store.count_documents("nothing", doc! {}).await.unwrap(), 0);
        assert!(store.find("nothing", doc! {}, FindOptions::new()).await.unwrap().is_empty());
        assert!(store.aggregate("nothing", vec![doc! { "$match": {} }]).await.unwrap().is_empty());
        assert_eq!(store.delete_one("nothing", doc! {}).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn find_sorts_skips_limits_and_projects() {
        let store = seeded().await;
        let options = FindOptions::builder()
            .sort(Some(doc! { "index": -1 }))
            .skip(2)
            .limit(3)
            .projection(doc! { "_id": 0, "index": 1 })
            .build();

        let found = store.find("items", doc! {}, options).await.unwrap();

        assert_eq!(found, vec![doc! { "index": 7 }, doc! { "index": 6 }, doc! { "index": 5 }]);
    }

    #[tokio::test]
    async fn update_one_and_many() {
        let store = seeded().await;

        let one = store
            .update_one("items", doc! { "index": { "$lt": 5 } }, doc! { "$set": { "low": true } })
            .await
            .unwrap();
        assert_eq!(one, UpdateOutcome { matched: 1, modified: 1 });

        let many = store
            .update_many("items", doc! { "index": { "$lt": 5 } }, doc! { "$set": { "low": true } })
            .await
            .unwrap();
        assert_eq!(many, UpdateOutcome { matched: 5, modified: 4 });
        assert_eq!(store.count_documents("items", doc! { "low": true }).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn replace_keeps_id_and_delete_removes() {
        let store = seeded().await;
        let before = store.find_one("items", doc! { "index": 3 }, None).await.unwrap().unwrap();

        let outcome = store
            .replace_one("items", doc! { "index": 3 }, doc! { "index": 30 })
            .await
            .unwrap();
        assert_eq!(outcome.matched, 1);

        let after = store.find_one("items", doc! { "index": 30 }, None).await.unwrap().unwrap();
        assert_eq!(after.get("_id"), before.get("_id"));

        assert_eq!(store.delete_one("items", doc! { "index": 30 }).await.unwrap(), 1);
        assert_eq!(store.count_documents("items", doc! {}).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn count_aggregation_defaults_to_output_length() {
        let store = seeded().await;

        let total = store
            .count_aggregation("items", vec![doc! { "$match": { "index": { "$mod": [2, 0] } } }])
            .await
            .unwrap();
        assert_eq!(total, 5);
    }

    #[tokio::test]
    async fn invalid_filters_are_query_errors() {
        let store = seeded().await;

        let err = store
            .count_documents("items", doc! { "index": { "$bogus": 1 } })
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Query(_)));
    }

    #[test]
    fn projection_cannot_mix_modes() {
        assert!(project(doc! { "a": 1, "b": 2 }, &doc! { "a": 1, "b": 0 }).is_err());
        assert_eq!(
            project(doc! { "_id": 1, "a": 1, "b": 2 }, &doc! { "b": 0 }).unwrap(),
            doc! { "_id": 1, "a": 1 }
        );
    }
}
