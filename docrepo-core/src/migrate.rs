//! Per-document schema migration.
//!
//! Stored documents are forward-migrated in place: a stale document is decoded into the
//! current model, encoded back, stamped with the current schema version and written over the
//! original. Decoding is what adapts an old shape to the new one: legacy fields unknown to the
//! model are dropped and fields missing from the stored document take their serde defaults.
//!
//! # Migration Traits
//!
//! - [`MigrationCodec`] - Decode/encode pair applied to one stored document
//! - [`SerdeCodec`] - Codec driven by a model's `Serialize`/`Deserialize` implementation
//! - [`SchemaRegistry`] - Collection name to codec registry used for bulk migration
//!
//! # Example
//!
//! ```ignore
//! use docrepo::migrate::{SchemaRegistry, SerdeCodec};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Task {
//!     title: String,
//!     #[serde(default)]
//!     labels: Vec<String>,
//! }
//!
//! let registry = SchemaRegistry::new()
//!     .register("tasks", SerdeCodec::<Task>::new());
//!
//! let report = repository.migrate_registered(&registry).await?;
//! ```

use bson::{Document, de::deserialize_from_document, ser::serialize_to_document};
use serde::{Serialize, de::DeserializeOwned};
use std::{fmt, marker::PhantomData};

use crate::error::{RepositoryError, RepositoryResult};

/// Converts a stored document of any older shape into the current shape.
///
/// The returned document must not depend on the store identifier or the schema marker; the
/// repository restores the first and stamps the second.
pub trait MigrationCodec: Send + Sync {
    fn migrate(&self, stored: Document) -> RepositoryResult<Document>;
}

impl<F> MigrationCodec for F
where
    F: Fn(Document) -> RepositoryResult<Document> + Send + Sync,
{
    fn migrate(&self, stored: Document) -> RepositoryResult<Document> {
        self(stored)
    }
}

/// Codec decoding through the current model type `M`.
pub struct SerdeCodec<M> {
    _marker: PhantomData<fn() -> M>,
}

impl<M> SerdeCodec<M> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<M> Default for SerdeCodec<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for SerdeCodec<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerdeCodec<{}>", std::any::type_name::<M>())
    }
}

impl<M> MigrationCodec for SerdeCodec<M>
where
    M: Serialize + DeserializeOwned,
{
    fn migrate(&self, stored: Document) -> RepositoryResult<Document> {
        let model = deserialize_from_document::<M>(stored).map_err(|e| {
            RepositoryError::Migration(format!(
                "Cannot decode document as {}: {e}",
                std::any::type_name::<M>()
            ))
        })?;

        Ok(serialize_to_document(&model)?)
    }
}

pub type CodecRef = Box<dyn MigrationCodec>;

/// Registry of the collections a service migrates, each with the codec of its current model.
#[derive(Default)]
pub struct SchemaRegistry {
    codecs: Vec<(String, CodecRef)>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Registers `codec` for `collection`, replacing any codec registered before.
    pub fn register(mut self, collection: impl Into<String>, codec: impl MigrationCodec + 'static) -> Self {
        let collection = collection.into();
        self.codecs.retain(|(name, _)| *name != collection);
        self.codecs.push((collection, Box::new(codec)));
        self
    }

    /// Registers a [`SerdeCodec`] for model `M`.
    pub fn register_model<M>(self, collection: impl Into<String>) -> Self
    where
        M: Serialize + DeserializeOwned + 'static,
    {
        self.register(collection, SerdeCodec::<M>::new())
    }

    pub fn get(&self, collection: &str) -> Option<&dyn MigrationCodec> {
        self.codecs
            .iter()
            .find(|(name, _)| name == collection)
            .map(|(_, codec)| codec.as_ref())
    }

    /// Iterates the registered collections in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn MigrationCodec)> {
        self.codecs
            .iter()
            .map(|(name, codec)| (name.as_str(), codec.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.codecs.iter().map(|(name, _)| name))
            .finish()
    }
}

/// Number of documents rewritten per collection by a bulk migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: Vec<(String, u64)>,
}

impl MigrationReport {
    pub fn total(&self) -> u64 {
        self.migrated.iter().map(|(_, count)| count).sum()
    }

    pub fn migrated_in(&self, collection: &str) -> Option<u64> {
        self.migrated
            .iter()
            .find(|(name, _)| name == collection)
            .map(|(_, count)| *count)
    }
}
