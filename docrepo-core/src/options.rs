//! Sort, skip, limit and projection context of a find query.

use bson::Document;

/// Options applied to a find query after filtering.
///
/// Unlike an aggregation pipeline, a find query skips first and then limits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Number of matching documents to skip.
    pub skip: u64,
    /// Maximum number of documents to return, unbounded when `None`.
    pub limit: Option<u64>,
    /// Ordered mapping from field to `1` or `-1`.
    pub sort: Option<Document>,
    /// Fields to include or exclude from returned documents.
    pub projection: Option<Document>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> FindOptionsBuilder {
        FindOptionsBuilder::new()
    }
}

/// Fluent builder for [`FindOptions`].
#[derive(Debug, Clone, Default)]
pub struct FindOptionsBuilder {
    options: FindOptions,
}

impl FindOptionsBuilder {
    pub fn new() -> Self {
        Self { options: FindOptions::default() }
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.options.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.options.limit = Some(limit);
        self
    }

    /// Sets the sort order; an empty document means no ordering.
    pub fn sort(mut self, sort: Option<Document>) -> Self {
        self.options.sort = sort.filter(|sort| !sort.is_empty());
        self
    }

    pub fn projection(mut self, projection: Document) -> Self {
        self.options.projection = Some(projection);
        self
    }

    pub fn build(self) -> FindOptions {
        self.options
    }
}
