//! Page results returned by paginated search and aggregation.
//!
//! A [`PageResult`] is the one wire-visible shape produced by the repository:
//!
//! ```text
//! { "offset": <skip>, "total": <matching documents>, "<itemsKey>": [ ... ] }
//! ```
//!
//! `offset` and `total` are always present. The items key is present only when the page holds
//! at least one item, and `total` counts every matching document, not the page length.

use bson::{Bson, Document, doc};
use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::Value;

use crate::error::RepositoryResult;

/// A single page of documents plus its position in the whole result.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    /// Number of documents skipped before this page.
    pub offset: u64,
    /// Number of documents matching the query.
    pub total: u64,
    /// Name of the field holding the items.
    pub items_key: String,
    /// The documents of this page.
    pub items: Vec<Document>,
}

impl PageResult {
    /// Creates a new builder for a page whose items live under `items_key`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let page = PageResult::builder("tasks")
    ///     .with_offset(10)
    ///     .with_total(42)
    ///     .with_items(found)
    ///     .build();
    /// ```
    pub fn builder(items_key: impl Into<String>) -> PageResultBuilder {
        PageResultBuilder::new(items_key)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Converts the page to its document shape, omitting the items key for an empty page.
    pub fn to_document(&self) -> Document {
        let mut page = doc! {
            "offset": to_i64(self.offset),
            "total": to_i64(self.total),
        };

        if !self.items.is_empty() {
            page.insert(
                self.items_key.clone(),
                self.items
                    .iter()
                    .cloned()
                    .map(Bson::Document)
                    .collect::<Vec<_>>(),
            );
        }

        page
    }

    /// Converts the page to a JSON value with the same shape as [`to_document`](Self::to_document).
    pub fn to_json(&self) -> RepositoryResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Serialize for PageResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.items.is_empty() { 2 } else { 3 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("offset", &self.offset)?;
        map.serialize_entry("total", &self.total)?;
        if !self.items.is_empty() {
            map.serialize_entry(&self.items_key, &self.items)?;
        }
        map.end()
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Builder for constructing [`PageResult`] instances with a fluent API.
pub struct PageResultBuilder {
    items_key: String,
    offset: u64,
    total: u64,
    items: Vec<Document>,
}

impl PageResultBuilder {
    /// Creates a new builder for an empty page at offset zero.
    pub fn new(items_key: impl Into<String>) -> Self {
        Self {
            items_key: items_key.into(),
            offset: 0,
            total: 0,
            items: Vec::new(),
        }
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = total;
        self
    }

    pub fn with_items(mut self, items: Vec<Document>) -> Self {
        self.items = items;
        self
    }

    /// Builds and returns the final [`PageResult`] instance.
    pub fn build(self) -> PageResult {
        PageResult {
            offset: self.offset,
            total: self.total,
            items_key: self.items_key,
            items: self.items,
        }
    }
}
