//! Incremental construction of filter documents.
//!
//! [`QueryBuilder`] assembles one filter document field by field. Every `with*` call either
//! adds a key or is a no-op, so a request handler can feed optional query parameters straight
//! into the builder without checking each of them first:
//!
//! ```ignore
//! use docrepo::filter::QueryBuilder;
//!
//! let filter = QueryBuilder::new()
//!     .with_eq_or_regex("name", params.name.as_deref())
//!     .with_regex_all("keywords", &params.keywords)
//!     .with_range("index", params.from, params.to)
//!     .with_exist("deletedAt", Some(false))
//!     .build();
//! ```
//!
//! An untouched builder yields the empty document, which matches every stored document.

use bson::{Bson, Document, doc};

/// Case-insensitive regular expression matcher for a pattern.
fn regex_of(pattern: &str) -> Document {
    doc! { "$regex": pattern, "$options": "i" }
}

/// Returns the inner text of a `/…/` token, or `None` if the token is a plain value.
fn regex_token(token: &str) -> Option<&str> {
    let trimmed = token.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('/') && trimmed.ends_with('/') {
        Some(&trimmed[1..trimmed.len() - 1])
    } else {
        None
    }
}

/// Either an exact value or a case-insensitive regex, following the `/…/` convention.
fn eq_or_regex_of(token: &str) -> Bson {
    match regex_token(token) {
        Some(pattern) => Bson::Document(regex_of(pattern)),
        None => Bson::String(token.to_string()),
    }
}

/// Fluent builder for a single filter document.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Document,
}

impl QueryBuilder {
    /// Creates a builder holding the empty (match-all) filter.
    pub fn new() -> Self {
        Self { query: Document::new() }
    }

    /// Matches `field` against `pattern` ignoring case.
    ///
    /// No-op when the pattern is missing or blank.
    pub fn with_regex<'a>(mut self, field: &str, pattern: impl Into<Option<&'a str>>) -> Self {
        if let Some(pattern) = pattern.into().filter(|pattern| !pattern.trim().is_empty()) {
            self.query.insert(field, regex_of(pattern));
        }
        self
    }

    /// Requires the array `field` to hold, for every pattern, an element matching it.
    ///
    /// Blank patterns are skipped; no-op when nothing remains.
    pub fn with_regex_all<I, S>(mut self, field: &str, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let matchers = patterns
            .into_iter()
            .filter(|pattern| !pattern.as_ref().trim().is_empty())
            .map(|pattern| Bson::Document(doc! { "$elemMatch": regex_of(pattern.as_ref()) }))
            .collect::<Vec<_>>();

        if !matchers.is_empty() {
            self.query.insert(field, doc! { "$all": matchers });
        }
        self
    }

    /// Sets `field` to `value`, unconditionally.
    ///
    /// A `Bson::Null` (or `None`) value is kept: it matches documents where the field is missing
    /// or explicitly null.
    pub fn with(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.query.insert(field, value.into());
        self
    }

    /// Matches `field` exactly, or by case-insensitive regex when the token is written `/…/`.
    ///
    /// No-op when the token is missing or blank.
    pub fn with_eq_or_regex<'a>(mut self, field: &str, token: impl Into<Option<&'a str>>) -> Self {
        if let Some(token) = token.into().filter(|token| !token.trim().is_empty()) {
            self.query.insert(field, eq_or_regex_of(token));
        }
        self
    }

    /// Requires the array `field` to contain, for every token, a matching element.
    pub fn with_eq_or_regex_all<I, S>(self, field: &str, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.with_elem_match_all(field, tokens, |token| match regex_token(token) {
            Some(pattern) => regex_of(pattern),
            None => doc! { "$eq": token },
        })
    }

    /// Same as [`with_eq_or_regex_all`](Self::with_eq_or_regex_all), testing `sub_field` of
    /// each array element instead of the element itself.
    pub fn with_element_eq_or_regex<I, S>(self, field: &str, sub_field: &str, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.with_elem_match_all(field, tokens, |token| doc! { sub_field: eq_or_regex_of(token) })
    }

    fn with_elem_match_all<I, S, F>(mut self, field: &str, tokens: I, matcher: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&str) -> Document,
    {
        let matchers = tokens
            .into_iter()
            .filter(|token| !token.as_ref().trim().is_empty())
            .map(|token| Bson::Document(doc! { "$elemMatch": matcher(token.as_ref()) }))
            .collect::<Vec<_>>();

        if !matchers.is_empty() {
            self.query.insert(field, doc! { "$all": matchers });
        }
        self
    }

    /// Bounds `field` by the given inclusive limits, using only those present.
    pub fn with_range<T: Into<Bson>>(mut self, field: &str, min: Option<T>, max: Option<T>) -> Self {
        let mut range = Document::new();
        if let Some(min) = min {
            range.insert("$gte", min.into());
        }
        if let Some(max) = max {
            range.insert("$lte", max.into());
        }

        if !range.is_empty() {
            self.query.insert(field, range);
        }
        self
    }

    /// `Some(true)` requires a non-null `field`, `Some(false)` requires it missing or null.
    pub fn with_exist(mut self, field: &str, flag: Option<bool>) -> Self {
        match flag {
            Some(true) => {
                self.query.insert(field, doc! { "$exists": true, "$ne": Bson::Null });
            }
            Some(false) => {
                self.query.insert(field, Bson::Null);
            }
            None => {}
        }
        self
    }

    /// Missing token means "field missing or null"; otherwise behaves as
    /// [`with_eq_or_regex`](Self::with_eq_or_regex).
    pub fn with_no_exist_null_eq_or_regex(self, field: &str, token: Option<&str>) -> Self {
        match token {
            None => self.with_exist(field, Some(false)),
            Some(token) => self.with_eq_or_regex(field, token),
        }
    }

    /// Matches numeric `field` values where `value % divisor == remainder`.
    pub fn with_mod(mut self, field: &str, divisor: i64, remainder: i64) -> Self {
        self.query.insert(field, doc! { "$mod": [divisor, remainder] });
        self
    }

    /// Returns the accumulated filter document.
    pub fn build(self) -> Document {
        self.query
    }
}

/// Splits a dotted element path into trimmed, non-empty segments.
///
/// `" a . b "` yields `["a", "b"]`; a missing or blank path yields nothing.
pub fn split_element_path(path: Option<&str>) -> Vec<String> {
    path.map(str::trim)
        .filter(|path| !path.is_empty())
        .map(|path| {
            path.split('.')
                .map(str::trim)
                .filter(|segment| !segment.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_builder_matches_everything() {
        assert_eq!(QueryBuilder::new().build(), Document::new());
    }

    #[test]
    fn no_op_calls_leave_filter_empty() {
        let empty: Vec<String> = Vec::new();
        let filter = QueryBuilder::new()
            .with_regex("a", None)
            .with_regex("b", "   ")
            .with_regex_all("c", &empty)
            .with_eq_or_regex("d", None)
            .with_eq_or_regex("e", "")
            .with_eq_or_regex_all("f", &empty)
            .with_element_eq_or_regex("g", "sub", &empty)
            .with_range::<i32>("h", None, None)
            .with_exist("i", None)
            .build();

        assert_eq!(filter, Document::new());
    }

    #[test]
    fn regex_is_case_insensitive() {
        let filter = QueryBuilder::new().with_regex("name", "^al").build();

        assert_eq!(filter, doc! { "name": { "$regex": "^al", "$options": "i" } });
    }

    #[test]
    fn regex_all_requires_every_pattern() {
        let filter = QueryBuilder::new()
            .with_regex_all("keywords", ["one", "two"])
            .build();

        assert_eq!(
            filter,
            doc! {
                "keywords": {
                    "$all": [
                        { "$elemMatch": { "$regex": "one", "$options": "i" } },
                        { "$elemMatch": { "$regex": "two", "$options": "i" } },
                    ]
                }
            }
        );
    }

    #[test]
    fn with_keeps_explicit_null() {
        let filter = QueryBuilder::new()
            .with("deleted", Bson::Null)
            .with("status", "open")
            .build();

        assert_eq!(filter, doc! { "deleted": Bson::Null, "status": "open" });
    }

    #[test]
    fn eq_or_regex_detects_slashes() {
        let filter = QueryBuilder::new()
            .with_eq_or_regex("exact", "value")
            .with_eq_or_regex("pattern", " /val.*/ ")
            .build();

        assert_eq!(
            filter,
            doc! {
                "exact": "value",
                "pattern": { "$regex": "val.*", "$options": "i" },
            }
        );
    }

    #[test]
    fn eq_or_regex_all_mixes_matchers() {
        let filter = QueryBuilder::new()
            .with_eq_or_regex_all("tags", vec!["red", "/bl.*/"])
            .build();

        assert_eq!(
            filter,
            doc! {
                "tags": {
                    "$all": [
                        { "$elemMatch": { "$eq": "red" } },
                        { "$elemMatch": { "$regex": "bl.*", "$options": "i" } },
                    ]
                }
            }
        );
    }

    #[test]
    fn element_eq_or_regex_targets_sub_field() {
        let filter = QueryBuilder::new()
            .with_element_eq_or_regex("norms", "attribute", ["age", "/^lang/"])
            .build();

        assert_eq!(
            filter,
            doc! {
                "norms": {
                    "$all": [
                        { "$elemMatch": { "attribute": "age" } },
                        { "$elemMatch": { "attribute": { "$regex": "^lang", "$options": "i" } } },
                    ]
                }
            }
        );
    }

    #[test]
    fn range_uses_present_bounds_only() {
        let both = QueryBuilder::new().with_range("index", Some(1), Some(5)).build();
        let lower = QueryBuilder::new().with_range("index", Some(1), None).build();
        let upper = QueryBuilder::new().with_range("index", None, Some(5)).build();

        assert_eq!(both, doc! { "index": { "$gte": 1, "$lte": 5 } });
        assert_eq!(lower, doc! { "index": { "$gte": 1 } });
        assert_eq!(upper, doc! { "index": { "$lte": 5 } });
    }

    #[test]
    fn exist_flags() {
        let present = QueryBuilder::new().with_exist("f", Some(true)).build();
        let absent = QueryBuilder::new().with_exist("f", Some(false)).build();

        assert_eq!(present, doc! { "f": { "$exists": true, "$ne": Bson::Null } });
        assert_eq!(absent, doc! { "f": Bson::Null });
    }

    #[test]
    fn no_exist_null_eq_or_regex() {
        let missing = QueryBuilder::new()
            .with_no_exist_null_eq_or_regex("f", None)
            .build();
        let regex = QueryBuilder::new()
            .with_no_exist_null_eq_or_regex("f", Some("/x/"))
            .build();

        assert_eq!(missing, doc! { "f": Bson::Null });
        assert_eq!(regex, doc! { "f": { "$regex": "x", "$options": "i" } });
    }

    #[test]
    fn split_element_path_trims_segments() {
        assert_eq!(split_element_path(Some(" a . b.c ")), vec!["a", "b", "c"]);
        assert!(split_element_path(Some("   ")).is_empty());
        assert!(split_element_path(None).is_empty());
    }
}
