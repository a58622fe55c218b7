//! Aggregation pipeline construction.
//!
//! [`AggregationBuilder`] produces the ordered stage list used to extract and paginate a
//! flattened sub-resource that may be nested under several array-valued fields. Unwinding a
//! dotted path emits one `$unwind` stage per path prefix, parent array first, each recording
//! the element index of its level:
//!
//! ```ignore
//! let pipeline = AggregationBuilder::new()
//!     .unwind("plans.steps")
//!     .r#match(doc! { "steps.done": false })
//!     .sort(None, 0, 20)
//!     .build();
//! // [{ $unwind: { path: "$plans", includeArrayIndex: "plansIndex" } },
//! //  { $unwind: { path: "$plans.steps", includeArrayIndex: "stepsIndex" } },
//! //  { $match: ... }, { $limit: 20 }]
//! ```

use bson::{Document, doc};

use crate::filter::split_element_path;

/// Suffix of the field recording the array index of an unwound level.
pub const INDEX_FIELD_SUFFIX: &str = "Index";

/// Fluent builder for an ordered aggregation pipeline.
#[derive(Debug, Clone, Default)]
pub struct AggregationBuilder {
    stages: Vec<Document>,
}

impl AggregationBuilder {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Unwinds every array level of a dotted element path.
    ///
    /// No-op if the trimmed path is empty.
    pub fn unwind(self, element_path: &str) -> Self {
        let segments = split_element_path(Some(element_path));
        self.unwind_path(segments.as_slice())
    }

    /// Same as [`unwind`](Self::unwind) with the path already split into segments.
    pub fn unwind_path<S: AsRef<str>>(mut self, segments: &[S]) -> Self {
        let mut prefix = String::new();
        for segment in segments {
            let segment = segment.as_ref();
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(segment);

            self.stages.push(doc! {
                "$unwind": {
                    "path": format!("${prefix}"),
                    "includeArrayIndex": format!("{segment}{INDEX_FIELD_SUFFIX}"),
                }
            });
        }
        self
    }

    /// Appends a `$match` stage, unless the query is missing or empty.
    pub fn r#match(mut self, query: Option<Document>) -> Self {
        if let Some(query) = query.filter(|query| !query.is_empty()) {
            self.stages.push(doc! { "$match": query });
        }
        self
    }

    /// Appends the ordering and paging stages.
    ///
    /// The result is bounded to `offset + limit` before skipping `offset`, so `$limit` always
    /// precedes `$skip`. `$sort` is only emitted for a non-empty order and `$skip` only for a
    /// positive offset.
    pub fn sort(mut self, order: Option<Document>, offset: u64, limit: u64) -> Self {
        if let Some(order) = order.filter(|order| !order.is_empty()) {
            self.stages.push(doc! { "$sort": order });
        }

        self.stages.push(doc! { "$limit": to_i64(offset.saturating_add(limit)) });
        if offset > 0 {
            self.stages.push(doc! { "$skip": to_i64(offset) });
        }
        self
    }

    /// Returns the accumulated stages in order.
    pub fn build(self) -> Vec<Document> {
        self.stages
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_builder_yields_empty_pipeline() {
        assert!(AggregationBuilder::new().build().is_empty());
    }

    #[test]
    fn unwind_emits_one_stage_per_prefix() {
        let pipeline = AggregationBuilder::new().unwind("a.b.c").build();

        assert_eq!(
            pipeline,
            vec![
                doc! { "$unwind": { "path": "$a", "includeArrayIndex": "aIndex" } },
                doc! { "$unwind": { "path": "$a.b", "includeArrayIndex": "bIndex" } },
                doc! { "$unwind": { "path": "$a.b.c", "includeArrayIndex": "cIndex" } },
            ]
        );
    }

    #[test]
    fn unwind_blank_path_is_no_op() {
        assert!(AggregationBuilder::new().unwind("  ").build().is_empty());

        let none: [&str; 0] = [];
        assert!(AggregationBuilder::new().unwind_path(&none[..]).build().is_empty());
    }

    #[test]
    fn unwind_path_accepts_segments() {
        let pipeline = AggregationBuilder::new().unwind_path(&["x", "y"][..]).build();

        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline[1], doc! { "$unwind": { "path": "$x.y", "includeArrayIndex": "yIndex" } });
    }

    #[test]
    fn match_skips_missing_or_empty_query() {
        let pipeline = AggregationBuilder::new()
            .r#match(None)
            .r#match(Some(Document::new()))
            .r#match(Some(doc! { "k": 1 }))
            .build();

        assert_eq!(pipeline, vec![doc! { "$match": { "k": 1 } }]);
    }

    #[test]
    fn sort_without_order_only_limits() {
        let pipeline = AggregationBuilder::new().sort(None, 0, 100).build();

        assert_eq!(pipeline, vec![doc! { "$limit": 100_i64 }]);
    }

    #[test]
    fn sort_with_empty_order_limits_then_skips() {
        let pipeline = AggregationBuilder::new()
            .sort(Some(Document::new()), 1, 2)
            .build();

        assert_eq!(pipeline, vec![doc! { "$limit": 3_i64 }, doc! { "$skip": 1_i64 }]);
    }

    #[test]
    fn sort_with_order() {
        let pipeline = AggregationBuilder::new()
            .sort(Some(doc! { "k": 1 }), 1, 2)
            .build();

        assert_eq!(
            pipeline,
            vec![
                doc! { "$sort": { "k": 1 } },
                doc! { "$limit": 3_i64 },
                doc! { "$skip": 1_i64 },
            ]
        );
    }
}
