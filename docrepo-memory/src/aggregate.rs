//! Aggregation pipeline execution for in-memory documents.
//!
//! Supports the stages the repository emits (`$unwind`, `$match`, `$sort`, `$limit`, `$skip`)
//! plus `$count`. Any other stage fails with a query error.

use std::cmp::Ordering;

use bson::{Bson, Document};

use docrepo_core::error::{RepositoryError, RepositoryResult};

use crate::{
    evaluator::{Comparable, FilterEvaluator, lookup},
    update::{get_path, set_path},
};

fn query_error(message: impl Into<String>) -> RepositoryError {
    RepositoryError::Query(message.into())
}

fn non_negative(stage: &str, value: &Bson) -> RepositoryResult<usize> {
    let value = match value {
        Bson::Int32(value) => *value as i64,
        Bson::Int64(value) => *value,
        Bson::Double(value) if value.fract() == 0.0 => *value as i64,
        _ => return Err(query_error(format!("{stage} needs an integer"))),
    };
    usize::try_from(value).map_err(|_| query_error(format!("{stage} cannot be negative")))
}

/// Sort key of `document` for `path`: the smallest array element ascending, the largest
/// descending.
fn sort_key<'a>(document: &'a Document, path: &str, descending: bool) -> Comparable<'a> {
    let mut keys = Vec::new();
    for value in lookup(document, path) {
        match value {
            Bson::Array(items) if !items.is_empty() => keys.extend(items.iter().map(Comparable::from)),
            value => keys.push(Comparable::from(value)),
        }
    }

    let key = if descending { keys.into_iter().max() } else { keys.into_iter().min() };
    key.unwrap_or(Comparable::Null)
}

/// Sorts documents in place by a sort specification such as `{ "a": 1, "b": -1 }`.
///
/// The sort is stable, so ties keep their current order.
pub(crate) fn sort_documents(documents: &mut [Document], specification: &Document) -> RepositoryResult<()> {
    if specification.is_empty() {
        return Err(query_error("$sort needs at least one key"));
    }

    let mut keys = Vec::with_capacity(specification.len());
    for (path, direction) in specification {
        let descending = match direction {
            Bson::Int32(1) | Bson::Int64(1) => false,
            Bson::Int32(-1) | Bson::Int64(-1) => true,
            Bson::Double(value) if *value == 1.0 => false,
            Bson::Double(value) if *value == -1.0 => true,
            other => return Err(query_error(format!("Invalid sort direction {other} for {path}"))),
        };
        keys.push((path.as_str(), descending));
    }

    documents.sort_by(|a, b| {
        keys.iter()
            .map(|(path, descending)| {
                let ordering = sort_key(a, path, *descending).cmp(&sort_key(b, path, *descending));
                if *descending { ordering.reverse() } else { ordering }
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    Ok(())
}

struct Unwind {
    path: String,
    index_field: Option<String>,
    preserve_empty: bool,
}

impl Unwind {
    fn parse(operand: &Bson) -> RepositoryResult<Self> {
        let (path, index_field, preserve_empty) = match operand {
            Bson::String(path) => (path.as_str(), None, false),
            Bson::Document(options) => {
                let path = options
                    .get_str("path")
                    .map_err(|_| query_error("$unwind needs a path"))?;
                let index_field = options.get_str("includeArrayIndex").ok().map(String::from);
                let preserve_empty = options.get_bool("preserveNullAndEmptyArrays").unwrap_or(false);
                (path, index_field, preserve_empty)
            }
            _ => return Err(query_error("$unwind needs a path or a document")),
        };

        let path = path
            .strip_prefix('$')
            .filter(|path| !path.is_empty())
            .ok_or_else(|| query_error(format!("$unwind path '{path}' must start with '$'")))?;

        Ok(Self { path: path.to_string(), index_field, preserve_empty })
    }

    fn emit(&self, mut document: Document, value: Option<Bson>, index: Bson, output: &mut Vec<Document>) -> RepositoryResult<()> {
        if let Some(value) = value {
            set_path(&mut document, &self.path, value)?;
        }
        if let Some(field) = &self.index_field {
            set_path(&mut document, field, index)?;
        }
        output.push(document);
        Ok(())
    }

    fn apply(&self, documents: Vec<Document>) -> RepositoryResult<Vec<Document>> {
        let mut output = Vec::with_capacity(documents.len());
        for document in documents {
            match get_path(&document, &self.path).cloned() {
                Some(Bson::Array(items)) if !items.is_empty() => {
                    for (index, item) in items.into_iter().enumerate() {
                        self.emit(document.clone(), Some(item), Bson::Int64(index as i64), &mut output)?;
                    }
                }
                None | Some(Bson::Null) | Some(Bson::Array(_)) => {
                    if self.preserve_empty {
                        self.emit(document, None, Bson::Null, &mut output)?;
                    }
                }
                Some(_) => self.emit(document, None, Bson::Null, &mut output)?,
            }
        }
        Ok(output)
    }
}

/// Runs `pipeline` over `documents`.
pub(crate) fn run_pipeline(mut documents: Vec<Document>, pipeline: &[Document]) -> RepositoryResult<Vec<Document>> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (Some((name, operand)), None) = (entries.next(), entries.next()) else {
            return Err(query_error("A pipeline stage must hold exactly one field"));
        };

        documents = match name.as_str() {
            "$match" => {
                let filter = operand
                    .as_document()
                    .ok_or_else(|| query_error("$match needs a document"))?;
                let evaluator = FilterEvaluator::new(filter);
                let mut kept = Vec::with_capacity(documents.len());
                for document in documents {
                    if evaluator.matches(&document)? {
                        kept.push(document);
                    }
                }
                kept
            }
            "$unwind" => Unwind::parse(operand)?.apply(documents)?,
            "$sort" => {
                let specification = operand
                    .as_document()
                    .ok_or_else(|| query_error("$sort needs a document"))?;
                sort_documents(&mut documents, specification)?;
                documents
            }
            "$limit" => {
                let limit = non_negative("$limit", operand)?;
                if limit == 0 {
                    return Err(query_error("$limit must be positive"));
                }
                documents.truncate(limit);
                documents
            }
            "$skip" => {
                let skip = non_negative("$skip", operand)?;
                documents.into_iter().skip(skip).collect()
            }
            "$count" => {
                let field = operand
                    .as_str()
                    .filter(|field| !field.is_empty() && !field.starts_with('$'))
                    .ok_or_else(|| query_error("$count needs a field name"))?;
                if documents.is_empty() {
                    Vec::new()
                } else {
                    let mut counted = Document::new();
                    counted.insert(field, documents.len() as i64);
                    vec![counted]
                }
            }
            unknown => return Err(query_error(format!("Unrecognized pipeline stage name: '{unknown}'"))),
        };
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn unwind_records_indices_and_drops_empty_arrays() {
        let documents = vec![
            doc! { "n": 1, "a": [{ "b": "x" }, { "b": "y" }] },
            doc! { "n": 2, "a": [] },
            doc! { "n": 3 },
        ];
        let pipeline = vec![doc! { "$unwind": { "path": "$a", "includeArrayIndex": "aIndex" } }];

        let output = run_pipeline(documents, &pipeline).unwrap();

        assert_eq!(
            output,
            vec![
                doc! { "n": 1, "a": { "b": "x" }, "aIndex": 0_i64 },
                doc! { "n": 1, "a": { "b": "y" }, "aIndex": 1_i64 },
            ]
        );
    }

    #[test]
    fn nested_unwind_flattens_every_level() {
        let documents = vec![doc! { "a": [{ "b": [1, 2] }, { "b": [3] }] }];
        let pipeline = vec![
            doc! { "$unwind": { "path": "$a", "includeArrayIndex": "aIndex" } },
            doc! { "$unwind": { "path": "$a.b", "includeArrayIndex": "bIndex" } },
        ];

        let output = run_pipeline(documents, &pipeline).unwrap();

        assert_eq!(output.len(), 3);
        assert_eq!(output[2], doc! { "a": { "b": 3 }, "aIndex": 1_i64, "bIndex": 0_i64 });
    }

    #[test]
    fn unwind_of_scalar_keeps_document() {
        let output = run_pipeline(
            vec![doc! { "a": 5 }],
            &[doc! { "$unwind": { "path": "$a", "includeArrayIndex": "aIndex" } }],
        )
        .unwrap();

        assert_eq!(output, vec![doc! { "a": 5, "aIndex": Bson::Null }]);
    }

    #[test]
    fn sort_limit_skip_page() {
        let documents = (0..6).map(|i| doc! { "i": i }).collect::<Vec<_>>();
        let pipeline = vec![
            doc! { "$sort": { "i": -1 } },
            doc! { "$limit": 4_i64 },
            doc! { "$skip": 2_i64 },
        ];

        let output = run_pipeline(documents, &pipeline).unwrap();

        assert_eq!(output, vec![doc! { "i": 3 }, doc! { "i": 2 }]);
    }

    #[test]
    fn count_stage() {
        let documents = vec![doc! { "a": 1 }, doc! { "a": 2 }];

        assert_eq!(
            run_pipeline(documents, &[doc! { "$count": "total" }]).unwrap(),
            vec![doc! { "total": 2_i64 }]
        );
        assert!(run_pipeline(Vec::new(), &[doc! { "$count": "total" }]).unwrap().is_empty());
    }

    #[test]
    fn sort_orders_across_types_and_missing_fields() {
        let mut documents = vec![doc! { "k": "b" }, doc! { "k": 2 }, doc! {}, doc! { "k": "a" }];
        sort_documents(&mut documents, &doc! { "k": 1 }).unwrap();

        assert_eq!(documents, vec![doc! {}, doc! { "k": 2 }, doc! { "k": "a" }, doc! { "k": "b" }]);
    }

    #[test]
    fn unknown_stage_fails() {
        let err = run_pipeline(vec![doc! {}], &[doc! { "$group": { "_id": Bson::Null } }]).unwrap_err();

        assert!(matches!(err, RepositoryError::Query(_)));
    }
}
