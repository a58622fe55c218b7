//! Update documents and dotted-path writes for in-memory documents.

use bson::{Bson, Document};

use docrepo_core::{
    error::{RepositoryError, RepositoryResult},
    mapping::STORE_ID_FIELD,
};

fn query_error(message: impl Into<String>) -> RepositoryError {
    RepositoryError::Query(message.into())
}

/// Reads the value at the dotted `path`, descending through nested documents only.
pub(crate) fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(doc) => doc.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Writes `value` at the dotted `path`, creating intermediate documents as needed.
///
/// # Errors
///
/// Returns [`RepositoryError::Query`] when an intermediate value is neither a document nor an
/// array addressed by position.
pub(crate) fn set_path(document: &mut Document, path: &str, value: Bson) -> RepositoryResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            let child = document
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(Document::new()));
            set_in_value(child, path, rest, value)
        }
    }
}

fn set_in_value(target: &mut Bson, full_path: &str, rest: &str, value: Bson) -> RepositoryResult<()> {
    match target {
        Bson::Document(doc) => set_path(doc, rest, value),
        Bson::Array(items) => {
            let (head, tail) = match rest.split_once('.') {
                Some((head, tail)) => (head, Some(tail)),
                None => (rest, None),
            };
            let slot = head
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get_mut(index))
                .ok_or_else(|| query_error(format!("Cannot create field '{head}' in array at {full_path}")))?;
            match tail {
                None => {
                    *slot = value;
                    Ok(())
                }
                Some(tail) => set_in_value(slot, full_path, tail, value),
            }
        }
        other => Err(query_error(format!(
            "Cannot create field in element {other} at {full_path}"
        ))),
    }
}

/// Removes the value at the dotted `path`, returning it when present.
pub(crate) fn unset_path(document: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => document.remove(path),
        Some((head, rest)) => match document.get_mut(head)? {
            Bson::Document(doc) => unset_path(doc, rest),
            _ => None,
        },
    }
}

/// Applies an update document made of `$set` and `$unset` to `document`.
///
/// Returns whether the document changed.
///
/// # Errors
///
/// Returns [`RepositoryError::Query`] for other operators, for malformed operands and for an
/// attempt to change the store identifier.
pub(crate) fn apply_update(document: &mut Document, update: &Document) -> RepositoryResult<bool> {
    let before = document.clone();

    for (operator, operand) in update {
        let fields = operand
            .as_document()
            .ok_or_else(|| query_error(format!("{operator} needs a document")))?;

        match operator.as_str() {
            "$set" => {
                for (path, value) in fields {
                    if path == STORE_ID_FIELD && document.get(STORE_ID_FIELD) != Some(value) {
                        return Err(query_error(format!("Cannot modify the immutable field {STORE_ID_FIELD}")));
                    }
                    set_path(document, path, value.clone())?;
                }
            }
            "$unset" => {
                for path in fields.keys() {
                    if path == STORE_ID_FIELD {
                        return Err(query_error(format!("Cannot modify the immutable field {STORE_ID_FIELD}")));
                    }
                    unset_path(document, path);
                }
            }
            other if other.starts_with('$') => {
                return Err(query_error(format!("Unknown update operator {other}")));
            }
            other => {
                return Err(query_error(format!("Update documents may only hold operators, found {other}")));
            }
        }
    }

    Ok(*document != before)
}

/// Builds the document replacing `current`, keeping its store identifier.
pub(crate) fn replacement_of(current: &Document, replacement: Document) -> RepositoryResult<Document> {
    if let Some(key) = replacement.keys().find(|key| key.starts_with('$')) {
        return Err(query_error(format!("Replacement documents cannot hold operators, found {key}")));
    }

    let id = current.get(STORE_ID_FIELD).cloned().unwrap_or(Bson::Null);
    if let Some(new_id) = replacement.get(STORE_ID_FIELD)
        && *new_id != id
    {
        return Err(query_error(format!("Cannot modify the immutable field {STORE_ID_FIELD}")));
    }

    let mut replaced = Document::new();
    replaced.insert(STORE_ID_FIELD, id);
    for (key, value) in replacement {
        if key != STORE_ID_FIELD {
            replaced.insert(key, value);
        }
    }
    Ok(replaced)
}
