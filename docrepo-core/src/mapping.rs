//! Transforms applied to documents at the edges of the repository.
//!
//! A [`DocumentMapper`] turns a raw stored document into the representation a caller wants to
//! hand out (renaming the store identifier, stripping storage-internal fields, ...). Mappers are
//! pure and synchronous; a mapper failure is reported by the repository as
//! [`RepositoryError::Mapping`](crate::error::RepositoryError::Mapping).

use bson::{Bson, Document, ser::serialize_to_document};
use serde_json::Value;

use crate::error::{RepositoryError, RepositoryResult};

/// Name of the identifier field assigned by the store.
pub const STORE_ID_FIELD: &str = "_id";

/// Name of the identifier field of domain models.
pub const MODEL_ID_FIELD: &str = "id";

pub type MapperError = Box<dyn std::error::Error + Send + Sync>;

/// A caller supplied document transform.
pub type DocumentMapper = dyn Fn(Document) -> Result<Document, MapperError> + Send + Sync;

/// Applies an optional mapper, converting its failure into a mapping error.
pub(crate) fn apply(mapper: Option<&DocumentMapper>, document: Document) -> RepositoryResult<Document> {
    match mapper {
        Some(mapper) => mapper(document).map_err(|e| RepositoryError::Mapping(e.to_string())),
        None => Ok(document),
    }
}

/// Moves the store identifier to the model `id` field, rendering object ids as hex strings.
pub fn rename_store_id(mut document: Document) -> Result<Document, MapperError> {
    if let Some(id) = document.remove(STORE_ID_FIELD) {
        let id = match id {
            Bson::ObjectId(oid) => Bson::String(oid.to_hex()),
            other => other,
        };
        document.insert(MODEL_ID_FIELD, id);
    }
    Ok(document)
}

/// Returns a mapper removing `field` from every document.
pub fn strip_field(
    field: impl Into<String>,
) -> impl Fn(Document) -> Result<Document, MapperError> + Send + Sync {
    let field = field.into();
    move |mut document: Document| {
        document.remove(&field);
        Ok(document)
    }
}

/// Returns a mapper applying `first` then `second`.
pub fn compose<F, G>(first: F, second: G) -> impl Fn(Document) -> Result<Document, MapperError> + Send + Sync
where
    F: Fn(Document) -> Result<Document, MapperError> + Send + Sync,
    G: Fn(Document) -> Result<Document, MapperError> + Send + Sync,
{
    move |document| second(first(document)?)
}

/// Converts a stored document to a JSON value.
pub fn document_to_json(document: &Document) -> RepositoryResult<Value> {
    Ok(serde_json::to_value(document)?)
}

/// Converts a domain model's JSON object into a document.
pub fn json_to_document(value: &Value) -> RepositoryResult<Document> {
    match value {
        Value::Object(_) => Ok(serialize_to_document(value)?),
        other => Err(RepositoryError::InvalidArgument(format!(
            "Expected a JSON object, found {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};
    use serde_json::json;

    #[test]
    fn rename_store_id_renders_object_id_as_hex() {
        let oid = ObjectId::new();
        let mapped = rename_store_id(doc! { "_id": oid, "name": "a" }).unwrap();

        assert_eq!(mapped, doc! { "name": "a", "id": oid.to_hex() });
    }

    #[test]
    fn rename_store_id_without_id_is_identity() {
        assert_eq!(rename_store_id(doc! { "name": "a" }).unwrap(), doc! { "name": "a" });
    }

    #[test]
    fn compose_strips_then_renames() {
        let mapper = compose(strip_field("schema_version"), rename_store_id);
        let mapped = mapper(doc! { "_id": 3, "schema_version": "1", "x": true }).unwrap();

        assert_eq!(mapped, doc! { "x": true, "id": 3 });
    }

    #[test]
    fn apply_reports_mapping_failure() {
        let failing = |_: Document| -> Result<Document, MapperError> { Err("boom".into()) };
        let err = apply(Some(&failing), doc! {}).unwrap_err();

        assert!(matches!(err, RepositoryError::Mapping(message) if message == "boom"));
    }

    #[test]
    fn json_round_trip() {
        let document = json_to_document(&json!({ "name": "a", "tags": ["x"] })).unwrap();

        assert_eq!(document_to_json(&document).unwrap(), json!({ "name": "a", "tags": ["x"] }));
        assert!(json_to_document(&json!([1, 2])).is_err());
    }
}
