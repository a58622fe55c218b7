//! Error types and result types for repository operations.
//!
//! Every repository call resolves to a single [`RepositoryResult<T>`]. The variants separate
//! failures a caller is expected to branch on (not-found, conflict, validation) from failures
//! that merely need to be reported (query execution, mapping, serialization).

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with the document store.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The filter or pipeline was rejected by the store. The message is the driver's, verbatim.
    #[error("Query error: {0}")]
    Query(String),
    /// Zero documents matched a single-document find, update or delete.
    #[error("No document matched in collection {collection}")]
    NotFound {
        /// The collection that was queried.
        collection: String,
    },
    /// A document was stored with an identifier already assigned.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// A caller supplied transform failed while processing an otherwise successful result.
    #[error("Mapping error: {0}")]
    Mapping(String),
    /// A caller supplied parameter failed validation.
    ///
    /// `code` identifies the offending input, e.g. `order[1]`.
    #[error("Validation error {code}: {message}")]
    Validation {
        /// Structured code of the offending input.
        code: String,
        /// Human readable reason.
        message: String,
    },
    /// An argument is unusable for the requested operation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A stale document could not be migrated.
    #[error("Migration error: {0}")]
    Migration(String),
    /// Error during backend initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The requested collection does not exist in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
}

/// A specialized `Result` type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

impl RepositoryError {
    /// Creates a [`RepositoryError::NotFound`] for the given collection.
    pub fn not_found(collection: impl Into<String>) -> Self {
        RepositoryError::NotFound { collection: collection.into() }
    }

    /// Creates a [`RepositoryError::Validation`] with a `prefix[index]` code.
    pub fn validation(prefix: &str, index: usize, message: impl Into<String>) -> Self {
        RepositoryError::Validation {
            code: format!("{prefix}[{index}]"),
            message: message.into(),
        }
    }

    /// Returns the structured code of a validation error.
    pub fn code(&self) -> Option<&str> {
        match self {
            RepositoryError::Validation { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }
}

impl From<BsonError> for RepositoryError {
    fn from(err: BsonError) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for RepositoryError {
    fn from(err: SerdeJsonError) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_code_carries_prefix_and_index() {
        let err = RepositoryError::validation("order", 2, "duplicated field");

        assert_eq!(err.code(), Some("order[2]"));
        assert_eq!(err.to_string(), "Validation error order[2]: duplicated field");
    }

    #[test]
    fn not_found_is_distinguishable() {
        assert!(RepositoryError::not_found("tasks").is_not_found());
        assert!(!RepositoryError::Query("bad".into()).is_not_found());
        assert_eq!(RepositoryError::Query("bad".into()).code(), None);
    }
}
