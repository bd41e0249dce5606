//! Error types and result types for mapping and store operations.
//!
//! Every fallible operation in docbind returns [`DocumentStoreResult<T>`]. Callers tell
//! "operation failed" apart from "operation succeeded with zero effect" by the return
//! shape (`Option`, `bool`, counters), never by matching on an error.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors raised by the mapping layer or surfaced from a store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// The store could not be opened at the configured location.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// A lookup or update target is absent.
    #[error("Document matching {filter} not found in collection {collection}")]
    NotFound {
        /// Collection that was searched.
        collection: String,
        /// Rendered filter used for the lookup.
        filter: String,
    },
    /// The store acknowledged an insert without returning any stored record.
    #[error("Insert into collection {0} was not acknowledged")]
    WriteFailed(String),
    /// The value cannot be converted into a document identifier.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
    /// Page numbers start at 1 and page sizes must be positive.
    #[error("Invalid pagination: page {page}, per page {per_page}")]
    InvalidPagination {
        page: usize,
        per_page: usize,
    },
    /// Two distinct model types resolved to the same collection name in one session.
    #[error("Collection {collection} is already bound to {bound}, cannot bind {requested}")]
    CollectionConflict {
        collection: String,
        bound: &'static str,
        requested: &'static str,
    },
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// Serialization/deserialization error when converting between models and documents.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Any other failure reported by the storage engine, passed through verbatim.
    #[error("Store error: {0}")]
    Store(String),
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
