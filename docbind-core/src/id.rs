//! Document identifier generation and parsing.
//!
//! Identifiers are BSON [`ObjectId`]s: opaque, store-native, and unique for the lifetime
//! of the process. Their canonical external form is the 24 character hex string.

use bson::oid::ObjectId;

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Returns a fresh identifier. Has no side effects.
pub fn new_id() -> ObjectId {
    ObjectId::new()
}

/// Parses the canonical hex form of an identifier.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidIdentifier`] if `value` is not a valid hex ObjectId.
pub fn parse_id(value: &str) -> DocumentStoreResult<ObjectId> {
    ObjectId::parse_str(value)
        .map_err(|_| DocumentStoreError::InvalidIdentifier(value.to_string()))
}

/// Conversion into a store-native identifier.
///
/// Lets lookups accept either an [`ObjectId`] or its string form.
pub trait IntoObjectId {
    fn into_object_id(self) -> DocumentStoreResult<ObjectId>;
}

impl IntoObjectId for ObjectId {
    fn into_object_id(self) -> DocumentStoreResult<ObjectId> {
        Ok(self)
    }
}

impl IntoObjectId for &ObjectId {
    fn into_object_id(self) -> DocumentStoreResult<ObjectId> {
        Ok(*self)
    }
}

impl IntoObjectId for &str {
    fn into_object_id(self) -> DocumentStoreResult<ObjectId> {
        parse_id(self)
    }
}

impl IntoObjectId for String {
    fn into_object_id(self) -> DocumentStoreResult<ObjectId> {
        parse_id(&self)
    }
}

impl IntoObjectId for &String {
    fn into_object_id(self) -> DocumentStoreResult<ObjectId> {
        parse_id(self)
    }
}
