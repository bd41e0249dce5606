//! The contract every bound model type implements.
//!
//! A model declares which of its fields are persisted, where its identity lives and
//! (optionally) where the store-side update timestamp is mirrored. The mapping engine
//! reads and writes only the declared fields plus the two reserved keys.

use bson::{
    DateTime, Document,
    de::deserialize_from_document,
    oid::ObjectId,
    ser::serialize_to_document,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, to_value};

use crate::error::DocumentStoreResult;

/// Reserved key holding a document's identifier.
pub const ID_FIELD: &str = "_id";

/// Reserved key holding the time of the last field-level update.
pub const UPDATED_FIELD: &str = "_updated";

/// Core trait that all persisted model types implement.
///
/// Models are plain serde types. Deserialization must tolerate missing fields
/// (`#[serde(default)]` on the struct), since documents only carry the declared fields
/// and a freshly inserted document has no update timestamp yet.
///
/// Usually implemented with `#[derive(Model)]` from the `docbind` crate.
///
/// # Example
///
/// ```ignore
/// use docbind_core::model::Model;
/// use bson::oid::ObjectId;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// #[serde(default)]
/// pub struct Profile {
///     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
///     pub id: Option<ObjectId>,
///     pub title: String,
///     pub email: String,
/// }
///
/// impl Model for Profile {
///     fn fields() -> &'static [&'static str] {
///         &["title", "email"]
///     }
///
///     fn id(&self) -> Option<&ObjectId> {
///         self.id.as_ref()
///     }
///
///     fn set_id(&mut self, id: ObjectId) {
///         self.id = Some(id);
///     }
/// }
/// ```
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Returns the name of the collection this model is stored in.
    ///
    /// Defaults to the type name, without module path or generics, lowercased.
    fn collection_name() -> String {
        default_collection_name(std::any::type_name::<Self>())
    }

    /// Returns the serialized names of the persisted fields, excluding the reserved keys.
    fn fields() -> &'static [&'static str];

    /// Returns the identifier, or `None` while the instance has not been persisted.
    fn id(&self) -> Option<&ObjectId>;

    /// Stores the identifier assigned on insert.
    fn set_id(&mut self, id: ObjectId);

    /// Records the update timestamp written alongside a confirmed update.
    fn set_updated(&mut self, _at: DateTime) {}
}

/// Derives a collection name from a fully qualified type name.
pub fn default_collection_name(type_name: &str) -> String {
    let base = type_name.split('<').next().unwrap_or(type_name);

    base.rsplit("::")
        .next()
        .unwrap_or(base)
        .to_lowercase()
}

/// Extension trait providing document conversions for models.
///
/// Automatically implemented for all types that implement [`Model`].
pub trait ModelExt: Model + Sized {
    /// Converts the declared fields of this model into a document.
    ///
    /// The identifier and the update timestamp are never included.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the model does not serialize to a map.
    fn to_document(&self) -> DocumentStoreResult<Document>;

    /// Builds a model from a stored document.
    ///
    /// Keys that are neither declared fields nor reserved keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    fn from_document(document: Document) -> DocumentStoreResult<Self>;

    /// Converts this model to a JSON value, reserved keys included.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn to_json(&self) -> DocumentStoreResult<Value>;
}

impl<M: Model> ModelExt for M {
    fn to_document(&self) -> DocumentStoreResult<Document> {
        let fields = Self::fields();

        Ok(serialize_to_document(self)?
            .into_iter()
            .filter(|(key, _)| fields.contains(&key.as_str()))
            .collect())
    }

    fn from_document(document: Document) -> DocumentStoreResult<Self> {
        let fields = Self::fields();

        Ok(deserialize_from_document(
            document
                .into_iter()
                .filter(|(key, _)| {
                    key == ID_FIELD || key == UPDATED_FIELD || fields.contains(&key.as_str())
                })
                .collect(),
        )?)
    }

    fn to_json(&self) -> DocumentStoreResult<Value> {
        Ok(to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Note {
        #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
        id: Option<ObjectId>,
        title: String,
        pinned: bool,
        #[serde(skip)]
        scratch: String,
    }

    impl Model for Note {
        fn fields() -> &'static [&'static str] {
            &["title", "pinned"]
        }

        fn id(&self) -> Option<&ObjectId> {
            self.id.as_ref()
        }

        fn set_id(&mut self, id: ObjectId) {
            self.id = Some(id);
        }
    }

    #[test]
    fn collection_name_is_lowercased_type_name() {
        assert_eq!(Note::collection_name(), "note");
        assert_eq!(default_collection_name("app::models::UserProfile"), "userprofile");
        assert_eq!(default_collection_name("app::Wrapper<app::Inner>"), "wrapper");
    }

    #[test]
    fn to_document_keeps_only_declared_fields() {
        let note = Note {
            id: Some(ObjectId::new()),
            title: "groceries".into(),
            pinned: true,
            scratch: "draft".into(),
        };

        assert_eq!(note.to_document().unwrap(), doc! { "title": "groceries", "pinned": true });
    }

    #[test]
    fn from_document_defaults_absent_fields_and_ignores_unknown_keys() {
        let id = ObjectId::new();
        let note = Note::from_document(doc! {
            "_id": id,
            "title": "groceries",
            "_updated": DateTime::now(),
            "legacy": 42,
        })
        .unwrap();

        assert_eq!(note, Note { id: Some(id), title: "groceries".into(), ..Default::default() });
    }

    #[test]
    fn to_json_includes_identity() {
        let id = ObjectId::new();
        let note = Note { id: Some(id), title: "x".into(), ..Default::default() };
        let json = note.to_json().unwrap();

        assert_eq!(json["title"], "x");
        assert!(json.get("_id").is_some());
    }
}
