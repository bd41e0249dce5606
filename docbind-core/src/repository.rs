//! Per-model persistence operations.
//!
//! A [`Repository`] is what binding a model type produces. It holds the
//! [`CollectionAdapter`] of the model's collection and implements the create, read, update
//! and delete algorithms on top of it. Instances stay plain values owned by the caller;
//! the repository only writes back the identifier and update timestamp after a save.
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//!
//! let profiles = session.bind::<Profile>()?;
//!
//! let mut alex = Profile { title: "Alex".into(), ..Default::default() };
//! let id = profiles.save(&mut alex).await?.id();
//!
//! let loaded = profiles.get(id).await?;
//! assert!(profiles.remove(&alex).await?);
//! assert!(profiles.get(id.to_hex()).await?.is_none());
//! ```

use bson::{DateTime, doc, oid::ObjectId};
use std::{fmt, marker::PhantomData};

use crate::{
    collection::CollectionAdapter,
    error::{DocumentStoreError, DocumentStoreResult},
    filter::Filter,
    id::IntoObjectId,
    model::{ID_FIELD, Model, ModelExt, UPDATED_FIELD},
    result::QueryResult,
};

/// Outcome of [`Repository::save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Saved {
    /// The instance was new and has been inserted under this identifier.
    Inserted(ObjectId),
    /// The stored document now holds the instance's fields.
    Updated(ObjectId),
    /// The update was issued, but the store did not report exactly one matched and
    /// modified document. Only the identifier is known to be persisted.
    Unconfirmed(ObjectId),
}

impl Saved {
    /// The identifier of the saved document.
    pub fn id(&self) -> ObjectId {
        match self {
            Saved::Inserted(id) | Saved::Updated(id) | Saved::Unconfirmed(id) => *id,
        }
    }

    /// Returns `true` unless the save degraded to [`Saved::Unconfirmed`].
    pub fn is_confirmed(&self) -> bool {
        !matches!(self, Saved::Unconfirmed(_))
    }
}

/// Persistence operations for one model type.
///
/// Cheap to clone; clones share the session's backend.
pub struct Repository<T> {
    collection: CollectionAdapter,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("model", &std::any::type_name::<T>())
            .field("collection", &self.collection.name())
            .finish()
    }
}

impl<T: Model> Repository<T> {
    /// Creates a repository over `collection`.
    pub fn new(collection: CollectionAdapter) -> Self {
        Self {
            collection,
            _marker: PhantomData,
        }
    }

    /// The adapter of the bound collection.
    pub fn collection(&self) -> &CollectionAdapter {
        &self.collection
    }

    /// Queries the collection.
    ///
    /// `filters` may be a single document, a sequence of documents merged right-biased, a
    /// [`Filter`], or `()` for everything. The matching documents are counted once, here.
    pub async fn find(&self, filters: impl Into<Filter>) -> DocumentStoreResult<QueryResult<T>> {
        let filter = filters.into();
        let count = self
            .collection
            .count_documents(filter.clone())
            .await?;

        Ok(QueryResult::new(count, filter, self.collection.clone()))
    }

    /// Loads the instance stored under `id`.
    ///
    /// Returns `Ok(None)` if no such document exists.
    ///
    /// # Errors
    ///
    /// Fails with [`DocumentStoreError::InvalidIdentifier`] if `id` does not parse.
    pub async fn get(&self, id: impl IntoObjectId) -> DocumentStoreResult<Option<T>> {
        let id = id.into_object_id()?;

        self.collection
            .find(Filter::by_id(id))
            .limit(1)
            .to_vec()
            .await?
            .into_iter()
            .next()
            .map(T::from_document)
            .transpose()
    }

    /// Inserts or updates `instance`.
    ///
    /// Without an identifier the declared fields are inserted and the assigned identifier
    /// is written back onto `instance`. With one, the stored document is first loaded,
    /// then the declared fields are written with a `$set` together with a fresh update
    /// timestamp. The timestamp is written back only when the store confirms exactly one
    /// matched and modified document.
    ///
    /// # Errors
    ///
    /// Fails with [`DocumentStoreError::NotFound`] when updating an identifier that is not
    /// stored, for example after [`remove`](Repository::remove).
    pub async fn save(&self, instance: &mut T) -> DocumentStoreResult<Saved> {
        let Some(id) = instance.id().copied() else {
            return self.insert(instance).await;
        };

        self.collection
            .find_one(Filter::by_id(id))
            .await?;

        let now = DateTime::now();
        let mut patch = instance.to_document()?;
        patch.insert(UPDATED_FIELD, now);

        let result = self
            .collection
            .update_one(Filter::by_id(id), doc! { "$set": patch })
            .await?;

        if result.matched == 1 && result.modified == 1 {
            instance.set_updated(now);
            return Ok(Saved::Updated(id));
        }

        tracing::warn!(
            collection = %self.collection.name(),
            %id,
            matched = result.matched,
            modified = result.modified,
            "update not confirmed by store"
        );

        Ok(Saved::Unconfirmed(id))
    }

    /// Removes the stored document of `instance`.
    ///
    /// Returns `true` only if exactly one document was removed. An instance that was never
    /// saved yields `false`. The identifier is left on the instance.
    pub async fn remove(&self, instance: &T) -> DocumentStoreResult<bool> {
        let Some(id) = instance.id() else {
            return Ok(false);
        };

        Ok(self.collection.delete_one(Filter::by_id(*id)).await? == 1)
    }

    /// Removes every document matching `filters`, returning whether any was removed.
    pub async fn clear(&self, filters: impl Into<Filter>) -> DocumentStoreResult<bool> {
        Ok(self.collection.delete_many(filters).await? > 0)
    }

    /// Removes every document of the collection.
    pub async fn clear_all(&self) -> DocumentStoreResult<bool> {
        self.clear(()).await
    }

    async fn insert(&self, instance: &mut T) -> DocumentStoreResult<Saved> {
        let stored = self
            .collection
            .insert_one(instance.to_document()?)
            .await?;

        let id = stored
            .get_object_id(ID_FIELD)
            .map_err(|_| DocumentStoreError::WriteFailed(self.collection.name().to_string()))?;

        instance.set_id(id);
        Ok(Saved::Inserted(id))
    }
}
