//! Storage engine abstraction.
//!
//! The mapping layer reaches the embedded store only through the narrow operation set of
//! [`StoreBackend`]: insert, find (with cursor skip/limit), update, remove and count.
//! Results are handed back raw; the [`collection`](crate::collection) adapter turns them
//! into the normalized outcomes callers see.
//!
//! # Filters and updates
//!
//! Filters are BSON documents mapping field names to either a plain value (equality) or a
//! document of `$`-prefixed operators. Updates are either modifier documents (`$set`,
//! `$unset`) or replacement documents. Backends reject what they do not support with
//! [`DocumentStoreError::Store`](crate::error::DocumentStoreError::Store).
//!
//! # Examples
//!
//! ```ignore
//! use docbind_core::backend::{StoreBackend, FindOptions};
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//!
//! let stored = backend.insert_documents("profiles", vec![doc! { "title": "Alex" }]).await?;
//! let found = backend.find_documents("profiles", &doc! {}, FindOptions::default()).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::Document;
use std::{fmt::Debug, sync::Arc};

use crate::error::DocumentStoreResult;

/// Cursor window applied to a find.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Number of matching documents to skip.
    pub skip: Option<usize>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
}

/// Options for an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Update every matching document instead of the first one.
    pub multi: bool,
}

/// Options for a removal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Remove at most one matching document.
    pub single: bool,
}

/// Counters reported by an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    /// Documents matched by the filter.
    pub matched: u64,
    /// Documents whose content actually changed.
    pub modified: u64,
}

/// Abstract interface for embedded document storage engines.
///
/// # Thread Safety
///
/// Implementations are shared by every repository of a session and must support
/// concurrent calls. The mapping layer adds no locking of its own: concurrent writes to
/// the same document are last-write-wins at the engine.
///
/// # Ordering
///
/// Finds return documents in the engine's iteration order, which for the bundled engines
/// is insertion order.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts documents into a collection, creating the collection if needed.
    ///
    /// Documents without an `_id` are assigned a fresh identifier.
    ///
    /// # Returns
    ///
    /// The stored documents, identifiers included, in input order.
    ///
    /// # Errors
    ///
    /// Fails with [`DocumentAlreadyExists`](crate::error::DocumentStoreError::DocumentAlreadyExists)
    /// if an `_id` is already taken.
    async fn insert_documents(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Materializes the documents matching `filter`, windowed by `options`.
    async fn find_documents(
        &self,
        collection: &str,
        filter: &Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Returns the first document matching `filter`, if any.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Document,
    ) -> DocumentStoreResult<Option<Document>> {
        Ok(self
            .find_documents(
                collection,
                filter,
                FindOptions { skip: None, limit: Some(1) },
            )
            .await?
            .into_iter()
            .next())
    }

    /// Applies `update` to the first (or, with `multi`, every) document matching `filter`.
    async fn update_documents(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateResult>;

    /// Removes the documents matching `filter`.
    ///
    /// # Returns
    ///
    /// `Some(n)` with the number of removed documents, or `None` if the engine did not
    /// attempt the removal.
    async fn remove_documents(
        &self,
        collection: &str,
        filter: &Document,
        options: RemoveOptions,
    ) -> DocumentStoreResult<Option<u64>>;

    /// Counts the documents matching `filter`.
    async fn count_documents(&self, collection: &str, filter: &Document) -> DocumentStoreResult<u64>;

    /// Lists the names of all collections in the store.
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Drops a collection and all its documents. Dropping a missing collection is a no-op.
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Flushes and releases engine resources.
    ///
    /// The default implementation is a no-op; persistent engines override it.
    async fn shutdown(&self) -> DocumentStoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for Arc<B>
where
    B: StoreBackend + ?Sized,
{
    async fn insert_documents(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<Vec<Document>> {
        (**self)
            .insert_documents(collection, documents)
            .await
    }

    async fn find_documents(
        &self,
        collection: &str,
        filter: &Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        (**self)
            .find_documents(collection, filter, options)
            .await
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Document,
    ) -> DocumentStoreResult<Option<Document>> {
        (**self).find_one(collection, filter).await
    }

    async fn update_documents(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateResult> {
        (**self)
            .update_documents(collection, filter, update, options)
            .await
    }

    async fn remove_documents(
        &self,
        collection: &str,
        filter: &Document,
        options: RemoveOptions,
    ) -> DocumentStoreResult<Option<u64>> {
        (**self)
            .remove_documents(collection, filter, options)
            .await
    }

    async fn count_documents(&self, collection: &str, filter: &Document) -> DocumentStoreResult<u64> {
        (**self).count_documents(collection, filter).await
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        (**self).list_collections().await
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        (**self).drop_collection(name).await
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        (**self).shutdown().await
    }
}

/// Factory trait for creating backend instances.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
