//! Collection adapter over a storage backend.
//!
//! A [`CollectionAdapter`] wraps one named collection of a backend and turns the engine's
//! raw results into single-shot outcomes: a value, or an error from the
//! [`DocumentStoreError`] taxonomy. Queries go through a [`Cursor`], which carries the
//! filter and the skip/limit window until it is materialized.
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//!
//! let profiles = session.collection("profile");
//! let stored = profiles.insert_one(doc! { "title": "Alex" }).await?;
//! let second_page = profiles
//!     .find(doc! {})
//!     .skip(10)
//!     .limit(10)
//!     .to_vec()
//!     .await?;
//! ```

use bson::{Bson, Document};
use std::sync::Arc;

use crate::{
    backend::{FindOptions, RemoveOptions, StoreBackend, UpdateOptions, UpdateResult},
    error::{DocumentStoreError, DocumentStoreResult},
    filter::Filter,
    model::ID_FIELD,
};

/// Uniform operations on one collection of a backend.
///
/// Cheap to clone; clones share the backend.
#[derive(Debug, Clone)]
pub struct CollectionAdapter {
    name: String,
    backend: Arc<dyn StoreBackend>,
}

impl CollectionAdapter {
    /// Creates an adapter for the collection `name` of `backend`.
    pub fn new(name: impl Into<String>, backend: Arc<dyn StoreBackend>) -> Self {
        Self { name: name.into(), backend }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starts a query over the documents matching `filter`.
    pub fn find(&self, filter: impl Into<Filter>) -> Cursor {
        Cursor {
            collection: self.clone(),
            filter: filter.into(),
            options: FindOptions::default(),
        }
    }

    /// Returns the first document matching `filter`.
    ///
    /// # Errors
    ///
    /// Fails with [`DocumentStoreError::NotFound`] if nothing matches.
    pub async fn find_one(&self, filter: impl Into<Filter>) -> DocumentStoreResult<Document> {
        let filter = filter.into();

        tracing::debug!(collection = %self.name, %filter, "find one");

        self.backend
            .find_one(&self.name, filter.as_document())
            .await?
            .ok_or_else(|| DocumentStoreError::NotFound {
                collection: self.name.clone(),
                filter: filter.to_string(),
            })
    }

    /// Inserts one document and returns it as stored.
    ///
    /// An `_id` that is absent or falsy (`null`, `false`, `0`, `""`) is stripped so the
    /// store assigns one.
    ///
    /// # Errors
    ///
    /// Fails with [`DocumentStoreError::WriteFailed`] if the store returns no record.
    pub async fn insert_one(&self, document: Document) -> DocumentStoreResult<Document> {
        let document = document
            .into_iter()
            .filter(|(key, value)| key != ID_FIELD || !is_falsy(value))
            .collect::<Document>();

        tracing::debug!(collection = %self.name, "insert one");

        self.backend
            .insert_documents(&self.name, vec![document])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DocumentStoreError::WriteFailed(self.name.clone()))
    }

    /// Applies `update` to the first document matching `filter`.
    pub async fn update_one(
        &self,
        filter: impl Into<Filter>,
        update: Document,
    ) -> DocumentStoreResult<UpdateResult> {
        let filter = filter.into();

        tracing::debug!(collection = %self.name, %filter, "update one");

        self.backend
            .update_documents(
                &self.name,
                filter.as_document(),
                &update,
                UpdateOptions { multi: false },
            )
            .await
    }

    /// Removes at most one document matching `filter`, returning the removed count (0 or 1).
    pub async fn delete_one(&self, filter: impl Into<Filter>) -> DocumentStoreResult<u64> {
        self.delete(filter.into(), true).await
    }

    /// Removes every document matching `filter`, returning the removed count.
    pub async fn delete_many(&self, filter: impl Into<Filter>) -> DocumentStoreResult<u64> {
        self.delete(filter.into(), false).await
    }

    /// Counts the documents matching `filter`.
    pub async fn count_documents(&self, filter: impl Into<Filter>) -> DocumentStoreResult<u64> {
        let filter = filter.into();

        tracing::debug!(collection = %self.name, %filter, "count");

        self.backend
            .count_documents(&self.name, filter.as_document())
            .await
    }

    async fn delete(&self, filter: Filter, single: bool) -> DocumentStoreResult<u64> {
        tracing::debug!(collection = %self.name, %filter, single, "delete");

        self.backend
            .remove_documents(&self.name, filter.as_document(), RemoveOptions { single })
            .await?
            .ok_or_else(|| {
                DocumentStoreError::Store(format!("removal from {} was not attempted", self.name))
            })
    }
}

/// A pending query: a filter plus a skip/limit window.
///
/// `skip` and `limit` consume and return the cursor so they chain; nothing reaches the
/// store until [`to_vec`](Cursor::to_vec).
#[derive(Debug, Clone)]
pub struct Cursor {
    collection: CollectionAdapter,
    filter: Filter,
    options: FindOptions,
}

impl Cursor {
    /// Skips the first `count` matching documents.
    pub fn skip(mut self, count: usize) -> Self {
        self.options.skip = Some(count);
        self
    }

    /// Returns at most `count` documents.
    pub fn limit(mut self, count: usize) -> Self {
        self.options.limit = Some(count);
        self
    }

    /// Returns the filter of this cursor.
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Materializes the cursor into an ordered vector of documents.
    pub async fn to_vec(self) -> DocumentStoreResult<Vec<Document>> {
        tracing::debug!(
            collection = %self.collection.name,
            filter = %self.filter,
            skip = ?self.options.skip,
            limit = ?self.options.limit,
            "find"
        );

        self.collection
            .backend
            .find_documents(&self.collection.name, self.filter.as_document(), self.options)
            .await
    }
}

fn is_falsy(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => true,
        Bson::Boolean(value) => !value,
        Bson::String(value) => value.is_empty(),
        Bson::Int32(value) => *value == 0,
        Bson::Int64(value) => *value == 0,
        Bson::Double(value) => *value == 0.0 || value.is_nan(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bson::{doc, oid::ObjectId};
    use parking_lot::Mutex;

    /// Backend returning canned responses and recording what it was asked.
    #[derive(Debug, Default)]
    struct ScriptedBackend {
        acknowledge_inserts: bool,
        removed: Option<u64>,
        found: Vec<Document>,
        inserted: Mutex<Vec<Document>>,
        finds: Mutex<Vec<FindOptions>>,
    }

    #[async_trait]
    impl StoreBackend for ScriptedBackend {
        async fn insert_documents(
            &self,
            _collection: &str,
            documents: Vec<Document>,
        ) -> DocumentStoreResult<Vec<Document>> {
            self.inserted.lock().extend(documents.iter().cloned());

            Ok(if self.acknowledge_inserts { documents } else { vec![] })
        }

        async fn find_documents(
            &self,
            _collection: &str,
            _filter: &Document,
            options: FindOptions,
        ) -> DocumentStoreResult<Vec<Document>> {
            self.finds.lock().push(options);

            Ok(self.found.clone())
        }

        async fn update_documents(
            &self,
            _collection: &str,
            _filter: &Document,
            _update: &Document,
            _options: UpdateOptions,
        ) -> DocumentStoreResult<UpdateResult> {
            Err(DocumentStoreError::Store("disk full".into()))
        }

        async fn remove_documents(
            &self,
            _collection: &str,
            _filter: &Document,
            _options: RemoveOptions,
        ) -> DocumentStoreResult<Option<u64>> {
            Ok(self.removed)
        }

        async fn count_documents(&self, _collection: &str, _filter: &Document) -> DocumentStoreResult<u64> {
            Ok(self.found.len() as u64)
        }

        async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
            Ok(vec![])
        }

        async fn drop_collection(&self, _name: &str) -> DocumentStoreResult<()> {
            Ok(())
        }
    }

    fn adapter(backend: ScriptedBackend) -> (CollectionAdapter, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        (CollectionAdapter::new("profile", backend.clone()), backend)
    }

    #[tokio::test]
    async fn insert_one_strips_falsy_identity() {
        let (profiles, backend) = adapter(ScriptedBackend { acknowledge_inserts: true, ..Default::default() });

        for id in [Bson::Null, Bson::String(String::new()), Bson::Int32(0), Bson::Boolean(false)] {
            profiles.insert_one(doc! { "_id": id, "title": "Alex" }).await.unwrap();
        }

        let kept = ObjectId::new();
        profiles.insert_one(doc! { "_id": kept, "title": "Sam" }).await.unwrap();

        let inserted = backend.inserted.lock();
        assert!(inserted[..4].iter().all(|d| d == &doc! { "title": "Alex" }));
        assert_eq!(inserted[4], doc! { "_id": kept, "title": "Sam" });
    }

    #[tokio::test]
    async fn insert_one_without_record_is_write_failure() {
        let (profiles, _) = adapter(ScriptedBackend::default());

        match profiles.insert_one(doc! { "title": "Alex" }).await {
            Err(DocumentStoreError::WriteFailed(collection)) => assert_eq!(collection, "profile"),
            other => panic!("expected WriteFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn find_one_without_match_is_not_found() {
        let (profiles, _) = adapter(ScriptedBackend::default());

        assert!(matches!(
            profiles.find_one(doc! { "title": "nobody" }).await,
            Err(DocumentStoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn delete_distinguishes_zero_from_not_attempted() {
        let (zero, _) = adapter(ScriptedBackend { removed: Some(0), ..Default::default() });
        assert_eq!(zero.delete_one(doc! {}).await.unwrap(), 0);

        let (skipped, _) = adapter(ScriptedBackend { removed: None, ..Default::default() });
        assert!(matches!(skipped.delete_many(doc! {}).await, Err(DocumentStoreError::Store(_))));
    }

    #[tokio::test]
    async fn store_errors_pass_through() {
        let (profiles, _) = adapter(ScriptedBackend::default());

        match profiles.update_one(doc! {}, doc! { "$set": { "a": 1 } }).await {
            Err(DocumentStoreError::Store(message)) => assert_eq!(message, "disk full"),
            other => panic!("expected Store error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cursor_carries_skip_and_limit() {
        let (profiles, backend) = adapter(ScriptedBackend { found: vec![doc! { "a": 1 }], ..Default::default() });

        let docs = profiles.find(doc! {}).skip(20).limit(10).to_vec().await.unwrap();
        profiles.find(doc! {}).to_vec().await.unwrap();

        assert_eq!(docs, vec![doc! { "a": 1 }]);
        assert_eq!(
            *backend.finds.lock(),
            vec![
                FindOptions { skip: Some(20), limit: Some(10) },
                FindOptions::default(),
            ],
        );
    }
}
