//! In-memory storage implementation for document stores.
//!
//! Collections are ordered vectors of BSON documents behind one async-aware read-write
//! lock. Finds scan a collection in insertion order.

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;
use std::{collections::HashMap, sync::Arc};

use docbind_core::{
    backend::{FindOptions, RemoveOptions, StoreBackend, StoreBackendBuilder, UpdateOptions, UpdateResult},
    error::{DocumentStoreError, DocumentStoreResult},
    model::ID_FIELD,
};

use crate::evaluator::DocumentMatcher;

type StoreMap = HashMap<String, Vec<Document>>;

/// A document changed by an update, before and after.
#[derive(Debug, Clone, PartialEq)]
pub struct Revision {
    pub previous: Document,
    pub current: Document,
}

/// A removed document and the position it held in its collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Removal {
    pub position: usize,
    pub document: Document,
}

/// Thread-safe in-memory document storage backend.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Performance
///
/// Queries scan all documents in a collection (no indexing).
///
/// # Example
///
/// ```ignore
/// use docbind_memory::InMemoryStore;
/// use docbind_core::backend::{StoreBackend, FindOptions};
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// let stored = store.insert_documents("users", vec![doc! { "name": "Alice" }]).await?;
/// let found = store.find_documents("users", &doc! { "name": "Alice" }, FindOptions::default()).await?;
/// assert_eq!(stored, found);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Applies `update` and returns the counters together with a [`Revision`] per modified
    /// document.
    pub async fn update_returning(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<(UpdateResult, Vec<Revision>)> {
        let matcher = DocumentMatcher::new(filter)?;
        let update = Update::parse(update)?;

        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok((UpdateResult::default(), vec![]));
        };

        let mut result = UpdateResult::default();
        let mut revisions = Vec::new();

        for document in documents.iter_mut() {
            if !matcher.matches(document) {
                continue;
            }

            result.matched += 1;

            let updated = update.apply(document)?;
            if updated != *document {
                let previous = std::mem::replace(document, updated);
                result.modified += 1;
                revisions.push(Revision {
                    previous,
                    current: document.clone(),
                });
            }

            if !options.multi {
                break;
            }
        }

        Ok((result, revisions))
    }

    /// Removes the matching documents and returns them with the positions they held.
    pub async fn remove_returning(
        &self,
        collection: &str,
        filter: &Document,
        options: RemoveOptions,
    ) -> DocumentStoreResult<Vec<Removal>> {
        let matcher = DocumentMatcher::new(filter)?;

        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(vec![]);
        };

        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(documents.len());

        for (position, document) in documents.drain(..).enumerate() {
            if matcher.matches(&document) && !(options.single && !removed.is_empty()) {
                removed.push(Removal { position, document });
            } else {
                kept.push(document);
            }
        }

        *documents = kept;
        Ok(removed)
    }

    /// Drops the last `count` documents of `collection`, undoing an insert.
    pub async fn discard_last(&self, collection: &str, count: usize) {
        if let Some(documents) = self.store.write().await.get_mut(collection) {
            documents.truncate(documents.len().saturating_sub(count));
        }
    }

    /// Puts back the previous content of every revised document.
    pub async fn revert(&self, collection: &str, revisions: Vec<Revision>) {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return;
        };

        for revision in revisions {
            let id = revision.current.get(ID_FIELD);

            if let Some(document) = documents.iter_mut().find(|document| document.get(ID_FIELD) == id) {
                *document = revision.previous;
            }
        }
    }

    /// Reinserts removed documents at the positions they held.
    ///
    /// `removals` must be in ascending position order, as returned by
    /// [`remove_returning`](Self::remove_returning).
    pub async fn reinstate(&self, collection: &str, removals: Vec<Removal>) {
        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        for Removal { position, document } in removals {
            let position = position.min(documents.len());
            documents.insert(position, document);
        }
    }

    /// Replaces the content of `collection` with `documents`, creating it if needed.
    ///
    /// Used to load state persisted elsewhere; no identifier checks are made.
    pub async fn restore(&self, collection: &str, documents: Vec<Document>) {
        self.store
            .write()
            .await
            .insert(collection.to_string(), documents);
    }

    /// Returns every document of `collection` in insertion order.
    pub async fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.store
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_documents(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<Vec<Document>> {
        let mut store = self.store.write().await;
        let existing = store.get(collection).map(Vec::as_slice).unwrap_or_default();

        let mut stored = Vec::with_capacity(documents.len());

        for document in documents {
            let document = with_identifier(document);
            let id = document.get(ID_FIELD).cloned().unwrap_or(Bson::Null);

            if existing
                .iter()
                .chain(stored.iter())
                .any(|other: &Document| other.get(ID_FIELD) == Some(&id))
            {
                return Err(DocumentStoreError::DocumentAlreadyExists(
                    display_id(&id),
                    collection.to_string(),
                ));
            }

            stored.push(document);
        }

        store
            .entry(collection.to_string())
            .or_default()
            .extend(stored.iter().cloned());

        Ok(stored)
    }

    async fn find_documents(
        &self,
        collection: &str,
        filter: &Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        let matcher = DocumentMatcher::new(filter)?;

        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(vec![]);
        };

        Ok(
            matcher
                .filter_documents(documents)
                .skip(options.skip.unwrap_or(0))
                .take(options.limit.unwrap_or(usize::MAX))
                .cloned()
                .collect()
        )
    }

    async fn update_documents(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateResult> {
        self.update_returning(collection, filter, update, options)
            .await
            .map(|(result, _)| result)
    }

    async fn remove_documents(
        &self,
        collection: &str,
        filter: &Document,
        options: RemoveOptions,
    ) -> DocumentStoreResult<Option<u64>> {
        let removed = self
            .remove_returning(collection, filter, options)
            .await?;

        Ok(Some(removed.len() as u64))
    }

    async fn count_documents(&self, collection: &str, filter: &Document) -> DocumentStoreResult<u64> {
        let matcher = DocumentMatcher::new(filter)?;

        Ok(
            self.store
                .read()
                .await
                .get(collection)
                .map_or(0, |documents| matcher.filter_documents(documents).count() as u64)
        )
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let mut names = self
            .store
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();

        names.sort();
        Ok(names)
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.store.write().await.remove(name);

        Ok(())
    }
}

/// Puts a fresh `_id` first if the document has none.
fn with_identifier(document: Document) -> Document {
    if document.contains_key(ID_FIELD) {
        return document;
    }

    let mut identified = Document::new();
    identified.insert(ID_FIELD, ObjectId::new());
    identified.extend(document);
    identified
}

fn display_id(id: &Bson) -> String {
    match id {
        Bson::ObjectId(id) => id.to_hex(),
        Bson::String(id) => id.clone(),
        other => other.to_string(),
    }
}

/// A parsed update: field modifiers or a whole-document replacement.
enum Update<'a> {
    Modify {
        set: Option<&'a Document>,
        unset: Option<&'a Document>,
    },
    Replace(&'a Document),
}

impl<'a> Update<'a> {
    fn parse(update: &'a Document) -> DocumentStoreResult<Self> {
        let modifiers = update.keys().filter(|key| key.starts_with('$')).count();

        if modifiers == 0 {
            return Ok(Update::Replace(update));
        }

        if modifiers != update.len() {
            return Err(DocumentStoreError::Store(
                "update mixes modifiers and plain fields".to_string(),
            ));
        }

        let mut set = None;
        let mut unset = None;

        for (modifier, argument) in update {
            let argument = argument.as_document().ok_or_else(|| {
                DocumentStoreError::Store(format!("{modifier} expects a document"))
            })?;

            match modifier.as_str() {
                "$set" => set = Some(argument),
                "$unset" => unset = Some(argument),
                other => {
                    return Err(DocumentStoreError::Store(format!("unsupported update operator {other}")));
                }
            }
        }

        Ok(Update::Modify { set, unset })
    }

    /// Returns the updated copy of `document`. The identifier cannot change.
    fn apply(&self, document: &Document) -> DocumentStoreResult<Document> {
        let id = document.get(ID_FIELD).cloned();

        let updated = match self {
            Update::Replace(replacement) => {
                if replacement.get(ID_FIELD).is_some_and(|new| Some(new) != id.as_ref()) {
                    return Err(DocumentStoreError::Store("cannot change _id of a document".to_string()));
                }

                let mut updated = Document::new();
                if let Some(id) = id {
                    updated.insert(ID_FIELD, id);
                }
                updated.extend(
                    replacement
                        .iter()
                        .filter(|(key, _)| key.as_str() != ID_FIELD)
                        .map(|(key, value)| (key.clone(), value.clone())),
                );
                updated
            }
            Update::Modify { set, unset } => {
                let mut updated = document.clone();

                for (path, value) in set.iter().flat_map(|set| set.iter()) {
                    if path == ID_FIELD && Some(value) != id.as_ref() {
                        return Err(DocumentStoreError::Store("cannot change _id of a document".to_string()));
                    }
                    set_path(&mut updated, path, value.clone())?;
                }

                for path in unset.iter().flat_map(|unset| unset.keys()) {
                    if path == ID_FIELD {
                        return Err(DocumentStoreError::Store("cannot unset _id of a document".to_string()));
                    }
                    unset_path(&mut updated, path);
                }

                updated
            }
        };

        Ok(updated)
    }
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> DocumentStoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            let child = document
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(Document::new()));

            match child {
                Bson::Document(inner) => set_path(inner, rest, value),
                _ => Err(DocumentStoreError::Store(format!("cannot set {path}: {head} is not a document"))),
            }
        }
    }
}

fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new [`InMemoryStore`] instance. Always succeeds.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::builder().build().await.unwrap();
        store
            .insert_documents(
                "profile",
                vec![
                    doc! { "title": "Alex", "age": 31 },
                    doc! { "title": "Sam", "age": 25 },
                    doc! { "title": "Kim", "age": 40 },
                ],
            )
            .await
            .unwrap();
        store
    }

    fn titles(documents: &[Document]) -> Vec<&str> {
        documents
            .iter()
            .map(|d| d.get_str("title").unwrap())
            .collect()
    }

    #[tokio::test]
    async fn insert_assigns_identifier_first() {
        let store = InMemoryStore::new();
        let stored = store
            .insert_documents("profile", vec![doc! { "title": "Alex" }])
            .await
            .unwrap();

        assert_eq!(stored[0].keys().next().map(String::as_str), Some(ID_FIELD));
        assert!(stored[0].get_object_id(ID_FIELD).is_ok());
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_identifiers() {
        let store = InMemoryStore::new();
        let id = ObjectId::new();
        store
            .insert_documents("profile", vec![doc! { "_id": id }])
            .await
            .unwrap();

        let result = store
            .insert_documents("profile", vec![doc! { "_id": id }])
            .await;

        assert!(matches!(result, Err(DocumentStoreError::DocumentAlreadyExists(..))));
        assert_eq!(store.count_documents("profile", &doc! {}).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn find_keeps_insertion_order_and_windows() {
        let store = seeded().await;

        let all = store
            .find_documents("profile", &doc! {}, FindOptions::default())
            .await
            .unwrap();
        let window = store
            .find_documents("profile", &doc! {}, FindOptions { skip: Some(1), limit: Some(1) })
            .await
            .unwrap();

        assert_eq!(titles(&all), vec!["Alex", "Sam", "Kim"]);
        assert_eq!(titles(&window), vec!["Sam"]);
    }

    #[tokio::test]
    async fn missing_collection_reads_as_empty() {
        let store = InMemoryStore::new();

        assert!(store.find_one("nothing", &doc! {}).await.unwrap().is_none());
        assert_eq!(store.count_documents("nothing", &doc! {}).await.unwrap(), 0);
        assert_eq!(
            store.remove_documents("nothing", &doc! {}, RemoveOptions::default()).await.unwrap(),
            Some(0)
        );
    }

    #[tokio::test]
    async fn set_counts_only_real_modifications() {
        let store = seeded().await;

        let changed = store
            .update_documents(
                "profile",
                &doc! { "title": "Alex" },
                &doc! { "$set": { "age": 32, "address.city": "Oslo" } },
                UpdateOptions::default(),
            )
            .await
            .unwrap();
        let unchanged = store
            .update_documents(
                "profile",
                &doc! { "title": "Alex" },
                &doc! { "$set": { "age": 32 } },
                UpdateOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(changed, UpdateResult { matched: 1, modified: 1 });
        assert_eq!(unchanged, UpdateResult { matched: 1, modified: 0 });

        let alex = store.find_one("profile", &doc! { "address.city": "Oslo" }).await.unwrap().unwrap();
        assert_eq!(alex.get_i32("age").unwrap(), 32);
    }

    #[tokio::test]
    async fn multi_update_and_unset() {
        let store = seeded().await;

        let (result, revisions) = store
            .update_returning(
                "profile",
                &doc! { "age": { "$gte": 30 } },
                &doc! { "$unset": { "age": "" } },
                UpdateOptions { multi: true },
            )
            .await
            .unwrap();

        assert_eq!(result, UpdateResult { matched: 2, modified: 2 });
        let modified = revisions.into_iter().map(|revision| revision.current).collect::<Vec<_>>();
        assert_eq!(titles(&modified), vec!["Alex", "Kim"]);
        assert_eq!(store.count_documents("profile", &doc! { "age": { "$exists": true } }).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn replacement_keeps_identifier() {
        let store = seeded().await;
        let sam = store.find_one("profile", &doc! { "title": "Sam" }).await.unwrap().unwrap();
        let id = sam.get_object_id(ID_FIELD).unwrap();

        store
            .update_documents("profile", &doc! { "_id": id }, &doc! { "title": "Samuel" }, UpdateOptions::default())
            .await
            .unwrap();

        let samuel = store.find_one("profile", &doc! { "_id": id }).await.unwrap().unwrap();
        assert_eq!(samuel, doc! { "_id": id, "title": "Samuel" });
    }

    #[tokio::test]
    async fn identifier_is_immutable() {
        let store = seeded().await;

        let result = store
            .update_documents(
                "profile",
                &doc! { "title": "Sam" },
                &doc! { "$set": { "_id": ObjectId::new() } },
                UpdateOptions::default(),
            )
            .await;

        assert!(matches!(result, Err(DocumentStoreError::Store(_))));
    }

    #[tokio::test]
    async fn unsupported_update_operator_is_rejected() {
        let store = seeded().await;

        let result = store
            .update_documents("profile", &doc! {}, &doc! { "$inc": { "age": 1 } }, UpdateOptions::default())
            .await;

        assert!(matches!(result, Err(DocumentStoreError::Store(_))));
    }

    #[tokio::test]
    async fn remove_single_or_all() {
        let store = seeded().await;

        let single = store
            .remove_returning("profile", &doc! { "age": { "$gt": 20 } }, RemoveOptions { single: true })
            .await
            .unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].document.get_str("title").unwrap(), "Alex");

        let rest = store
            .remove_documents("profile", &doc! {}, RemoveOptions::default())
            .await
            .unwrap();
        assert_eq!(rest, Some(2));
        assert_eq!(store.list_collections().await.unwrap(), vec!["profile"]);
    }

    #[tokio::test]
    async fn restore_and_drop() {
        let store = InMemoryStore::new();
        store.restore("post", vec![doc! { "_id": 1, "title": "hello" }]).await;

        assert_eq!(store.snapshot("post").await.len(), 1);

        store.drop_collection("post").await.unwrap();
        store.drop_collection("post").await.unwrap();
        assert!(store.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn changes_can_be_rolled_back() {
        let store = seeded().await;
        let before = store.snapshot("profile").await;

        let (_, revisions) = store
            .update_returning("profile", &doc! {}, &doc! { "$set": { "age": 0 } }, UpdateOptions { multi: true })
            .await
            .unwrap();
        store.revert("profile", revisions).await;
        assert_eq!(store.snapshot("profile").await, before);

        let removals = store
            .remove_returning("profile", &doc! { "title": { "$in": ["Alex", "Kim"] } }, RemoveOptions::default())
            .await
            .unwrap();
        assert_eq!(removals.iter().map(|removal| removal.position).collect::<Vec<_>>(), vec![0, 2]);
        store.reinstate("profile", removals).await;
        assert_eq!(store.snapshot("profile").await, before);

        store.insert_documents("profile", vec![doc! { "title": "Lee" }]).await.unwrap();
        store.discard_last("profile", 1).await;
        assert_eq!(store.snapshot("profile").await, before);
    }
}
