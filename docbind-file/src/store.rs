//! File-backed storage implementation.
//!
//! The working set lives in an [`InMemoryStore`]. Every mutation is applied there and
//! the resulting changes are appended to the collection's journal while the journal lock
//! is held, so the journal order always matches the in-memory order. A mutation whose
//! journal append fails is undone in memory before the error is returned.

use async_trait::async_trait;
use bson::Document;
use mea::mutex::Mutex;
use std::{collections::HashMap, fmt, fs, io, sync::Arc};

use docbind_core::{
    backend::{FindOptions, RemoveOptions, StoreBackend, StoreBackendBuilder, UpdateOptions, UpdateResult},
    error::{DocumentStoreError, DocumentStoreResult},
};
use docbind_memory::InMemoryStore;

use crate::{
    journal::{self, Journal, JournalEntry},
    settings::{FileStoreSettings, JOURNAL_EXTENSION},
};

/// Embedded document store persisting each collection to a journal file.
///
/// Cloneable; clones share the same files and working set.
///
/// # Example
///
/// ```ignore
/// use docbind_file::{FileStore, FileStoreSettings};
///
/// let store = FileStore::builder(FileStoreSettings::new("./data")).build().await?;
/// store.insert_documents("profile", vec![doc! { "title": "Alex" }]).await?;
/// store.shutdown().await?;
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    inner: Arc<Inner>,
}

struct Inner {
    memory: InMemoryStore,
    journals: Mutex<HashMap<String, Journal>>,
    settings: FileStoreSettings,
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStore")
            .field("directory", &self.settings.directory_path)
            .field("database", &self.settings.database_name)
            .finish_non_exhaustive()
    }
}

impl FileStore {
    pub fn builder(settings: FileStoreSettings) -> FileStoreBuilder {
        FileStoreBuilder { settings }
    }

    pub fn settings(&self) -> &FileStoreSettings {
        &self.inner.settings
    }

    /// Opens the directory, replaying every journal found in it.
    async fn open(settings: FileStoreSettings) -> io::Result<Self> {
        let directory = settings.directory();

        if directory.exists() && !directory.is_dir() {
            return Err(io::Error::other(format!("{} is not a directory", directory.display())));
        }
        fs::create_dir_all(directory)?;

        let memory = InMemoryStore::new();
        let mut journals = HashMap::new();

        for dir_entry in fs::read_dir(directory)? {
            let path = dir_entry?.path();

            if path.extension().and_then(|ext| ext.to_str()) != Some(JOURNAL_EXTENSION) {
                continue;
            }
            let Some(collection) = path.file_stem().and_then(|stem| stem.to_str()).map(str::to_string) else {
                continue;
            };

            let (entries, stats) = journal::replay(&path)?;
            let documents = journal::fold(entries);

            tracing::debug!(
                collection = %collection,
                documents = documents.len(),
                applied = stats.applied,
                skipped = stats.skipped,
                "replayed journal"
            );

            let journal = if stats.has_torn_tail() {
                Journal::open_at(path, stats.valid_len, settings.sync_writes)?
            } else {
                Journal::open(path, settings.sync_writes)?
            };

            memory.restore(&collection, documents).await;
            journals.insert(collection, journal);
        }

        tracing::info!(
            directory = %directory.display(),
            database = %settings.database_name,
            collections = journals.len(),
            "opened file store"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                memory,
                journals: Mutex::new(journals),
                settings,
            }),
        })
    }

    fn write_error(&self, collection: &str, err: io::Error) -> DocumentStoreError {
        DocumentStoreError::Store(format!(
            "journal {}: {err}",
            self.inner.settings.journal_path(collection).display()
        ))
    }

    fn journal<'a>(
        &self,
        journals: &'a mut HashMap<String, Journal>,
        collection: &str,
    ) -> DocumentStoreResult<&'a mut Journal> {
        if !journals.contains_key(collection) {
            let journal = Journal::open(self.inner.settings.journal_path(collection), self.inner.settings.sync_writes)
                .map_err(|err| self.write_error(collection, err))?;
            journals.insert(collection.to_string(), journal);
        }

        journals
            .get_mut(collection)
            .ok_or_else(|| DocumentStoreError::Store(format!("journal for {collection} unavailable")))
    }

    fn record(
        &self,
        journals: &mut HashMap<String, Journal>,
        collection: &str,
        entries: &[JournalEntry],
    ) -> DocumentStoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        self.journal(journals, collection)?
            .append(entries)
            .map_err(|err| self.write_error(collection, err))
    }
}

#[async_trait]
impl StoreBackend for FileStore {
    async fn insert_documents(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<Vec<Document>> {
        let mut journals = self.inner.journals.lock().await;
        self.journal(&mut journals, collection)?;
        let stored = self.inner.memory.insert_documents(collection, documents).await?;

        let entries = stored
            .iter()
            .map(|document| JournalEntry::Put { document: document.clone() })
            .collect::<Vec<_>>();
        if let Err(err) = self.record(&mut journals, collection, &entries) {
            self.inner.memory.discard_last(collection, stored.len()).await;
            return Err(err);
        }

        Ok(stored)
    }

    async fn find_documents(
        &self,
        collection: &str,
        filter: &Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        self.inner
            .memory
            .find_documents(collection, filter, options)
            .await
    }

    async fn update_documents(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateResult> {
        let mut journals = self.inner.journals.lock().await;
        let (result, revisions) = self
            .inner
            .memory
            .update_returning(collection, filter, update, options)
            .await?;

        let entries = revisions
            .iter()
            .map(|revision| JournalEntry::Put { document: revision.current.clone() })
            .collect::<Vec<_>>();
        if let Err(err) = self.record(&mut journals, collection, &entries) {
            self.inner.memory.revert(collection, revisions).await;
            return Err(err);
        }

        Ok(result)
    }

    async fn remove_documents(
        &self,
        collection: &str,
        filter: &Document,
        options: RemoveOptions,
    ) -> DocumentStoreResult<Option<u64>> {
        let mut journals = self.inner.journals.lock().await;
        let removed = self
            .inner
            .memory
            .remove_returning(collection, filter, options)
            .await?;

        let entries = removed
            .iter()
            .map(|removal| JournalEntry::delete(&removal.document))
            .collect::<Vec<_>>();
        if let Err(err) = self.record(&mut journals, collection, &entries) {
            self.inner.memory.reinstate(collection, removed).await;
            return Err(err);
        }

        Ok(Some(removed.len() as u64))
    }

    async fn count_documents(&self, collection: &str, filter: &Document) -> DocumentStoreResult<u64> {
        self.inner
            .memory
            .count_documents(collection, filter)
            .await
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.inner.memory.list_collections().await
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        let mut journals = self.inner.journals.lock().await;
        self.inner.memory.drop_collection(name).await?;

        let removed = match journals.remove(name) {
            Some(journal) => journal.remove(),
            None => match fs::remove_file(self.inner.settings.journal_path(name)) {
                Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
                _ => Ok(()),
            },
        };

        removed.map_err(|err| self.write_error(name, err))
    }

    /// Compacts every journal to one entry per live document.
    async fn shutdown(&self) -> DocumentStoreResult<()> {
        let mut journals = self.inner.journals.lock().await;

        for (collection, journal) in journals.iter_mut() {
            let documents = self.inner.memory.snapshot(collection).await;

            journal
                .compact(&documents)
                .map_err(|err| self.write_error(collection, err))?;

            tracing::info!(collection = %collection, documents = documents.len(), "compacted journal");
        }

        Ok(())
    }
}

/// Builder opening a [`FileStore`] from [`FileStoreSettings`].
#[derive(Debug, Clone)]
pub struct FileStoreBuilder {
    settings: FileStoreSettings,
}

impl FileStoreBuilder {
    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.settings.sync_writes = sync_writes;
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for FileStoreBuilder {
    type Backend = FileStore;

    /// Creates the directory if needed and replays its journals.
    ///
    /// # Errors
    ///
    /// Fails with [`DocumentStoreError::ConnectionFailed`] if the directory cannot be
    /// created or read.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let directory = self.settings.directory_path.clone();

        FileStore::open(self.settings)
            .await
            .map_err(|err| DocumentStoreError::ConnectionFailed(format!("{}: {err}", directory.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};

    async fn open(dir: &tempfile::TempDir) -> FileStore {
        FileStore::builder(FileStoreSettings::new(dir.path()))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn mutations_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = ObjectId::new();

        {
            let store = open(&dir).await;
            store
                .insert_documents("profile", vec![doc! { "_id": id, "title": "Alex" }, doc! { "title": "Sam" }])
                .await
                .unwrap();
            store
                .update_documents("profile", &doc! { "_id": id }, &doc! { "$set": { "title": "Alexis" } }, UpdateOptions::default())
                .await
                .unwrap();
            store
                .remove_documents("profile", &doc! { "title": "Sam" }, RemoveOptions { single: true })
                .await
                .unwrap();
        }

        let store = open(&dir).await;
        let documents = store
            .find_documents("profile", &doc! {}, FindOptions::default())
            .await
            .unwrap();

        assert_eq!(documents, vec![doc! { "_id": id, "title": "Alexis" }]);
        assert_eq!(store.list_collections().await.unwrap(), vec!["profile"]);
    }

    #[tokio::test]
    async fn shutdown_compacts_journals() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;

        store
            .insert_documents("post", (0..10).map(|n| doc! { "n": n }).collect())
            .await
            .unwrap();
        store
            .update_documents("post", &doc! {}, &doc! { "$set": { "seen": true } }, UpdateOptions { multi: true })
            .await
            .unwrap();
        store
            .remove_documents("post", &doc! { "n": { "$gte": 5 } }, RemoveOptions::default())
            .await
            .unwrap();
        store.shutdown().await.unwrap();

        let (entries, _) = journal::replay(&dir.path().join("post.journal")).unwrap();
        assert_eq!(entries.len(), 5);
        assert!(entries.iter().all(|entry| matches!(entry, JournalEntry::Put { .. })));

        let reopened = open(&dir).await;
        assert_eq!(reopened.count_documents("post", &doc! { "seen": true }).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn unchanged_updates_are_not_journaled() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        store.insert_documents("tag", vec![doc! { "name": "rust" }]).await.unwrap();

        let result = store
            .update_documents("tag", &doc! {}, &doc! { "$set": { "name": "rust" } }, UpdateOptions::default())
            .await
            .unwrap();

        assert_eq!(result, UpdateResult { matched: 1, modified: 0 });
        let (entries, _) = journal::replay(&dir.path().join("tag.journal")).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn drop_collection_deletes_journal() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        store.insert_documents("post", vec![doc! {}]).await.unwrap();

        store.drop_collection("post").await.unwrap();
        store.drop_collection("post").await.unwrap();

        assert!(!dir.path().join("post.journal").exists());
        assert!(open(&dir).await.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_path_is_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("occupied");
        fs::write(&file, b"").unwrap();

        let result = FileStore::builder(FileStoreSettings::new(&file)).build().await;

        assert!(matches!(result, Err(DocumentStoreError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn missing_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");

        FileStore::builder(FileStoreSettings::new(&nested)).build().await.unwrap();

        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn duplicate_insert_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        let id = ObjectId::new();
        store.insert_documents("profile", vec![doc! { "_id": id }]).await.unwrap();

        assert!(store.insert_documents("profile", vec![doc! { "_id": id }]).await.is_err());

        let (entries, _) = journal::replay(&dir.path().join("profile.journal")).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn writes_after_a_torn_tail_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.journal");

        open(&dir).await.insert_documents("profile", vec![doc! { "title": "before" }]).await.unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes.extend_from_slice(&[0x01, 0x02, 0x03]);
        fs::write(&path, &bytes).unwrap();

        let store = open(&dir).await;
        store.insert_documents("profile", vec![doc! { "title": "after" }]).await.unwrap();
        assert_eq!(store.count_documents("profile", &doc! {}).await.unwrap(), 2);
        drop(store);

        let titles = open(&dir)
            .await
            .find_documents("profile", &doc! {}, FindOptions::default())
            .await
            .unwrap()
            .iter()
            .map(|document| document.get_str("title").unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["before", "after"]);
    }

    #[tokio::test]
    async fn unopenable_journal_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        fs::create_dir(dir.path().join("profile.journal")).unwrap();

        let result = store.insert_documents("profile", vec![doc! { "title": "Alex" }]).await;

        assert!(matches!(result, Err(DocumentStoreError::Store(_))));
        assert_eq!(store.count_documents("profile", &doc! {}).await.unwrap(), 0);

        fs::remove_dir(dir.path().join("profile.journal")).unwrap();
        store.insert_documents("profile", vec![doc! { "title": "Alex" }]).await.unwrap();
        assert_eq!(store.count_documents("profile", &doc! {}).await.unwrap(), 1);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn failed_journal_writes_are_undone_in_memory() {
        if !std::path::Path::new("/dev/full").exists() {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir).await;
        std::os::unix::fs::symlink("/dev/full", dir.path().join("profile.journal")).unwrap();

        let seeded = vec![doc! { "_id": 1, "title": "Alex" }, doc! { "_id": 2, "title": "Sam" }];
        store.inner.memory.restore("profile", seeded.clone()).await;

        assert!(store.insert_documents("profile", vec![doc! { "title": "Kim" }]).await.is_err());
        assert!(
            store
                .update_documents("profile", &doc! {}, &doc! { "$set": { "title": "x" } }, UpdateOptions { multi: true })
                .await
                .is_err()
        );
        assert!(
            store
                .remove_documents("profile", &doc! { "_id": 1 }, RemoveOptions::default())
                .await
                .is_err()
        );

        assert_eq!(store.inner.memory.snapshot("profile").await, seeded);
    }
}
