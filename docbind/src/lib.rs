//! Main docbind crate: a small object-document mapper over an embedded document store.
//!
//! This crate is the primary entry point for users of the docbind framework. It
//! re-exports the core types from the sub-crates, the `Model` derive macro and the bundled
//! storage engines, and provides [`init`] to open a file-backed store with a set of model
//! types bound to it.
//!
//! # Features
//!
//! - **Plain models** - Define your records with Serde and `#[derive(Model)]`
//! - **Repositories** - `find`, `get`, `save`, `remove` and `clear` per model type
//! - **Counted results** - Materialize all results, one page, or stream them page by page
//! - **Embedded storage** - File-backed journals, or a pure in-memory engine for tests
//!
//! # Quick Start
//!
//! ```ignore
//! use docbind::{prelude::*, bson::{doc, oid::ObjectId}};
//! use futures::TryStreamExt;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize, Model)]
//! #[serde(default)]
//! pub struct Profile {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<ObjectId>,
//!     pub title: String,
//!     pub email: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = docbind::init::<(Profile,)>(FileStoreSettings::new("./data")).await?;
//!     let profiles = session.bind::<Profile>()?;
//!
//!     let mut alex = Profile { title: "Alex".into(), email: "test@test.ru".into(), ..Default::default() };
//!     profiles.save(&mut alex).await?;
//!
//!     let result = profiles.find(doc! {}).await?;
//!     println!("{} profiles", result.count());
//!
//!     let mut stream = result.stream_all(10);
//!     while let Some(profile) = stream.try_next().await? {
//!         println!("{profile:?}");
//!     }
//!
//!     profiles.remove(&alex).await?;
//!     session.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`file`] - Journal files in one directory, the default behind [`init`]
//! - [`memory`] - In-memory storage for development and testing

#[allow(unused_extern_crates)]
extern crate self as docbind;

pub mod prelude;

pub use docbind_core::{backend, collection, error, filter, id, model, page, repository, result, session};
pub use docbind_macros::Model;

// Re-export BSON types for convenience
pub use bson;

use docbind_core::{error::DocumentStoreResult, session::{ModelSet, Session}};

/// In-memory storage backend implementations.
pub mod memory {
    pub use docbind_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// File-backed storage backend implementations.
pub mod file {
    pub use docbind_file::{FileStore, FileStoreBuilder, FileStoreSettings};
}

/// Opens a file-backed store with `settings` and binds every model type of `M`.
///
/// `M` is a tuple of model types, e.g. `(Profile, Post)`.
///
/// # Errors
///
/// Fails with [`ConnectionFailed`](error::DocumentStoreError::ConnectionFailed) if the
/// store cannot be opened at `settings.directory_path`, or with
/// [`CollectionConflict`](error::DocumentStoreError::CollectionConflict) if two types of
/// `M` resolve to the same collection.
pub async fn init<M: ModelSet>(settings: file::FileStoreSettings) -> DocumentStoreResult<Session> {
    Session::connect::<M, _>(file::FileStore::builder(settings)).await
}
