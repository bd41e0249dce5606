//! In-memory document storage backend for docbind.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is the reference engine
//! for development and tests. It is also the working set of the file-backed engine.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Ordered collections** - Finds return documents in insertion order
//! - **Filter matching** - Equality, comparison, membership and existence operators,
//!   `$and`/`$or`, dotted paths
//! - **Update modifiers** - `$set`, `$unset` and whole-document replacement
//!
//! # Quick Start
//!
//! ```ignore
//! use docbind::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::connect::<(Profile,), _>(InMemoryStore::builder()).await?;
//!     let profiles = session.bind::<Profile>()?;
//!
//!     let mut alex = Profile { title: "Alex".into(), ..Default::default() };
//!     profiles.save(&mut alex).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbind_memory;

pub mod evaluator;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder, Removal, Revision};
