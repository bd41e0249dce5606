//! Embedded, file-backed document storage backend for docbind.
//!
//! A [`FileStore`] is rooted at one directory. Each collection is persisted as an
//! append-only `<collection>.journal` file next to the others; the whole directory is
//! replayed into memory when the store opens and every journal is compacted to its live
//! documents on [`shutdown`](docbind_core::backend::StoreBackend::shutdown).
//!
//! # Quick Start
//!
//! ```ignore
//! use docbind_file::{FileStore, FileStoreSettings};
//! use docbind_core::session::Session;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = FileStoreSettings::new("./data").with_database_name("app");
//!     let session = Session::connect::<(Profile,), _>(FileStore::builder(settings)).await?;
//!
//!     // ...
//!
//!     session.shutdown().await?;
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docbind_file;

pub mod journal;
pub mod settings;
pub mod store;

pub use settings::FileStoreSettings;
pub use store::{FileStore, FileStoreBuilder};
