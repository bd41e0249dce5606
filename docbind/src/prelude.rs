//! Convenient re-exports of commonly used types from docbind.
//!
//! ```ignore
//! use docbind::prelude::*;
//! ```
//!
//! This provides access to:
//! - The model contract and its derive macro
//! - Sessions, repositories and query results
//! - Filters and pagination
//! - Store backends, builders and the bundled engines
//! - Error types

pub use docbind_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    collection::{CollectionAdapter, Cursor},
    error::{DocumentStoreError, DocumentStoreResult},
    filter::{FieldOp, Filter},
    id::{IntoObjectId, new_id, parse_id},
    model::{Model, ModelExt},
    page::{Page, PaginationParams},
    repository::{Repository, Saved},
    result::{ModelStream, QueryResult},
    session::{ModelSet, Session},
};
pub use docbind_file::{FileStore, FileStoreSettings};
pub use docbind_macros::Model;
pub use docbind_memory::InMemoryStore;
