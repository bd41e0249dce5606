//! Store sessions.
//!
//! A [`Session`] owns one opened backend and hands out a [`Repository`] per bound model
//! type. It keeps a registry of which type is bound to which collection name so two
//! distinct types can never share a collection within one session.
//!
//! # Example
//!
//! ```ignore
//! use docbind_core::session::Session;
//!
//! let session = Session::connect::<(Profile, Post), _>(InMemoryStore::builder()).await?;
//! let profiles = session.bind::<Profile>()?;
//! ```

use parking_lot::Mutex;
use std::{
    any::{TypeId, type_name},
    collections::HashMap,
    fmt,
    sync::Arc,
};

use crate::{
    backend::{StoreBackend, StoreBackendBuilder},
    collection::CollectionAdapter,
    error::{DocumentStoreError, DocumentStoreResult},
    model::Model,
    repository::Repository,
};

#[derive(Debug, Clone, Copy)]
struct Binding {
    type_id: TypeId,
    type_name: &'static str,
}

/// One opened store shared by every repository bound to it.
///
/// Cheap to clone; clones share the backend and the binding registry.
#[derive(Clone)]
pub struct Session {
    backend: Arc<dyn StoreBackend>,
    bindings: Arc<Mutex<HashMap<String, Binding>>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("backend", &self.backend)
            .field("bound", &self.bindings.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Session {
    /// Creates a session over an already opened backend.
    pub fn new(backend: impl StoreBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
            bindings: Arc::default(),
        }
    }

    /// Builds a backend and binds every model type of `M` to it.
    ///
    /// # Errors
    ///
    /// Fails with [`DocumentStoreError::ConnectionFailed`] if the backend cannot be built,
    /// or with [`DocumentStoreError::CollectionConflict`] if two types of `M` share a
    /// collection name.
    pub async fn connect<M, B>(builder: B) -> DocumentStoreResult<Self>
    where
        M: ModelSet,
        B: StoreBackendBuilder,
        B::Backend: 'static,
    {
        let backend = builder.build().await.map_err(|err| match err {
            DocumentStoreError::ConnectionFailed(_) => err,
            other => DocumentStoreError::ConnectionFailed(other.to_string()),
        })?;

        let session = Self::new(backend);
        M::bind_all(&session)?;

        Ok(session)
    }

    /// Binds `T` to its collection and returns its repository.
    ///
    /// Binding the same type again replaces the prior binding.
    ///
    /// # Errors
    ///
    /// Fails with [`DocumentStoreError::CollectionConflict`] if another type is already
    /// bound to `T`'s collection name.
    pub fn bind<T: Model>(&self) -> DocumentStoreResult<Repository<T>> {
        let name = T::collection_name();
        let requested = Binding {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        };

        {
            let mut bindings = self.bindings.lock();

            if let Some(bound) = bindings.get(&name).filter(|b| b.type_id != requested.type_id) {
                return Err(DocumentStoreError::CollectionConflict {
                    collection: name,
                    bound: bound.type_name,
                    requested: requested.type_name,
                });
            }

            bindings.insert(name.clone(), requested);
        }

        tracing::debug!(collection = %name, model = requested.type_name, "bound model");

        Ok(Repository::new(self.collection(name)))
    }

    /// Returns an adapter for the collection `name`, bound or not.
    pub fn collection(&self, name: impl Into<String>) -> CollectionAdapter {
        CollectionAdapter::new(name, self.backend.clone())
    }

    /// Returns the names of the collections currently bound in this session.
    pub fn bound_collections(&self) -> Vec<String> {
        let mut names = self.bindings.lock().keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Lists the collections present in the store.
    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.backend.list_collections().await
    }

    /// Flushes the store and releases its resources.
    ///
    /// Repositories obtained from this session must not be used afterwards.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await
    }
}

/// A set of model types bound together, written as a tuple: `(Profile, Post)`.
pub trait ModelSet {
    /// Binds every type of the set to `session`.
    fn bind_all(session: &Session) -> DocumentStoreResult<()>;
}

impl ModelSet for () {
    fn bind_all(_session: &Session) -> DocumentStoreResult<()> {
        Ok(())
    }
}

macro_rules! impl_model_set {
    ($($model:ident),+) => {
        impl<$($model: Model),+> ModelSet for ($($model,)+) {
            fn bind_all(session: &Session) -> DocumentStoreResult<()> {
                $(session.bind::<$model>()?;)+
                Ok(())
            }
        }
    };
}

impl_model_set!(A);
impl_model_set!(A, B);
impl_model_set!(A, B, C);
impl_model_set!(A, B, C, D);
impl_model_set!(A, B, C, D, E);
impl_model_set!(A, B, C, D, E, F);
impl_model_set!(A, B, C, D, E, F, G);
impl_model_set!(A, B, C, D, E, F, G, H);
