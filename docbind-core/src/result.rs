//! Counted query results.
//!
//! [`QueryResult`] is created per query. Its count is taken once, when the query is
//! issued, and is not refreshed. Instances are produced on demand in three ways:
//!
//! - [`all`](QueryResult::all) - one full materialization
//! - [`page`](QueryResult::page) - one skip/limit window
//! - [`stream`](QueryResult::stream) - a lazy, forward-only [`ModelStream`] fetching one
//!   page at a time
//!
//! # Example
//!
//! ```ignore
//! use futures::TryStreamExt;
//!
//! let result = profiles.find(doc! {}).await?;
//! let mut stream = result.stream(result.count(), 25);
//! while let Some(profile) = stream.try_next().await? {
//!     println!("{}", profile.title);
//! }
//! ```

use bson::Document;
use futures::{FutureExt, Stream, future::BoxFuture};
use std::{
    collections::VecDeque,
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{
    collection::CollectionAdapter,
    error::{DocumentStoreError, DocumentStoreResult},
    filter::Filter,
    model::{Model, ModelExt},
    page::{Page, PaginationParams},
};

/// The result set of one query over a model's collection.
pub struct QueryResult<T> {
    count: u64,
    filter: Filter,
    collection: CollectionAdapter,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Model> QueryResult<T> {
    pub(crate) fn new(count: u64, filter: Filter, collection: CollectionAdapter) -> Self {
        Self {
            count,
            filter,
            collection,
            _marker: PhantomData,
        }
    }

    /// Number of matching documents when the query was issued.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// The combined filter of this query.
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Fetches every matching document in one materialization.
    pub async fn all(&self) -> DocumentStoreResult<Vec<T>> {
        self.collection
            .find(self.filter.clone())
            .to_vec()
            .await?
            .into_iter()
            .map(T::from_document)
            .collect()
    }

    /// Fetches page `page` (1-indexed) of `per_page` documents.
    ///
    /// # Errors
    ///
    /// Fails with [`DocumentStoreError::InvalidPagination`] if `page` or `per_page` is zero.
    pub async fn page(&self, page: usize, per_page: usize) -> DocumentStoreResult<Page<T>> {
        let params = PaginationParams::new(page, per_page).validate()?;
        let items = self
            .collection
            .find(self.filter.clone())
            .skip(params.offset())
            .limit(params.per_page)
            .to_vec()
            .await?
            .into_iter()
            .map(T::from_document)
            .collect::<DocumentStoreResult<Vec<T>>>()?;

        Ok(params.into_page(items, self.count))
    }

    /// Streams up to `total_count` instances, fetching `page_size` documents at a time.
    ///
    /// Walks pages `1..=ceil(total_count / page_size)`. Each call starts a fresh stream
    /// from page 1.
    pub fn stream(&self, total_count: u64, page_size: usize) -> ModelStream<T> {
        ModelStream::new(
            self.collection.clone(),
            self.filter.clone(),
            total_count,
            page_size,
        )
    }

    /// Streams every instance counted by this result.
    pub fn stream_all(&self, page_size: usize) -> ModelStream<T> {
        self.stream(self.count, page_size)
    }
}

type PageFetch = BoxFuture<'static, DocumentStoreResult<Vec<Document>>>;

/// A lazy, single-pass stream of model instances built from sequential page fetches.
///
/// The next page is requested only once the current one is drained, so dropping the
/// stream early issues no further fetches. The stream ends after the last page, after an
/// empty page, or after yielding an error.
pub struct ModelStream<T> {
    collection: CollectionAdapter,
    filter: Filter,
    page_size: usize,
    next_page: u64,
    last_page: u64,
    buffer: VecDeque<T>,
    pending: Option<PageFetch>,
    failure: Option<DocumentStoreError>,
    done: bool,
}

// No field is structurally pinned.
impl<T> Unpin for ModelStream<T> {}

impl<T: Model> ModelStream<T> {
    fn new(collection: CollectionAdapter, filter: Filter, total_count: u64, page_size: usize) -> Self {
        let params = PaginationParams::new(1, page_size);
        let failure = params.validate().err();

        Self {
            collection,
            filter,
            page_size,
            next_page: 1,
            last_page: params.page_count(total_count),
            buffer: VecDeque::new(),
            pending: None,
            failure,
            done: false,
        }
    }

    /// Number of pages this stream walks in total.
    pub fn page_count(&self) -> u64 {
        self.last_page
    }

    fn fetch_next_page(&mut self) -> PageFetch {
        let offset = (self.next_page as usize - 1) * self.page_size;

        self.next_page += 1;
        self.collection
            .find(self.filter.clone())
            .skip(offset)
            .limit(self.page_size)
            .to_vec()
            .boxed()
    }
}

impl<T: Model> Stream for ModelStream<T> {
    type Item = DocumentStoreResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(item) = this.buffer.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }

            if let Some(err) = this.failure.take() {
                this.done = true;
                return Poll::Ready(Some(Err(err)));
            }

            if this.done {
                return Poll::Ready(None);
            }

            let mut fetch = match this.pending.take() {
                Some(fetch) => fetch,
                None if this.next_page > this.last_page => {
                    this.done = true;
                    return Poll::Ready(None);
                }
                None => this.fetch_next_page(),
            };

            let documents = match fetch.poll_unpin(cx) {
                Poll::Pending => {
                    this.pending = Some(fetch);
                    return Poll::Pending;
                }
                Poll::Ready(result) => result,
            };

            match documents.and_then(|documents| {
                documents
                    .into_iter()
                    .map(T::from_document)
                    .collect::<DocumentStoreResult<VecDeque<T>>>()
            }) {
                Ok(items) if items.is_empty() => this.done = true,
                Ok(items) => this.buffer = items,
                Err(err) => this.failure = Some(err),
            }
        }
    }
}
