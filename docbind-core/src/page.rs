//! Pagination types for query results.
//!
//! Pages are 1-indexed. [`PaginationParams`] turns a page number and size into the
//! skip/limit window sent to the store; [`Page`] carries one window of results together
//! with the total count and navigation hints.

use serde::{Deserialize, Serialize};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// A single page of results.
///
/// # Example
///
/// ```ignore
/// use docbind_core::page::Page;
///
/// let page: Page<String> = Page::builder(vec!["item1".to_string()])
///     .with_count(100)
///     .with_next_page(Some(2))
///     .build();
///
/// assert_eq!(page.items.len(), 1);
/// assert_eq!(page.count, 100);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items contained in this page.
    pub items: Vec<T>,
    /// Total count of items across all pages.
    pub count: u64,
    /// The next page number (if more pages exist).
    pub next_page: Option<usize>,
    /// The previous page number (if this is not the first page).
    pub previous_page: Option<usize>,
}

impl<T> Page<T> {
    /// Creates a new builder for constructing a page.
    pub fn builder(items: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(items)
    }

    /// Consumes the page, returning its items.
    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

/// Builder for constructing [`Page`] instances.
pub struct PageBuilder<T> {
    items: Vec<T>,
    count: u64,
    next_page: Option<usize>,
    previous_page: Option<usize>,
}

impl<T> PageBuilder<T> {
    /// Creates a new builder with the given items.
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }

    /// Sets the total count of items across all pages.
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    /// Sets the next page number (or `None` if this is the last page).
    pub fn with_next_page(mut self, next_page: Option<usize>) -> Self {
        self.next_page = next_page;
        self
    }

    /// Sets the previous page number (or `None` if this is the first page).
    pub fn with_previous_page(mut self, previous_page: Option<usize>) -> Self {
        self.previous_page = previous_page;
        self
    }

    /// Builds and returns the final [`Page`] instance.
    pub fn build(self) -> Page<T> {
        Page {
            items: self.items,
            count: self.count,
            next_page: self.next_page,
            previous_page: self.previous_page,
        }
    }
}

/// Which page to fetch and how large pages are.
///
/// # Example
///
/// ```ignore
/// use docbind_core::page::PaginationParams;
///
/// let params = PaginationParams::new(3, 20);
/// assert_eq!(params.offset(), 40);
/// assert_eq!(params.page_count(45), 3);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationParams {
    /// The page number (1-indexed).
    pub page: usize,
    /// Number of items per page.
    pub per_page: usize,
}

impl PaginationParams {
    /// Creates new pagination parameters.
    pub fn new(page: usize, per_page: usize) -> Self {
        Self { page, per_page }
    }

    /// Checks that the page is 1-indexed and the page size positive.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidPagination`] otherwise.
    pub fn validate(self) -> DocumentStoreResult<Self> {
        if self.page == 0 || self.per_page == 0 {
            return Err(DocumentStoreError::InvalidPagination {
                page: self.page,
                per_page: self.per_page,
            });
        }

        Ok(self)
    }

    /// Number of items to skip to reach this page.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1) * self.per_page
    }

    /// Number of pages needed to hold `total` items at this page size.
    pub fn page_count(&self, total: u64) -> u64 {
        if self.per_page == 0 {
            return 0;
        }

        total.div_ceil(self.per_page as u64)
    }

    /// Wraps the items fetched for this page with navigation metadata.
    pub fn into_page<T>(self, items: Vec<T>, total: u64) -> Page<T> {
        let last_page = self.page_count(total);

        Page::builder(items)
            .with_count(total)
            .with_next_page(if (self.page as u64) < last_page {
                Some(self.page + 1)
            } else {
                None
            })
            .with_previous_page(if self.page > 1 {
                Some(self.page - 1)
            } else {
                None
            })
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_and_page_count() {
        let params = PaginationParams::new(3, 20);

        assert_eq!(params.offset(), 40);
        assert_eq!(params.page_count(0), 0);
        assert_eq!(params.page_count(40), 2);
        assert_eq!(params.page_count(41), 3);
    }

    #[test]
    fn validate_rejects_zero_page_or_size() {
        assert!(PaginationParams::new(1, 1).validate().is_ok());
        assert!(matches!(
            PaginationParams::new(0, 10).validate(),
            Err(DocumentStoreError::InvalidPagination { page: 0, per_page: 10 })
        ));
        assert!(PaginationParams::new(2, 0).validate().is_err());
    }

    #[test]
    fn into_page_sets_navigation() {
        let first = PaginationParams::new(1, 10).into_page(vec![1; 10], 25);
        assert_eq!((first.previous_page, first.next_page), (None, Some(2)));

        let last = PaginationParams::new(3, 10).into_page(vec![1; 5], 25);
        assert_eq!((last.previous_page, last.next_page), (Some(2), None));
        assert_eq!(last.count, 25);
    }
}
