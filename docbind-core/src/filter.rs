//! Filters selecting a subset of the documents in a collection.
//!
//! A [`Filter`] is a mapping from field name to constraint. A plain value is an equality
//! constraint; a document of `$`-prefixed operators is passed to the store as-is.
//!
//! Filters given as a sequence are merged into one with a right-biased union: on a key
//! collision the later mapping wins, and nested values are replaced, never merged.
//!
//! # Example
//!
//! ```ignore
//! use docbind_core::filter::Filter;
//! use bson::doc;
//!
//! let filter = Filter::from(vec![doc! { "a": 1, "b": 2 }, doc! { "b": 3 }]);
//! assert_eq!(filter.into_document(), doc! { "a": 1, "b": 3 });
//!
//! let adults = Filter::gte("age", 18).and(Filter::eq("active", true));
//! ```

use bson::{Bson, Document, doc, oid::ObjectId};
use std::fmt;

use crate::model::ID_FIELD;

/// Field comparison operators understood by the bundled store engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to (exact match).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Value is one of the given values.
    In,
    /// Value is none of the given values.
    Nin,
}

impl FieldOp {
    /// Returns the store-native operator key.
    pub fn as_operator(&self) -> &'static str {
        match self {
            FieldOp::Eq => "$eq",
            FieldOp::Ne => "$ne",
            FieldOp::Gt => "$gt",
            FieldOp::Gte => "$gte",
            FieldOp::Lt => "$lt",
            FieldOp::Lte => "$lte",
            FieldOp::In => "$in",
            FieldOp::Nin => "$nin",
        }
    }
}

/// A field-to-constraint mapping.
///
/// The empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(Document);

impl Filter {
    /// Creates an empty filter matching all documents.
    pub fn new() -> Self {
        Filter(Document::new())
    }

    /// Merges a sequence of filters, later keys overriding earlier ones.
    pub fn combine<F>(filters: impl IntoIterator<Item = F>) -> Self
    where
        F: Into<Filter>,
    {
        filters
            .into_iter()
            .fold(Filter::new(), |merged, filter| merged.and(filter))
    }

    /// Matches the document with the given identifier.
    pub fn by_id(id: ObjectId) -> Self {
        Filter(doc! { ID_FIELD: id })
    }

    /// Creates a field comparison filter.
    pub fn field(field: impl Into<String>, op: FieldOp, value: impl Into<Bson>) -> Self {
        let mut document = Document::new();
        let value: Bson = value.into();
        let constraint = match op {
            FieldOp::Eq => value,
            _ => Bson::Document(doc! { op.as_operator(): value }),
        };

        document.insert(field.into(), constraint);
        Filter(document)
    }

    /// Matches documents where the field equals the value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::field(field, FieldOp::Eq, value)
    }

    /// Matches documents where the field does not equal the value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::field(field, FieldOp::Ne, value)
    }

    /// Matches documents where the field is greater than the value.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::field(field, FieldOp::Gt, value)
    }

    /// Matches documents where the field is greater than or equal to the value.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::field(field, FieldOp::Gte, value)
    }

    /// Matches documents where the field is less than the value.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::field(field, FieldOp::Lt, value)
    }

    /// Matches documents where the field is less than or equal to the value.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::field(field, FieldOp::Lte, value)
    }

    /// Matches documents where the field is one of the values.
    pub fn any_of(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Bson>>) -> Self {
        Self::field(field, FieldOp::In, values.into_iter().map(Into::into).collect::<Vec<Bson>>())
    }

    /// Matches documents where the field is none of the values.
    pub fn none_of(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Bson>>) -> Self {
        Self::field(field, FieldOp::Nin, values.into_iter().map(Into::into).collect::<Vec<Bson>>())
    }

    /// Matches documents where the field is present.
    pub fn exists(field: impl Into<String>) -> Self {
        let mut document = Document::new();
        document.insert(field.into(), doc! { "$exists": true });
        Filter(document)
    }

    /// Matches documents where the field is absent.
    pub fn not_exists(field: impl Into<String>) -> Self {
        let mut document = Document::new();
        document.insert(field.into(), doc! { "$exists": false });
        Filter(document)
    }

    /// Right-biased union with another filter.
    ///
    /// Keys of `other` replace keys of `self`; a key keeps its original position.
    pub fn and(mut self, other: impl Into<Filter>) -> Self {
        for (key, value) in other.into().0 {
            self.0.insert(key, value);
        }
        self
    }

    /// Returns `true` if this filter matches every document.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the store-native filter document.
    pub fn as_document(&self) -> &Document {
        &self.0
    }

    /// Consumes the filter, returning the store-native filter document.
    pub fn into_document(self) -> Document {
        self.0
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Document> for Filter {
    fn from(document: Document) -> Self {
        Filter(document)
    }
}

impl From<&Document> for Filter {
    fn from(document: &Document) -> Self {
        Filter(document.clone())
    }
}

impl From<Vec<Document>> for Filter {
    fn from(filters: Vec<Document>) -> Self {
        Filter::combine(filters)
    }
}

impl<const N: usize> From<[Document; N]> for Filter {
    fn from(filters: [Document; N]) -> Self {
        Filter::combine(filters)
    }
}

impl From<Vec<Filter>> for Filter {
    fn from(filters: Vec<Filter>) -> Self {
        Filter::combine(filters)
    }
}

impl From<()> for Filter {
    fn from(_: ()) -> Self {
        Filter::new()
    }
}

impl From<Filter> for Document {
    fn from(filter: Filter) -> Self {
        filter.0
    }
}
