//! Filter evaluation for in-memory document matching.
//!
//! Filters are BSON documents. Top-level keys are ANDed. A key is either a (possibly
//! dotted) field path or one of the logical operators `$and` / `$or`. A field constraint
//! is either a plain value (equality) or a document of comparison operators.

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use std::{cmp::Ordering, collections::HashMap};

use docbind_core::error::{DocumentStoreError, DocumentStoreResult};

const FIELD_OPERATORS: &[&str] = &["$eq", "$ne", "$gt", "$gte", "$lt", "$lte", "$in", "$nin", "$exists"];

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64 so `1`, `1i64` and `1.0` compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    ObjectId(ObjectId),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Values with no meaningful comparison (binary, regex, ...).
    Opaque(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            other => Comparable::Opaque(other),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Opaque(a), Comparable::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Resolves a dotted path inside a document. Numeric segments index into arrays.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// A validated filter that can be evaluated against documents.
#[derive(Debug)]
pub(crate) struct DocumentMatcher<'a> {
    filter: &'a Document,
}

impl<'a> DocumentMatcher<'a> {
    /// Checks that every operator in `filter` is supported.
    ///
    /// # Errors
    ///
    /// Fails with [`DocumentStoreError::Store`] on an unknown or malformed operator.
    pub fn new(filter: &'a Document) -> DocumentStoreResult<Self> {
        validate(filter)?;
        Ok(Self { filter })
    }

    pub fn matches(&self, document: &Document) -> bool {
        matches_filter(self.filter, document)
    }

    pub fn filter_documents<'d>(
        &self,
        documents: impl IntoIterator<Item = &'d Document>,
    ) -> impl Iterator<Item = &'d Document> {
        documents
            .into_iter()
            .filter(|document| self.matches(document))
    }
}

fn unsupported(message: String) -> DocumentStoreError {
    DocumentStoreError::Store(message)
}

fn validate(filter: &Document) -> DocumentStoreResult<()> {
    for (key, value) in filter {
        match key.as_str() {
            "$and" | "$or" => match value {
                Bson::Array(clauses) if !clauses.is_empty() => {
                    for clause in clauses {
                        match clause {
                            Bson::Document(clause) => validate(clause)?,
                            _ => return Err(unsupported(format!("{key} clauses must be documents"))),
                        }
                    }
                }
                _ => return Err(unsupported(format!("{key} expects a non-empty array"))),
            },
            operator if operator.starts_with('$') => {
                return Err(unsupported(format!("unsupported operator {operator}")));
            }
            _ => {
                if let Some(operators) = operator_document(value) {
                    validate_operators(key, operators)?;
                }
            }
        }
    }

    Ok(())
}

fn validate_operators(field: &str, operators: &Document) -> DocumentStoreResult<()> {
    for (operator, argument) in operators {
        if !FIELD_OPERATORS.contains(&operator.as_str()) {
            return Err(unsupported(format!("unsupported operator {operator} on field {field}")));
        }

        if matches!(operator.as_str(), "$in" | "$nin") && !matches!(argument, Bson::Array(_)) {
            return Err(unsupported(format!("{operator} on field {field} expects an array")));
        }
    }

    Ok(())
}

/// Returns the constraint as an operator document if its first key is an operator.
fn operator_document(value: &Bson) -> Option<&Document> {
    match value {
        Bson::Document(inner) if inner.keys().next().is_some_and(|k| k.starts_with('$')) => Some(inner),
        _ => None,
    }
}

fn matches_filter(filter: &Document, document: &Document) -> bool {
    filter.iter().all(|(key, constraint)| match (key.as_str(), constraint) {
        ("$and", Bson::Array(clauses)) => clauses.iter().all(|clause| {
            clause
                .as_document()
                .is_some_and(|clause| matches_filter(clause, document))
        }),
        ("$or", Bson::Array(clauses)) => clauses.iter().any(|clause| {
            clause
                .as_document()
                .is_some_and(|clause| matches_filter(clause, document))
        }),
        (path, constraint) => {
            let value = lookup(document, path);

            match operator_document(constraint) {
                Some(operators) => operators
                    .iter()
                    .all(|(operator, argument)| apply_operator(operator, value, argument)),
                None => equals(value, constraint),
            }
        }
    })
}

/// Equality with array fan-out: an array field matches when the whole array or any of
/// its elements equals the expected value. A missing field equals `null`.
fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    let expected = Comparable::from(expected);

    match value {
        None => expected == Comparable::Null,
        Some(Bson::Array(items)) => {
            let actual = items.iter().map(Comparable::from).collect::<Vec<_>>();

            actual.iter().any(|item| item == &expected) || Comparable::Array(actual) == expected
        }
        Some(value) => Comparable::from(value) == expected,
    }
}

fn compare(value: Option<&Bson>, argument: &Bson, accept: fn(Ordering) -> bool) -> bool {
    let argument = Comparable::from(argument);
    let test = |candidate: &Bson| {
        Comparable::from(candidate)
            .partial_cmp(&argument)
            .is_some_and(accept)
    };

    match value {
        None => false,
        Some(Bson::Array(items)) => items.iter().any(test),
        Some(value) => test(value),
    }
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(flag) => *flag,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

fn apply_operator(operator: &str, value: Option<&Bson>, argument: &Bson) -> bool {
    match operator {
        "$eq" => equals(value, argument),
        "$ne" => !equals(value, argument),
        "$gt" => compare(value, argument, |o| o == Ordering::Greater),
        "$gte" => compare(value, argument, |o| o != Ordering::Less),
        "$lt" => compare(value, argument, |o| o == Ordering::Less),
        "$lte" => compare(value, argument, |o| o != Ordering::Greater),
        "$in" => argument
            .as_array()
            .is_some_and(|candidates| candidates.iter().any(|c| equals(value, c))),
        "$nin" => !argument
            .as_array()
            .is_some_and(|candidates| candidates.iter().any(|c| equals(value, c))),
        "$exists" => value.is_some() == is_truthy(argument),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn matches(filter: Document, document: &Document) -> bool {
        DocumentMatcher::new(&filter).unwrap().matches(document)
    }

    fn profile() -> Document {
        doc! {
            "_id": ObjectId::parse_str("64b7f0c2a1b2c3d4e5f60718").unwrap(),
            "title": "Alex",
            "age": 31,
            "tags": ["admin", "ops"],
            "address": { "city": "Oslo", "zip": "0150" },
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches(doc! {}, &profile()));
    }

    #[test]
    fn equality_is_anded_and_normalizes_numbers() {
        assert!(matches(doc! { "title": "Alex", "age": 31.0 }, &profile()));
        assert!(!matches(doc! { "title": "Alex", "age": 30 }, &profile()));
    }

    #[test]
    fn equality_fans_out_over_arrays() {
        assert!(matches(doc! { "tags": "ops" }, &profile()));
        assert!(matches(doc! { "tags": ["admin", "ops"] }, &profile()));
        assert!(!matches(doc! { "tags": "dev" }, &profile()));
    }

    #[test]
    fn missing_field_equals_null() {
        assert!(matches(doc! { "nickname": Bson::Null }, &profile()));
        assert!(!matches(doc! { "title": Bson::Null }, &profile()));
    }

    #[test]
    fn dotted_paths_reach_nested_fields() {
        assert!(matches(doc! { "address.city": "Oslo" }, &profile()));
        assert!(matches(doc! { "tags.1": "ops" }, &profile()));
        assert!(!matches(doc! { "address.city.name": "Oslo" }, &profile()));
    }

    #[test]
    fn comparison_operators() {
        assert!(matches(doc! { "age": { "$gte": 18, "$lt": 65 } }, &profile()));
        assert!(!matches(doc! { "age": { "$gt": 31 } }, &profile()));
        assert!(matches(doc! { "title": { "$ne": "Sam" } }, &profile()));
        assert!(!matches(doc! { "title": { "$gt": 5 } }, &profile()));
    }

    #[test]
    fn membership_and_existence() {
        assert!(matches(doc! { "title": { "$in": ["Alex", "Sam"] } }, &profile()));
        assert!(matches(doc! { "tags": { "$nin": ["dev"] } }, &profile()));
        assert!(matches(doc! { "email": { "$exists": false } }, &profile()));
        assert!(!matches(doc! { "age": { "$exists": 0 } }, &profile()));
    }

    #[test]
    fn logical_operators() {
        assert!(matches(doc! { "$or": [{ "title": "Sam" }, { "age": 31 }] }, &profile()));
        assert!(!matches(doc! { "$and": [{ "title": "Alex" }, { "age": 99 }] }, &profile()));
    }

    #[test]
    fn identifiers_compare_by_value() {
        let id = ObjectId::parse_str("64b7f0c2a1b2c3d4e5f60718").unwrap();
        assert!(matches(doc! { "_id": id }, &profile()));
        assert!(!matches(doc! { "_id": ObjectId::new() }, &profile()));
    }

    #[test]
    fn unsupported_operators_are_rejected() {
        for filter in [
            doc! { "title": { "$regex": "^A" } },
            doc! { "$where": "this.age > 1" },
            doc! { "$or": {} },
            doc! { "tags": { "$in": "admin" } },
        ] {
            assert!(matches!(
                DocumentMatcher::new(&filter),
                Err(DocumentStoreError::Store(_))
            ));
        }
    }
}
