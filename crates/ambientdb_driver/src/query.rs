//! Filters, updates, aggregation stages and operation options.
//!
//! Queries are plain Rust values rather than a textual language. A [`Filter`]
//! is evaluated against documents with [`Filter::matches`], an [`Update`]
//! mutates a document in place with [`Update::apply`], and a pipeline of
//! [`Stage`]s is evaluated with [`run_pipeline`].

use crate::error::{DriverError, DriverResult};
use crate::value::{Document, Value};
use std::cmp::Ordering;

/// A predicate over documents.
///
/// Field names are dotted paths. Equality against an array field matches if
/// any element equals the operand. Range operators only match values of the
/// same kind.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Filter {
    /// Matches every document.
    #[default]
    All,
    /// Field equals value (a missing field equals `Null`).
    Eq(String, Value),
    /// Field does not equal value.
    Ne(String, Value),
    /// Field is greater than value.
    Gt(String, Value),
    /// Field is greater than or equal to value.
    Gte(String, Value),
    /// Field is less than value.
    Lt(String, Value),
    /// Field is less than or equal to value.
    Lte(String, Value),
    /// Field equals one of the values.
    In(String, Vec<Value>),
    /// Field presence.
    Exists(String, bool),
    /// All sub-filters match.
    And(Vec<Filter>),
    /// At least one sub-filter matches.
    Or(Vec<Filter>),
    /// The sub-filter does not match.
    Not(Box<Filter>),
}

impl Filter {
    /// `field == value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    /// `field != value`.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne(field.into(), value.into())
    }

    /// `field > value`.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt(field.into(), value.into())
    }

    /// `field >= value`.
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gte(field.into(), value.into())
    }

    /// `field < value`.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt(field.into(), value.into())
    }

    /// `field <= value`.
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lte(field.into(), value.into())
    }

    /// `field in values`.
    pub fn is_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    /// Field presence test.
    pub fn exists(field: impl Into<String>, present: bool) -> Self {
        Self::Exists(field.into(), present)
    }

    /// Filter on the `_id` field.
    pub fn id(value: impl Into<Value>) -> Self {
        Self::eq(Document::ID_FIELD, value)
    }

    /// Conjunction of two filters, flattening nested conjunctions.
    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::All, f) | (f, Filter::All) => f,
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), f) => {
                left.push(f);
                Filter::And(left)
            }
            (f, Filter::And(mut right)) => {
                right.insert(0, f);
                Filter::And(right)
            }
            (a, b) => Filter::And(vec![a, b]),
        }
    }

    /// Disjunction of two filters.
    #[must_use]
    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut items) => {
                items.push(other);
                Filter::Or(items)
            }
            f => Filter::Or(vec![f, other]),
        }
    }

    /// Negation.
    #[must_use]
    pub fn negate(self) -> Self {
        Filter::Not(Box::new(self))
    }

    /// Evaluates the filter against a document.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => field_equals(doc, field, value),
            Filter::Ne(field, value) => !field_equals(doc, field, value),
            Filter::Gt(field, value) => field_compares(doc, field, value, |o| o == Ordering::Greater),
            Filter::Gte(field, value) => field_compares(doc, field, value, |o| o != Ordering::Less),
            Filter::Lt(field, value) => field_compares(doc, field, value, |o| o == Ordering::Less),
            Filter::Lte(field, value) => {
                field_compares(doc, field, value, |o| o != Ordering::Greater)
            }
            Filter::In(field, values) => values.iter().any(|v| field_equals(doc, field, v)),
            Filter::Exists(field, present) => doc.get_path(field).is_some() == *present,
            Filter::And(items) => items.iter().all(|f| f.matches(doc)),
            Filter::Or(items) => items.iter().any(|f| f.matches(doc)),
            Filter::Not(inner) => !inner.matches(doc),
        }
    }

    /// Builds the seed document for an upsert from top-level equality terms.
    pub fn equality_seed(&self) -> Document {
        let mut seed = Document::new();
        self.collect_equalities(&mut seed);
        seed
    }

    fn collect_equalities(&self, seed: &mut Document) {
        match self {
            Filter::Eq(field, value) => {
                // Conflicting paths are skipped; the update decides the final shape.
                let _ = seed.set_path(field, value.clone());
            }
            Filter::And(items) => items.iter().for_each(|f| f.collect_equalities(seed)),
            _ => {}
        }
    }
}

fn field_equals(doc: &Document, field: &str, value: &Value) -> bool {
    match doc.get_path(field) {
        None => value.is_null(),
        Some(found) if found == value => true,
        Some(Value::Array(items)) => items.contains(value),
        Some(_) => false,
    }
}

fn field_compares(
    doc: &Document,
    field: &str,
    value: &Value,
    accept: impl Fn(Ordering) -> bool,
) -> bool {
    match doc.get_path(field) {
        None => false,
        Some(Value::Array(items)) if !matches!(value, Value::Array(_)) => items
            .iter()
            .any(|item| item.compare(value).is_some_and(&accept)),
        Some(found) => found.compare(value).is_some_and(accept),
    }
}

/// A single update operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOp {
    /// Set a field.
    Set(String, Value),
    /// Remove a field.
    Unset(String),
    /// Add to an integer field (missing fields start at zero).
    Inc(String, i64),
    /// Append to an array field (missing fields become a one-element array).
    Push(String, Value),
}

/// An ordered list of update operators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Update(Vec<UpdateOp>);

impl Update {
    /// Creates an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `Set` operator.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push(UpdateOp::Set(field.into(), value.into()));
        self
    }

    /// Adds an `Unset` operator.
    #[must_use]
    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.0.push(UpdateOp::Unset(field.into()));
        self
    }

    /// Adds an `Inc` operator.
    #[must_use]
    pub fn inc(mut self, field: impl Into<String>, by: i64) -> Self {
        self.0.push(UpdateOp::Inc(field.into(), by));
        self
    }

    /// Adds a `Push` operator.
    #[must_use]
    pub fn push(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push(UpdateOp::Push(field.into(), value.into()));
        self
    }

    /// Returns the operators.
    pub fn ops(&self) -> &[UpdateOp] {
        &self.0
    }

    /// Returns true if the update has no operators.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Applies the operators in order.
    ///
    /// The `_id` field is immutable: setting it to a different value or
    /// unsetting it fails.
    pub fn apply(&self, doc: &mut Document) -> DriverResult<()> {
        for op in &self.0 {
            match op {
                UpdateOp::Set(field, value) => {
                    if field == Document::ID_FIELD && doc.id().is_some_and(|id| id != value) {
                        return Err(DriverError::invalid_update("_id is immutable"));
                    }
                    doc.set_path(field, value.clone())?;
                }
                UpdateOp::Unset(field) => {
                    if field == Document::ID_FIELD {
                        return Err(DriverError::invalid_update("_id is immutable"));
                    }
                    doc.remove_path(field);
                }
                UpdateOp::Inc(field, by) => match doc.get_path_mut(field) {
                    Some(Value::Integer(n)) => {
                        *n = n.checked_add(*by).ok_or_else(|| {
                            DriverError::invalid_update(format!("integer overflow on '{field}'"))
                        })?;
                    }
                    Some(_) => {
                        return Err(DriverError::invalid_update(format!(
                            "cannot increment non-integer field '{field}'"
                        )))
                    }
                    None => doc.set_path(field, Value::Integer(*by))?,
                },
                UpdateOp::Push(field, value) => match doc.get_path_mut(field) {
                    Some(Value::Array(items)) => items.push(value.clone()),
                    Some(_) => {
                        return Err(DriverError::invalid_update(format!(
                            "cannot push to non-array field '{field}'"
                        )))
                    }
                    None => doc.set_path(field, Value::Array(vec![value.clone()]))?,
                },
            }
        }
        Ok(())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortOrder {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// A stage of an aggregation pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Keep documents matching the filter.
    Match(Filter),
    /// Sort by the given keys.
    Sort(Vec<(String, SortOrder)>),
    /// Skip the first n documents.
    Skip(usize),
    /// Keep at most n documents.
    Limit(usize),
    /// Keep `_id` plus the listed fields.
    Project(Vec<String>),
    /// Replace the stream with a single `{ field: count }` document.
    Count(String),
}

/// Options for `find` and `find_one`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Sort keys.
    pub sort: Vec<(String, SortOrder)>,
    /// Number of documents to skip.
    pub skip: Option<usize>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Fields to return (plus `_id`); all fields when `None`.
    pub projection: Option<Vec<String>>,
}

impl FindOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sort key.
    #[must_use]
    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push((field.into(), order));
        self
    }

    /// Sets the skip count.
    #[must_use]
    pub fn skip(mut self, n: usize) -> Self {
        self.skip = Some(n);
        self
    }

    /// Sets the limit.
    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Sets the projection.
    #[must_use]
    pub fn projection<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// Options for update and replace operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert a new document when nothing matches.
    pub upsert: bool,
}

impl UpdateOptions {
    /// Options with upsert enabled.
    #[must_use]
    pub fn upsert() -> Self {
        Self { upsert: true }
    }
}

/// Which version of the document a find-and-modify returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnDocument {
    /// The document as it was before modification.
    #[default]
    Before,
    /// The document as it is after modification.
    After,
}

/// Options for `find_one_and_*` operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOneAndModifyOptions {
    /// Sort used to pick the document when several match.
    pub sort: Vec<(String, SortOrder)>,
    /// Insert a new document when nothing matches (ignored for delete).
    pub upsert: bool,
    /// Which version to return.
    pub return_document: ReturnDocument,
}

impl FindOneAndModifyOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sort key.
    #[must_use]
    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push((field.into(), order));
        self
    }

    /// Enables upsert.
    #[must_use]
    pub fn upsert(mut self, value: bool) -> Self {
        self.upsert = value;
        self
    }

    /// Sets which version to return.
    #[must_use]
    pub fn return_document(mut self, which: ReturnDocument) -> Self {
        self.return_document = which;
        self
    }
}

pub(crate) fn sort_documents(docs: &mut [Document], keys: &[(String, SortOrder)]) {
    if keys.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for (field, order) in keys {
            let left = a.get_path(field).unwrap_or(&Value::Null);
            let right = b.get_path(field).unwrap_or(&Value::Null);
            let ord = match order {
                SortOrder::Ascending => left.cmp(right),
                SortOrder::Descending => right.cmp(left),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn project(doc: &Document, fields: &[String]) -> Document {
    let mut out = Document::new();
    if let Some(id) = doc.id() {
        out.insert(Document::ID_FIELD, id.clone());
    }
    for field in fields {
        if let Some(value) = doc.get_path(field) {
            // Projected paths are copied from an existing document, so every
            // intermediate is a document and set_path cannot fail.
            let _ = out.set_path(field, value.clone());
        }
    }
    out
}

/// Applies sort, skip, limit and projection to a result set.
pub fn apply_find_options(mut docs: Vec<Document>, options: &FindOptions) -> Vec<Document> {
    sort_documents(&mut docs, &options.sort);
    let iter = docs.into_iter().skip(options.skip.unwrap_or(0));
    let limited: Vec<Document> = match options.limit {
        Some(n) => iter.take(n).collect(),
        None => iter.collect(),
    };
    match &options.projection {
        Some(fields) => limited.iter().map(|d| project(d, fields)).collect(),
        None => limited,
    }
}

/// Evaluates an aggregation pipeline over a document stream.
pub fn run_pipeline(mut docs: Vec<Document>, pipeline: &[Stage]) -> Vec<Document> {
    for stage in pipeline {
        docs = match stage {
            Stage::Match(filter) => docs.into_iter().filter(|d| filter.matches(d)).collect(),
            Stage::Sort(keys) => {
                sort_documents(&mut docs, keys);
                docs
            }
            Stage::Skip(n) => docs.into_iter().skip(*n).collect(),
            Stage::Limit(n) => docs.into_iter().take(*n).collect(),
            Stage::Project(fields) => docs.iter().map(|d| project(d, fields)).collect(),
            Stage::Count(field) => {
                let count = i64::try_from(docs.len()).unwrap_or(i64::MAX);
                let mut out = Document::new();
                out.insert(field.clone(), count);
                vec![out]
            }
        };
    }
    docs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use proptest::prelude::*;

    fn people() -> Vec<Document> {
        vec![
            doc! { "_id": 1, "name": "Ann", "age": 31, "tags": vec![Value::from("a"), Value::from("b")] },
            doc! { "_id": 2, "name": "Bob", "age": 25 },
            doc! { "_id": 3, "name": "Cyd", "age": 40, "address": doc! { "city": "Oslo" } },
        ]
    }

    #[test]
    fn eq_matches_missing_as_null() {
        let d = doc! { "_id": 1 };
        assert!(Filter::eq("missing", Value::Null).matches(&d));
        assert!(!Filter::eq("missing", 1).matches(&d));
    }

    #[test]
    fn eq_matches_array_elements() {
        let docs = people();
        assert!(Filter::eq("tags", "b").matches(&docs[0]));
        assert!(!Filter::eq("tags", "z").matches(&docs[0]));
    }

    #[test]
    fn range_and_dotted_paths() {
        let docs = people();
        let adults: Vec<_> = docs
            .iter()
            .filter(|d| Filter::gte("age", 30).matches(d))
            .collect();
        assert_eq!(adults.len(), 2);
        assert!(Filter::eq("address.city", "Oslo").matches(&docs[2]));
        assert!(!Filter::gt("name", 1).matches(&docs[0]));
    }

    #[test]
    fn and_flattens() {
        let f = Filter::eq("a", 1).and(Filter::eq("b", 2)).and(Filter::eq("c", 3));
        match f {
            Filter::And(items) => assert_eq!(items.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
        assert_eq!(Filter::All.and(Filter::eq("a", 1)), Filter::eq("a", 1));
    }

    #[test]
    fn in_or_not_exists() {
        let docs = people();
        let f = Filter::is_in("name", ["Ann", "Cyd"]);
        assert_eq!(docs.iter().filter(|d| f.matches(d)).count(), 2);
        let f = Filter::exists("address", true).or(Filter::eq("_id", 2));
        assert_eq!(docs.iter().filter(|d| f.matches(d)).count(), 2);
        let f = Filter::exists("address", true).negate();
        assert_eq!(docs.iter().filter(|d| f.matches(d)).count(), 2);
    }

    #[test]
    fn update_operators() {
        let mut d = doc! { "_id": 1, "n": 1, "tags": Vec::<Value>::new() };
        Update::new()
            .inc("n", 4)
            .set("profile.name", "Ann")
            .push("tags", "x")
            .push("fresh", 1)
            .unset("missing")
            .apply(&mut d)
            .unwrap();
        assert_eq!(d.get("n"), Some(&Value::Integer(5)));
        assert_eq!(d.get_path("profile.name"), Some(&Value::from("Ann")));
        assert_eq!(d.get_path("tags.0"), Some(&Value::from("x")));
        assert_eq!(d.get_path("fresh.0"), Some(&Value::Integer(1)));
    }

    #[test]
    fn update_rejects_id_change_and_bad_types() {
        let mut d = doc! { "_id": 1, "name": "Ann" };
        assert!(Update::new().set("_id", 2).apply(&mut d).is_err());
        assert!(Update::new().set("_id", 1).apply(&mut d).is_ok());
        assert!(Update::new().unset("_id").apply(&mut d).is_err());
        assert!(Update::new().inc("name", 1).apply(&mut d).is_err());
        assert!(Update::new().push("name", 1).apply(&mut d).is_err());
    }

    #[test]
    fn equality_seed_uses_top_level_terms() {
        let f = Filter::eq("sku", "A1").and(Filter::gt("qty", 3)).and(Filter::eq("meta.kind", "x"));
        let seed = f.equality_seed();
        assert_eq!(seed.get("sku"), Some(&Value::from("A1")));
        assert_eq!(seed.get_path("meta.kind"), Some(&Value::from("x")));
        assert!(seed.get("qty").is_none());
    }

    #[test]
    fn find_options_sort_skip_limit_project() {
        let options = FindOptions::new()
            .sort("age", SortOrder::Descending)
            .skip(1)
            .limit(1)
            .projection(["name"]);
        let out = apply_find_options(people(), &options);
        assert_eq!(out, vec![doc! { "_id": 1, "name": "Ann" }]);
    }

    #[test]
    fn pipeline_match_then_count() {
        let out = run_pipeline(
            people(),
            &[Stage::Match(Filter::lt("age", 35)), Stage::Count("n".into())],
        );
        assert_eq!(out, vec![doc! { "n": 2 }]);
    }

    proptest! {
        #[test]
        fn negation_is_complement(age in -50i64..50, bound in -50i64..50) {
            let d = doc! { "age": age };
            let f = Filter::gt("age", bound);
            prop_assert_ne!(f.matches(&d), f.clone().negate().matches(&d));
        }

        #[test]
        fn limit_never_exceeds(n in 0usize..10) {
            let out = apply_find_options(people(), &FindOptions::new().limit(n));
            prop_assert!(out.len() <= n);
        }
    }
}
