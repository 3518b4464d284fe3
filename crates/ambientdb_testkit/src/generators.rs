//! Property-based test generators using proptest.
//!
//! Documents draw their fields from a small fixed set so that generated
//! filters and updates actually hit generated documents.

use ambientdb_driver::{Document, Filter, Update, Value};
use proptest::prelude::*;

/// Field names used by the generated documents, filters and updates.
pub const FIELDS: [&str; 3] = ["a", "b", "c"];

/// Strategy for one of the shared field names.
pub fn field_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(FIELDS.to_vec()).prop_map(str::to_string)
}

/// Strategy for scalar values from a narrow domain.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-5i64..5).prop_map(Value::Integer),
        prop::string::string_regex("[a-c]{0,2}")
            .expect("Invalid regex")
            .prop_map(Value::Text),
    ]
}

/// Strategy for values, including small arrays and embedded documents.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(2, 8, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(Value::Array),
            prop::collection::btree_map(field_strategy(), inner, 0..3)
                .prop_map(|m| Value::Document(m.into_iter().collect())),
        ]
    })
}

/// Strategy for documents without an `_id`.
pub fn document_body_strategy() -> impl Strategy<Value = Document> {
    prop::collection::btree_map(field_strategy(), value_strategy(), 0..4)
        .prop_map(|fields| fields.into_iter().collect())
}

/// Strategy for a batch of documents with distinct integer `_id`s.
pub fn documents_strategy(max: usize) -> impl Strategy<Value = Vec<Document>> {
    prop::collection::vec(document_body_strategy(), 0..max).prop_map(|bodies| {
        bodies
            .into_iter()
            .enumerate()
            .map(|(i, mut doc)| {
                doc.insert(Document::ID_FIELD, i as i64);
                doc
            })
            .collect()
    })
}

/// Strategy for filters over the shared fields.
pub fn filter_strategy() -> impl Strategy<Value = Filter> {
    let leaf = prop_oneof![
        Just(Filter::All),
        (field_strategy(), scalar_strategy()).prop_map(|(f, v)| Filter::Eq(f, v)),
        (field_strategy(), scalar_strategy()).prop_map(|(f, v)| Filter::Ne(f, v)),
        (field_strategy(), (-5i64..5)).prop_map(|(f, v)| Filter::Gt(f, Value::Integer(v))),
        (field_strategy(), (-5i64..5)).prop_map(|(f, v)| Filter::Lte(f, Value::Integer(v))),
        (field_strategy(), any::<bool>()).prop_map(|(f, p)| Filter::Exists(f, p)),
    ];
    leaf.prop_recursive(2, 6, 2, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..3).prop_map(Filter::And),
            prop::collection::vec(inner.clone(), 1..3).prop_map(Filter::Or),
            inner.prop_map(Filter::negate),
        ]
    })
}

/// Strategy for non-empty updates over the shared fields.
pub fn update_strategy() -> impl Strategy<Value = Update> {
    let op = prop_oneof![
        (field_strategy(), scalar_strategy()).prop_map(|(f, v)| (0u8, f, v)),
        field_strategy().prop_map(|f| (1u8, f, Value::Null)),
    ];
    prop::collection::vec(op, 1..3).prop_map(|ops| {
        ops.into_iter()
            .fold(Update::new(), |update, (kind, field, value)| match kind {
                0 => update.set(field, value),
                _ => update.unset(field),
            })
    })
}
