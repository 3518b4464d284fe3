//! Operation results, write models, index models and namespaces.

use crate::query::{Filter, SortOrder, Update};
use crate::value::{Document, Value};
use std::fmt;

/// A `database.collection` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Namespace {
    /// Database name.
    pub database: String,
    /// Collection name.
    pub collection: String,
}

impl Namespace {
    /// Creates a namespace.
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Result of `insert_one`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOneResult {
    /// `_id` of the inserted document.
    pub inserted_id: Value,
}

/// Result of `insert_many`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertManyResult {
    /// `_id`s of the inserted documents, in input order.
    pub inserted_ids: Vec<Value>,
}

/// Result of update and replace operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResult {
    /// Number of documents matched by the filter.
    pub matched_count: u64,
    /// Number of documents actually changed.
    pub modified_count: u64,
    /// `_id` of the upserted document, if an upsert happened.
    pub upserted_id: Option<Value>,
}

/// Result of delete operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteResult {
    /// Number of documents deleted.
    pub deleted_count: u64,
}

/// Result of `bulk_write`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkWriteResult {
    /// Documents inserted.
    pub inserted_count: u64,
    /// Documents matched by update/replace models.
    pub matched_count: u64,
    /// Documents changed by update/replace models.
    pub modified_count: u64,
    /// Documents deleted.
    pub deleted_count: u64,
    /// `_id`s created by upserts.
    pub upserted_ids: Vec<Value>,
}

impl BulkWriteResult {
    pub(crate) fn absorb_update(&mut self, result: UpdateResult) {
        self.matched_count += result.matched_count;
        self.modified_count += result.modified_count;
        self.upserted_ids.extend(result.upserted_id);
    }
}

/// One write in a `bulk_write` batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteModel {
    /// Insert a document.
    InsertOne {
        /// Document to insert.
        document: Document,
    },
    /// Update the first matching document.
    UpdateOne {
        /// Selection filter.
        filter: Filter,
        /// Update to apply.
        update: Update,
        /// Insert when nothing matches.
        upsert: bool,
    },
    /// Update every matching document.
    UpdateMany {
        /// Selection filter.
        filter: Filter,
        /// Update to apply.
        update: Update,
        /// Insert when nothing matches.
        upsert: bool,
    },
    /// Replace the first matching document.
    ReplaceOne {
        /// Selection filter.
        filter: Filter,
        /// Replacement document.
        replacement: Document,
        /// Insert when nothing matches.
        upsert: bool,
    },
    /// Delete the first matching document.
    DeleteOne {
        /// Selection filter.
        filter: Filter,
    },
    /// Delete every matching document.
    DeleteMany {
        /// Selection filter.
        filter: Filter,
    },
}

/// Description of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexModel {
    /// Index name; derived from the keys when `None`.
    pub name: Option<String>,
    /// Indexed fields and their directions.
    pub keys: Vec<(String, SortOrder)>,
    /// Whether the index rejects duplicate keys.
    pub unique: bool,
}

impl IndexModel {
    /// Name of the implicit `_id` index.
    pub const ID_INDEX: &'static str = "_id_";

    /// Creates an index over the given keys.
    pub fn new<S: Into<String>>(keys: impl IntoIterator<Item = (S, SortOrder)>) -> Self {
        Self {
            name: None,
            keys: keys.into_iter().map(|(k, o)| (k.into(), o)).collect(),
            unique: false,
        }
    }

    /// Sets the index name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Marks the index unique.
    #[must_use]
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// The explicit name, or one derived from the keys (`field_1`, `field_-1`).
    pub fn resolved_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.keys
            .iter()
            .map(|(field, order)| match order {
                SortOrder::Ascending => format!("{field}_1"),
                SortOrder::Descending => format!("{field}_-1"),
            })
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Extracts this index's key from a document (missing fields are `Null`).
    pub fn key_of(&self, doc: &Document) -> Vec<Value> {
        self.keys
            .iter()
            .map(|(field, _)| doc.get_path(field).cloned().unwrap_or(Value::Null))
            .collect()
    }

    pub(crate) fn id_index() -> Self {
        Self::new([(Document::ID_FIELD, SortOrder::Ascending)])
            .named(Self::ID_INDEX)
            .unique(true)
    }
}
