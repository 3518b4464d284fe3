//! The driver capability surface.
//!
//! Every operation on [`Client`], [`Database`] and [`Collection`] exists as a
//! pair: a plain overload that runs outside any session, and a
//! `*_with_session` overload that runs bound to an explicit [`Session`]
//! (and therefore inside that session's transaction, if one is open).

use crate::error::DriverResult;
use crate::options::{SessionOptions, TransactionOptions};
use crate::query::{Filter, FindOneAndModifyOptions, FindOptions, Stage, Update, UpdateOptions};
use crate::results::{
    BulkWriteResult, DeleteResult, IndexModel, InsertManyResult, InsertOneResult, Namespace,
    UpdateResult, WriteModel,
};
use crate::value::{Document, Value};
use std::fmt;

/// Identifier of a driver session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Creates a session ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// A logical database session, optionally carrying an open transaction.
///
/// Sessions are shared between threads, so every method takes `&self`.
pub trait Session: Send + Sync + 'static {
    /// Returns the session identifier.
    fn id(&self) -> SessionId;

    /// Opens a transaction on this session.
    ///
    /// Fails if a transaction is already open or the session has ended.
    fn start_transaction(&self, options: &TransactionOptions) -> DriverResult<()>;

    /// Commits the open transaction.
    ///
    /// Fails if no transaction is open.
    fn commit_transaction(&self) -> DriverResult<()>;

    /// Aborts the open transaction, discarding its writes.
    ///
    /// Fails if no transaction is open.
    fn abort_transaction(&self) -> DriverResult<()>;

    /// Returns true while a transaction is open.
    fn in_transaction(&self) -> bool;

    /// Ends the session, aborting any open transaction.
    fn end_session(&self);
}

/// A connection to a deployment.
pub trait Client: Clone + Send + Sync + 'static {
    /// Session type produced by this client.
    type Session: Session;
    /// Database handle type.
    type Database: Database<Session = Self::Session>;

    /// Starts a new session.
    fn start_session(&self, options: &SessionOptions) -> DriverResult<Self::Session>;

    /// Returns a handle to the named database.
    fn database(&self, name: &str) -> Self::Database;

    /// Lists database names.
    fn list_database_names(&self) -> DriverResult<Vec<String>>;
    /// Lists database names, bound to a session.
    fn list_database_names_with_session(&self, session: &Self::Session)
        -> DriverResult<Vec<String>>;

    /// Drops a database.
    fn drop_database(&self, name: &str) -> DriverResult<()>;
    /// Drops a database, bound to a session.
    fn drop_database_with_session(&self, session: &Self::Session, name: &str) -> DriverResult<()>;
}

/// A database handle.
pub trait Database: Clone + Send + Sync + 'static {
    /// Session type accepted by this database.
    type Session: Session;
    /// Collection handle type.
    type Collection: Collection<Session = Self::Session>;

    /// Returns the database name.
    fn name(&self) -> &str;

    /// Returns a handle to the named collection.
    fn collection(&self, name: &str) -> Self::Collection;

    /// Lists collection names.
    fn list_collection_names(&self) -> DriverResult<Vec<String>>;
    /// Lists collection names, bound to a session.
    fn list_collection_names_with_session(
        &self,
        session: &Self::Session,
    ) -> DriverResult<Vec<String>>;

    /// Creates a collection.
    fn create_collection(&self, name: &str) -> DriverResult<()>;
    /// Creates a collection, bound to a session.
    fn create_collection_with_session(&self, session: &Self::Session, name: &str)
        -> DriverResult<()>;

    /// Drops a collection.
    fn drop_collection(&self, name: &str) -> DriverResult<()>;
    /// Drops a collection, bound to a session.
    fn drop_collection_with_session(&self, session: &Self::Session, name: &str) -> DriverResult<()>;

    /// Renames a collection.
    fn rename_collection(&self, from: &str, to: &str) -> DriverResult<()>;
    /// Renames a collection, bound to a session.
    fn rename_collection_with_session(
        &self,
        session: &Self::Session,
        from: &str,
        to: &str,
    ) -> DriverResult<()>;

    /// Drops this database and all of its collections.
    fn drop_database(&self) -> DriverResult<()>;
    /// Drops this database, bound to a session.
    fn drop_database_with_session(&self, session: &Self::Session) -> DriverResult<()>;
}

/// A collection handle.
pub trait Collection: Clone + Send + Sync + 'static {
    /// Session type accepted by this collection.
    type Session: Session;

    /// Returns the collection namespace.
    fn namespace(&self) -> Namespace;

    /// Returns a narrowed view: reads, updates and deletes are restricted to
    /// documents that also match `filter`.
    #[must_use]
    fn with_filter(&self, filter: Filter) -> Self;

    /// Inserts one document.
    fn insert_one(&self, document: Document) -> DriverResult<InsertOneResult>;
    /// Inserts one document, bound to a session.
    fn insert_one_with_session(
        &self,
        session: &Self::Session,
        document: Document,
    ) -> DriverResult<InsertOneResult>;

    /// Inserts documents in order, stopping at the first failure.
    fn insert_many(&self, documents: Vec<Document>) -> DriverResult<InsertManyResult>;
    /// Inserts documents, bound to a session.
    fn insert_many_with_session(
        &self,
        session: &Self::Session,
        documents: Vec<Document>,
    ) -> DriverResult<InsertManyResult>;

    /// Finds the first matching document.
    fn find_one(&self, filter: Filter, options: FindOptions) -> DriverResult<Option<Document>>;
    /// Finds the first matching document, bound to a session.
    fn find_one_with_session(
        &self,
        session: &Self::Session,
        filter: Filter,
        options: FindOptions,
    ) -> DriverResult<Option<Document>>;

    /// Finds all matching documents.
    fn find(&self, filter: Filter, options: FindOptions) -> DriverResult<Vec<Document>>;
    /// Finds all matching documents, bound to a session.
    fn find_with_session(
        &self,
        session: &Self::Session,
        filter: Filter,
        options: FindOptions,
    ) -> DriverResult<Vec<Document>>;

    /// Counts matching documents.
    fn count_documents(&self, filter: Filter) -> DriverResult<u64>;
    /// Counts matching documents, bound to a session.
    fn count_documents_with_session(&self, session: &Self::Session, filter: Filter)
        -> DriverResult<u64>;

    /// Distinct values of a field among matching documents.
    fn distinct(&self, field: &str, filter: Filter) -> DriverResult<Vec<Value>>;
    /// Distinct values of a field, bound to a session.
    fn distinct_with_session(
        &self,
        session: &Self::Session,
        field: &str,
        filter: Filter,
    ) -> DriverResult<Vec<Value>>;

    /// Replaces the first matching document.
    fn replace_one(
        &self,
        filter: Filter,
        replacement: Document,
        options: UpdateOptions,
    ) -> DriverResult<UpdateResult>;
    /// Replaces the first matching document, bound to a session.
    fn replace_one_with_session(
        &self,
        session: &Self::Session,
        filter: Filter,
        replacement: Document,
        options: UpdateOptions,
    ) -> DriverResult<UpdateResult>;

    /// Updates the first matching document.
    fn update_one(
        &self,
        filter: Filter,
        update: Update,
        options: UpdateOptions,
    ) -> DriverResult<UpdateResult>;
    /// Updates the first matching document, bound to a session.
    fn update_one_with_session(
        &self,
        session: &Self::Session,
        filter: Filter,
        update: Update,
        options: UpdateOptions,
    ) -> DriverResult<UpdateResult>;

    /// Updates every matching document.
    fn update_many(
        &self,
        filter: Filter,
        update: Update,
        options: UpdateOptions,
    ) -> DriverResult<UpdateResult>;
    /// Updates every matching document, bound to a session.
    fn update_many_with_session(
        &self,
        session: &Self::Session,
        filter: Filter,
        update: Update,
        options: UpdateOptions,
    ) -> DriverResult<UpdateResult>;

    /// Deletes the first matching document.
    fn delete_one(&self, filter: Filter) -> DriverResult<DeleteResult>;
    /// Deletes the first matching document, bound to a session.
    fn delete_one_with_session(&self, session: &Self::Session, filter: Filter)
        -> DriverResult<DeleteResult>;

    /// Deletes every matching document.
    fn delete_many(&self, filter: Filter) -> DriverResult<DeleteResult>;
    /// Deletes every matching document, bound to a session.
    fn delete_many_with_session(
        &self,
        session: &Self::Session,
        filter: Filter,
    ) -> DriverResult<DeleteResult>;

    /// Atomically updates one document and returns it.
    fn find_one_and_update(
        &self,
        filter: Filter,
        update: Update,
        options: FindOneAndModifyOptions,
    ) -> DriverResult<Option<Document>>;
    /// Atomically updates one document and returns it, bound to a session.
    fn find_one_and_update_with_session(
        &self,
        session: &Self::Session,
        filter: Filter,
        update: Update,
        options: FindOneAndModifyOptions,
    ) -> DriverResult<Option<Document>>;

    /// Atomically replaces one document and returns it.
    fn find_one_and_replace(
        &self,
        filter: Filter,
        replacement: Document,
        options: FindOneAndModifyOptions,
    ) -> DriverResult<Option<Document>>;
    /// Atomically replaces one document and returns it, bound to a session.
    fn find_one_and_replace_with_session(
        &self,
        session: &Self::Session,
        filter: Filter,
        replacement: Document,
        options: FindOneAndModifyOptions,
    ) -> DriverResult<Option<Document>>;

    /// Atomically deletes one document and returns it.
    fn find_one_and_delete(
        &self,
        filter: Filter,
        options: FindOneAndModifyOptions,
    ) -> DriverResult<Option<Document>>;
    /// Atomically deletes one document and returns it, bound to a session.
    fn find_one_and_delete_with_session(
        &self,
        session: &Self::Session,
        filter: Filter,
        options: FindOneAndModifyOptions,
    ) -> DriverResult<Option<Document>>;

    /// Runs an aggregation pipeline.
    fn aggregate(&self, pipeline: Vec<Stage>) -> DriverResult<Vec<Document>>;
    /// Runs an aggregation pipeline, bound to a session.
    fn aggregate_with_session(
        &self,
        session: &Self::Session,
        pipeline: Vec<Stage>,
    ) -> DriverResult<Vec<Document>>;

    /// Executes a batch of writes in order, stopping at the first failure.
    fn bulk_write(&self, models: Vec<WriteModel>) -> DriverResult<BulkWriteResult>;
    /// Executes a batch of writes, bound to a session.
    fn bulk_write_with_session(
        &self,
        session: &Self::Session,
        models: Vec<WriteModel>,
    ) -> DriverResult<BulkWriteResult>;

    /// Creates an index and returns its name.
    fn create_index(&self, index: IndexModel) -> DriverResult<String>;
    /// Creates an index, bound to a session.
    fn create_index_with_session(
        &self,
        session: &Self::Session,
        index: IndexModel,
    ) -> DriverResult<String>;

    /// Drops an index by name.
    fn drop_index(&self, name: &str) -> DriverResult<()>;
    /// Drops an index, bound to a session.
    fn drop_index_with_session(&self, session: &Self::Session, name: &str) -> DriverResult<()>;

    /// Lists the collection's indexes, including `_id_`.
    fn list_indexes(&self) -> DriverResult<Vec<IndexModel>>;
    /// Lists indexes, bound to a session.
    fn list_indexes_with_session(&self, session: &Self::Session) -> DriverResult<Vec<IndexModel>>;
}
