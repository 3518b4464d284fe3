//! Collection facade.

use super::binding::SessionBinding;
use crate::error::TxResult;
use crate::registry::SessionRegistry;
use crate::scope::Ambient;
use ambientdb_driver::{
    BulkWriteResult, Collection, DeleteResult, Document, Filter, FindOneAndModifyOptions,
    FindOptions, IndexModel, InsertManyResult, InsertOneResult, Namespace, Stage, Update,
    UpdateOptions, UpdateResult, Value, WriteModel,
};
use std::fmt;
use std::sync::Arc;

/// A collection whose operations join the ambient transaction.
///
/// Every operation takes the caller's [`Ambient`] context first. Outside a
/// transaction the call goes straight to the driver; inside one it runs on
/// the transaction's session.
pub struct TxCollection<T: Collection> {
    inner: T,
    binding: SessionBinding<T::Session>,
}

impl<T: Collection> TxCollection<T> {
    /// Wraps a collection, resolving sessions through `registry`.
    pub fn new(collection: T, registry: Arc<SessionRegistry<T::Session>>) -> Self {
        Self::from_parts(collection, SessionBinding::Ambient(registry))
    }

    /// Wraps a collection pinned to an explicit session.
    pub fn pinned(collection: T, session: impl Into<Arc<T::Session>>) -> Self {
        Self::from_parts(collection, SessionBinding::Pinned(session.into()))
    }

    pub(crate) fn from_parts(inner: T, binding: SessionBinding<T::Session>) -> Self {
        Self { inner, binding }
    }

    /// The wrapped collection.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// How this facade selects sessions.
    pub fn binding(&self) -> &SessionBinding<T::Session> {
        &self.binding
    }

    /// The pinned session.
    ///
    /// # Errors
    ///
    /// `NotPinned` if the facade was not constructed with a session.
    pub fn pinned_session(&self) -> TxResult<&Arc<T::Session>> {
        self.binding.pinned_session()
    }

    /// The collection namespace.
    pub fn namespace(&self) -> Namespace {
        self.inner.namespace()
    }

    /// A narrowed view sharing this facade's session binding.
    #[must_use]
    pub fn with_filter(&self, filter: Filter) -> Self {
        Self::from_parts(self.inner.with_filter(filter), self.binding.clone())
    }

    /// Inserts one document.
    pub fn insert_one(&self, cx: &Ambient, document: Document) -> TxResult<InsertOneResult> {
        self.binding.run(
            cx,
            document,
            |doc| self.inner.insert_one(doc),
            |s, doc| self.inner.insert_one_with_session(s, doc),
        )
    }

    /// Inserts documents in order.
    pub fn insert_many(&self, cx: &Ambient, documents: Vec<Document>) -> TxResult<InsertManyResult> {
        self.binding.run(
            cx,
            documents,
            |docs| self.inner.insert_many(docs),
            |s, docs| self.inner.insert_many_with_session(s, docs),
        )
    }

    /// Finds the first matching document.
    pub fn find_one(
        &self,
        cx: &Ambient,
        filter: Filter,
        options: FindOptions,
    ) -> TxResult<Option<Document>> {
        self.binding.run(
            cx,
            (filter, options),
            |(f, o)| self.inner.find_one(f, o),
            |s, (f, o)| self.inner.find_one_with_session(s, f, o),
        )
    }

    /// Finds all matching documents.
    pub fn find(&self, cx: &Ambient, filter: Filter, options: FindOptions) -> TxResult<Vec<Document>> {
        self.binding.run(
            cx,
            (filter, options),
            |(f, o)| self.inner.find(f, o),
            |s, (f, o)| self.inner.find_with_session(s, f, o),
        )
    }

    /// Counts matching documents.
    pub fn count_documents(&self, cx: &Ambient, filter: Filter) -> TxResult<u64> {
        self.binding.run(
            cx,
            filter,
            |f| self.inner.count_documents(f),
            |s, f| self.inner.count_documents_with_session(s, f),
        )
    }

    /// Distinct values of a field among matching documents.
    pub fn distinct(&self, cx: &Ambient, field: &str, filter: Filter) -> TxResult<Vec<Value>> {
        self.binding.run(
            cx,
            filter,
            |f| self.inner.distinct(field, f),
            |s, f| self.inner.distinct_with_session(s, field, f),
        )
    }

    /// Replaces the first matching document.
    pub fn replace_one(
        &self,
        cx: &Ambient,
        filter: Filter,
        replacement: Document,
        options: UpdateOptions,
    ) -> TxResult<UpdateResult> {
        self.binding.run(
            cx,
            (filter, replacement, options),
            |(f, r, o)| self.inner.replace_one(f, r, o),
            |s, (f, r, o)| self.inner.replace_one_with_session(s, f, r, o),
        )
    }

    /// Updates the first matching document.
    pub fn update_one(
        &self,
        cx: &Ambient,
        filter: Filter,
        update: Update,
        options: UpdateOptions,
    ) -> TxResult<UpdateResult> {
        self.binding.run(
            cx,
            (filter, update, options),
            |(f, u, o)| self.inner.update_one(f, u, o),
            |s, (f, u, o)| self.inner.update_one_with_session(s, f, u, o),
        )
    }

    /// Updates every matching document.
    pub fn update_many(
        &self,
        cx: &Ambient,
        filter: Filter,
        update: Update,
        options: UpdateOptions,
    ) -> TxResult<UpdateResult> {
        self.binding.run(
            cx,
            (filter, update, options),
            |(f, u, o)| self.inner.update_many(f, u, o),
            |s, (f, u, o)| self.inner.update_many_with_session(s, f, u, o),
        )
    }

    /// Deletes the first matching document.
    pub fn delete_one(&self, cx: &Ambient, filter: Filter) -> TxResult<DeleteResult> {
        self.binding.run(
            cx,
            filter,
            |f| self.inner.delete_one(f),
            |s, f| self.inner.delete_one_with_session(s, f),
        )
    }

    /// Deletes every matching document.
    pub fn delete_many(&self, cx: &Ambient, filter: Filter) -> TxResult<DeleteResult> {
        self.binding.run(
            cx,
            filter,
            |f| self.inner.delete_many(f),
            |s, f| self.inner.delete_many_with_session(s, f),
        )
    }

    /// Atomically updates one document and returns it.
    pub fn find_one_and_update(
        &self,
        cx: &Ambient,
        filter: Filter,
        update: Update,
        options: FindOneAndModifyOptions,
    ) -> TxResult<Option<Document>> {
        self.binding.run(
            cx,
            (filter, update, options),
            |(f, u, o)| self.inner.find_one_and_update(f, u, o),
            |s, (f, u, o)| self.inner.find_one_and_update_with_session(s, f, u, o),
        )
    }

    /// Atomically replaces one document and returns it.
    pub fn find_one_and_replace(
        &self,
        cx: &Ambient,
        filter: Filter,
        replacement: Document,
        options: FindOneAndModifyOptions,
    ) -> TxResult<Option<Document>> {
        self.binding.run(
            cx,
            (filter, replacement, options),
            |(f, r, o)| self.inner.find_one_and_replace(f, r, o),
            |s, (f, r, o)| self.inner.find_one_and_replace_with_session(s, f, r, o),
        )
    }

    /// Atomically deletes one document and returns it.
    pub fn find_one_and_delete(
        &self,
        cx: &Ambient,
        filter: Filter,
        options: FindOneAndModifyOptions,
    ) -> TxResult<Option<Document>> {
        self.binding.run(
            cx,
            (filter, options),
            |(f, o)| self.inner.find_one_and_delete(f, o),
            |s, (f, o)| self.inner.find_one_and_delete_with_session(s, f, o),
        )
    }

    /// Runs an aggregation pipeline.
    pub fn aggregate(&self, cx: &Ambient, pipeline: Vec<Stage>) -> TxResult<Vec<Document>> {
        self.binding.run(
            cx,
            pipeline,
            |p| self.inner.aggregate(p),
            |s, p| self.inner.aggregate_with_session(s, p),
        )
    }

    /// Executes a batch of writes in order.
    pub fn bulk_write(&self, cx: &Ambient, models: Vec<WriteModel>) -> TxResult<BulkWriteResult> {
        self.binding.run(
            cx,
            models,
            |m| self.inner.bulk_write(m),
            |s, m| self.inner.bulk_write_with_session(s, m),
        )
    }

    /// Creates an index and returns its name.
    pub fn create_index(&self, cx: &Ambient, index: IndexModel) -> TxResult<String> {
        self.binding.run(
            cx,
            index,
            |i| self.inner.create_index(i),
            |s, i| self.inner.create_index_with_session(s, i),
        )
    }

    /// Drops an index by name.
    pub fn drop_index(&self, cx: &Ambient, name: &str) -> TxResult<()> {
        self.binding.run(
            cx,
            name,
            |n| self.inner.drop_index(n),
            |s, n| self.inner.drop_index_with_session(s, n),
        )
    }

    /// Lists the collection's indexes.
    pub fn list_indexes(&self, cx: &Ambient) -> TxResult<Vec<IndexModel>> {
        self.binding.run(
            cx,
            (),
            |()| self.inner.list_indexes(),
            |s, ()| self.inner.list_indexes_with_session(s),
        )
    }
}

impl<T: Collection> Clone for TxCollection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            binding: self.binding.clone(),
        }
    }
}

impl<T: Collection> fmt::Debug for TxCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxCollection")
            .field("namespace", &self.inner.namespace())
            .field("binding", &self.binding)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::TxClient;
    use crate::scope::{ScopeOption, TransactionScope};
    use ambientdb_driver::memory::{MemoryClient, MemoryCollection};
    use ambientdb_driver::{doc, Client, Database, Session, SessionOptions, TransactionOptions};

    fn orders(client: &MemoryClient) -> TxCollection<MemoryCollection> {
        TxClient::new(client.clone()).database("shop").collection("orders")
    }

    #[test]
    fn no_transaction_passes_through() {
        let client = MemoryClient::new();
        let coll = orders(&client);
        let root = Ambient::default();
        coll.insert_one(&root, doc! { "_id": 1, "qty": 5 }).unwrap();

        assert_eq!(coll.count_documents(&root, Filter::All).unwrap(), 1);
        assert_eq!(client.stats().sessions_started, 0);
        assert!(coll.binding().registry().unwrap().is_empty());
    }

    #[test]
    fn transaction_writes_hidden_until_commit() {
        let client = MemoryClient::new();
        let coll = orders(&client);
        let root = Ambient::default();

        let mut scope = TransactionScope::begin(&root, ScopeOption::Required);
        coll.insert_one(scope.ambient(), doc! { "_id": 1 }).unwrap();
        assert_eq!(coll.count_documents(scope.ambient(), Filter::All).unwrap(), 1);
        assert_eq!(coll.count_documents(&root, Filter::All).unwrap(), 0);
        scope.complete().unwrap();
        scope.close().unwrap();

        assert_eq!(coll.count_documents(&root, Filter::All).unwrap(), 1);
        assert_eq!(client.stats().sessions_started, 1);
    }

    #[test]
    fn narrowed_view_keeps_binding() {
        let client = MemoryClient::new();
        let coll = orders(&client);
        let root = Ambient::default();
        coll.insert_many(
            &root,
            vec![doc! { "_id": 1, "open": true }, doc! { "_id": 2, "open": false }],
        )
        .unwrap();

        let open = coll.with_filter(Filter::eq("open", true));
        let scope = TransactionScope::begin(&root, ScopeOption::Required);
        let deleted = open.delete_many(scope.ambient(), Filter::All).unwrap();
        assert_eq!(deleted.deleted_count, 1);

        let registry = coll.binding().registry().unwrap();
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(registry, open.binding().registry().unwrap()));
        drop(scope);

        assert_eq!(coll.count_documents(&root, Filter::All).unwrap(), 2);
    }

    #[test]
    fn pinned_collection_uses_its_session() {
        let client = MemoryClient::new();
        let session = client.start_session(&SessionOptions::default()).unwrap();
        session
            .start_transaction(&TransactionOptions::default())
            .unwrap();
        let coll = TxCollection::pinned(client.database("shop").collection("orders"), session);
        let root = Ambient::default();

        coll.insert_one(&root, doc! { "_id": 1 }).unwrap();
        assert_eq!(coll.count_documents(&root, Filter::All).unwrap(), 1);
        assert_eq!(
            client
                .database("shop")
                .collection("orders")
                .count_documents(Filter::All)
                .unwrap(),
            0
        );
        coll.pinned_session().unwrap().commit_transaction().unwrap();
        assert_eq!(
            client
                .database("shop")
                .collection("orders")
                .count_documents(Filter::All)
                .unwrap(),
            1
        );
    }

    #[test]
    fn driver_errors_surface_as_driver_variant() {
        let client = MemoryClient::new();
        let coll = orders(&client);
        let root = Ambient::default();
        coll.insert_one(&root, doc! { "_id": 1 }).unwrap();
        let err = coll.insert_one(&root, doc! { "_id": 1 }).unwrap_err();
        assert!(err.as_driver().is_some());
    }
}
