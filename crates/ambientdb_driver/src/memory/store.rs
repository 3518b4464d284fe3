//! Committed state and the per-operation working view.

use crate::error::{DriverError, DriverResult};
use crate::options::TransactionOptions;
use crate::results::{IndexModel, Namespace};
use crate::value::{Document, Value};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Stored documents of one collection, as CBOR bytes keyed by `_id`.
#[derive(Debug, Clone)]
pub(crate) struct CollectionState {
    documents: BTreeMap<Value, Vec<u8>>,
    /// Always starts with the implicit `_id_` index.
    indexes: Vec<IndexModel>,
}

impl Default for CollectionState {
    fn default() -> Self {
        Self {
            documents: BTreeMap::new(),
            indexes: vec![IndexModel::id_index()],
        }
    }
}

impl CollectionState {
    pub(crate) fn indexes(&self) -> &[IndexModel] {
        &self.indexes
    }

    pub(crate) fn decode_all(&self) -> DriverResult<BTreeMap<Value, Document>> {
        self.documents
            .iter()
            .map(|(id, bytes)| Ok((id.clone(), Document::from_cbor(bytes)?)))
            .collect()
    }

    /// Adds an index after checking it against the committed documents,
    /// overlaid with `pending` writes when created inside a transaction.
    pub(crate) fn add_index(
        &mut self,
        ns: &Namespace,
        index: IndexModel,
        pending: Option<&TxnState>,
    ) -> DriverResult<String> {
        let name = index.resolved_name();
        if let Some(existing) = self.indexes.iter().find(|i| i.resolved_name() == name) {
            if existing.keys == index.keys && existing.unique == index.unique {
                return Ok(name);
            }
            return Err(DriverError::invalid_argument(format!(
                "index {name} already exists with different options"
            )));
        }
        let index = IndexModel {
            name: Some(name.clone()),
            ..index
        };
        if index.unique {
            let mut docs = self.decode_all()?;
            if let Some(txn) = pending {
                txn.overlay(ns, &mut docs)?;
            }
            check_unique_indexes(ns, std::slice::from_ref(&index), &docs)?;
        }
        self.indexes.push(index);
        Ok(name)
    }

    pub(crate) fn remove_index(&mut self, name: &str) -> DriverResult<()> {
        if name == IndexModel::ID_INDEX {
            return Err(DriverError::invalid_argument("cannot drop the _id index"));
        }
        let before = self.indexes.len();
        self.indexes.retain(|i| i.resolved_name() != name);
        if self.indexes.len() == before {
            return Err(DriverError::IndexNotFound {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

/// Committed state of every database.
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    databases: BTreeMap<String, BTreeMap<String, CollectionState>>,
}

impl StoreState {
    pub(crate) fn collection(&self, ns: &Namespace) -> Option<&CollectionState> {
        self.databases.get(&ns.database)?.get(&ns.collection)
    }

    pub(crate) fn collection_mut(
        &mut self,
        ns: &Namespace,
        create: bool,
    ) -> DriverResult<&mut CollectionState> {
        if create {
            return Ok(self
                .databases
                .entry(ns.database.clone())
                .or_default()
                .entry(ns.collection.clone())
                .or_default());
        }
        self.databases
            .get_mut(&ns.database)
            .and_then(|db| db.get_mut(&ns.collection))
            .ok_or_else(|| DriverError::namespace_not_found(ns))
    }

    pub(crate) fn database_names(&self) -> Vec<String> {
        self.databases.keys().cloned().collect()
    }

    pub(crate) fn collection_names(&self, database: &str) -> Vec<String> {
        self.databases
            .get(database)
            .map(|db| db.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn create_collection(&mut self, ns: &Namespace) -> DriverResult<()> {
        let db = self.databases.entry(ns.database.clone()).or_default();
        if db.contains_key(&ns.collection) {
            return Err(DriverError::namespace_exists(ns));
        }
        db.insert(ns.collection.clone(), CollectionState::default());
        Ok(())
    }

    /// Dropping a missing collection is not an error.
    pub(crate) fn drop_collection(&mut self, ns: &Namespace) {
        if let Some(db) = self.databases.get_mut(&ns.database) {
            db.remove(&ns.collection);
            if db.is_empty() {
                self.databases.remove(&ns.database);
            }
        }
    }

    pub(crate) fn rename_collection(&mut self, from: &Namespace, to: &Namespace) -> DriverResult<()> {
        let db = self
            .databases
            .get_mut(&from.database)
            .ok_or_else(|| DriverError::namespace_not_found(from))?;
        if db.contains_key(&to.collection) {
            return Err(DriverError::namespace_exists(to));
        }
        let state = db
            .remove(&from.collection)
            .ok_or_else(|| DriverError::namespace_not_found(from))?;
        db.insert(to.collection.clone(), state);
        Ok(())
    }

    pub(crate) fn drop_database(&mut self, name: &str) {
        self.databases.remove(name);
    }

    /// Applies one operation's changes directly to committed state.
    pub(crate) fn apply(
        &mut self,
        ns: &Namespace,
        changes: Vec<(Value, PendingWrite)>,
        create: bool,
    ) -> DriverResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let collection = self.collection_mut(ns, create)?;
        for (id, write) in changes {
            match write {
                PendingWrite::Insert(bytes) | PendingWrite::Replace(bytes) => {
                    collection.documents.insert(id, bytes);
                }
                PendingWrite::Delete => {
                    collection.documents.remove(&id);
                }
            }
        }
        Ok(())
    }

    /// Applies a transaction's writes atomically.
    ///
    /// Every buffered insert is checked against committed `_id`s, and every
    /// touched collection against its unique indexes over committed state
    /// merged with the writes. Any conflict fails the whole commit and
    /// nothing is applied.
    pub(crate) fn commit(&mut self, txn: TxnState, create: bool) -> DriverResult<usize> {
        for (ns, writes) in &txn.writes {
            let Some(collection) = self.collection(ns) else {
                if !create && !writes.is_empty() {
                    return Err(DriverError::namespace_not_found(ns));
                }
                continue;
            };
            for (id, write) in writes {
                if matches!(write, PendingWrite::Insert(_)) && collection.documents.contains_key(id)
                {
                    return Err(DriverError::duplicate_key(
                        ns,
                        IndexModel::ID_INDEX,
                        id.to_string(),
                    ));
                }
            }
            if writes.values().any(|w| !matches!(w, PendingWrite::Delete)) {
                let mut docs = collection.decode_all()?;
                txn.overlay(ns, &mut docs)?;
                check_unique_indexes(ns, collection.indexes(), &docs)?;
            }
        }

        let mut applied = 0;
        for (ns, writes) in txn.writes {
            applied += writes.len();
            self.apply(&ns, writes.into_iter().collect(), create)?;
        }
        Ok(applied)
    }
}

/// A buffered write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PendingWrite {
    /// The `_id` did not exist when the write was made.
    Insert(Vec<u8>),
    /// Overwrites an existing document.
    Replace(Vec<u8>),
    /// Removes an existing document.
    Delete,
}

/// An open transaction on a session.
#[derive(Debug)]
pub(crate) struct TxnState {
    pub(crate) options: TransactionOptions,
    writes: BTreeMap<Namespace, BTreeMap<Value, PendingWrite>>,
}

impl TxnState {
    pub(crate) fn new(options: TransactionOptions) -> Self {
        Self {
            options,
            writes: BTreeMap::new(),
        }
    }

    pub(crate) fn write_count(&self) -> usize {
        self.writes.values().map(BTreeMap::len).sum()
    }

    /// Merges one operation's changes into the buffered writes.
    pub(crate) fn record(&mut self, ns: &Namespace, changes: Vec<(Value, PendingWrite)>) {
        if changes.is_empty() {
            return;
        }
        let writes = self.writes.entry(ns.clone()).or_default();
        for (id, write) in changes {
            let merged = match (writes.remove(&id), write) {
                (Some(PendingWrite::Insert(_)), PendingWrite::Delete) => None,
                (Some(PendingWrite::Insert(_)), PendingWrite::Replace(bytes)) => {
                    Some(PendingWrite::Insert(bytes))
                }
                (Some(PendingWrite::Delete), PendingWrite::Insert(bytes)) => {
                    Some(PendingWrite::Replace(bytes))
                }
                (_, write) => Some(write),
            };
            if let Some(write) = merged {
                writes.insert(id, write);
            }
        }
    }

    fn overlay(&self, ns: &Namespace, docs: &mut BTreeMap<Value, Document>) -> DriverResult<()> {
        if let Some(writes) = self.writes.get(ns) {
            for (id, write) in writes {
                match write {
                    PendingWrite::Insert(bytes) | PendingWrite::Replace(bytes) => {
                        docs.insert(id.clone(), Document::from_cbor(bytes)?);
                    }
                    PendingWrite::Delete => {
                        docs.remove(id);
                    }
                }
            }
        }
        Ok(())
    }
}

/// The documents one operation sees, plus the changes it makes.
///
/// Loaded from committed state, overlaid with a transaction's buffered writes
/// when the operation runs inside one. Unique indexes are enforced against
/// the view as changes are made.
#[derive(Debug)]
pub(crate) struct View {
    ns: Namespace,
    docs: BTreeMap<Value, Document>,
    base_ids: BTreeSet<Value>,
    touched: BTreeSet<Value>,
    indexes: Vec<IndexModel>,
}

impl View {
    pub(crate) fn load(
        store: &StoreState,
        ns: &Namespace,
        txn: Option<&TxnState>,
    ) -> DriverResult<Self> {
        let (mut docs, indexes) = match store.collection(ns) {
            Some(collection) => (collection.decode_all()?, collection.indexes().to_vec()),
            None => (BTreeMap::new(), vec![IndexModel::id_index()]),
        };
        if let Some(txn) = txn {
            txn.overlay(ns, &mut docs)?;
        }
        Ok(Self {
            ns: ns.clone(),
            base_ids: docs.keys().cloned().collect(),
            docs,
            touched: BTreeSet::new(),
            indexes,
        })
    }

    pub(crate) fn namespace(&self) -> &Namespace {
        &self.ns
    }

    pub(crate) fn documents(&self) -> impl Iterator<Item = &Document> {
        self.docs.values()
    }

    /// Inserts a document, generating an `_id` if it has none.
    pub(crate) fn insert(&mut self, mut doc: Document) -> DriverResult<Value> {
        let id = match doc.id() {
            Some(id) => id.clone(),
            None => {
                let id = Value::Text(Uuid::new_v4().to_string());
                doc.insert(Document::ID_FIELD, id.clone());
                id
            }
        };
        if self.docs.contains_key(&id) {
            return Err(DriverError::duplicate_key(
                &self.ns,
                IndexModel::ID_INDEX,
                id.to_string(),
            ));
        }
        self.check_unique(&id, &doc)?;
        self.touched.insert(id.clone());
        self.docs.insert(id.clone(), doc);
        Ok(id)
    }

    /// Replaces the document stored under `id`. The new document keeps `id`.
    pub(crate) fn replace(&mut self, id: &Value, mut doc: Document) -> DriverResult<()> {
        match doc.id() {
            Some(new_id) if new_id != id => {
                return Err(DriverError::invalid_update("_id is immutable"));
            }
            Some(_) => {}
            None => {
                doc.insert(Document::ID_FIELD, id.clone());
            }
        }
        self.check_unique(id, &doc)?;
        self.touched.insert(id.clone());
        self.docs.insert(id.clone(), doc);
        Ok(())
    }

    pub(crate) fn delete(&mut self, id: &Value) -> Option<Document> {
        let removed = self.docs.remove(id);
        if removed.is_some() {
            self.touched.insert(id.clone());
        }
        removed
    }

    fn check_unique(&self, id: &Value, doc: &Document) -> DriverResult<()> {
        for index in self.indexes.iter().filter(|i| i.unique) {
            if index.resolved_name() == IndexModel::ID_INDEX {
                continue;
            }
            let key = index.key_of(doc);
            let clash = self
                .docs
                .iter()
                .any(|(other_id, other)| other_id != id && index.key_of(other) == key);
            if clash {
                return Err(DriverError::duplicate_key(
                    &self.ns,
                    index.resolved_name(),
                    render_key(&key),
                ));
            }
        }
        Ok(())
    }

    /// Encodes the net changes relative to the loaded state.
    pub(crate) fn into_changes(self) -> DriverResult<Vec<(Value, PendingWrite)>> {
        let mut changes = Vec::with_capacity(self.touched.len());
        for id in self.touched {
            let existed = self.base_ids.contains(&id);
            let write = match (self.docs.get(&id), existed) {
                (Some(doc), true) => PendingWrite::Replace(doc.to_cbor()?),
                (Some(doc), false) => PendingWrite::Insert(doc.to_cbor()?),
                (None, true) => PendingWrite::Delete,
                (None, false) => continue,
            };
            changes.push((id, write));
        }
        Ok(changes)
    }
}

/// Fails if two documents share a key of a unique secondary index.
fn check_unique_indexes(
    ns: &Namespace,
    indexes: &[IndexModel],
    docs: &BTreeMap<Value, Document>,
) -> DriverResult<()> {
    let unique = indexes
        .iter()
        .filter(|i| i.unique && i.resolved_name() != IndexModel::ID_INDEX);
    for index in unique {
        let mut seen = BTreeSet::new();
        for doc in docs.values() {
            let key = index.key_of(doc);
            if !seen.insert(key.clone()) {
                return Err(DriverError::duplicate_key(
                    ns,
                    index.resolved_name(),
                    render_key(&key),
                ));
            }
        }
    }
    Ok(())
}

fn render_key(key: &[Value]) -> String {
    key.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::query::SortOrder;

    fn ns() -> Namespace {
        Namespace::new("db", "items")
    }

    #[test]
    fn insert_generates_id() {
        let store = StoreState::default();
        let mut view = View::load(&store, &ns(), None).unwrap();
        let id = view.insert(doc! { "name": "x" }).unwrap();
        assert!(matches!(id, Value::Text(_)));
        assert_eq!(view.documents().count(), 1);
    }

    #[test]
    fn duplicate_id_rejected() {
        let store = StoreState::default();
        let mut view = View::load(&store, &ns(), None).unwrap();
        view.insert(doc! { "_id": 1 }).unwrap();
        let err = view.insert(doc! { "_id": 1 }).unwrap_err();
        assert!(err.is_duplicate_key());
    }

    #[test]
    fn insert_then_delete_leaves_no_change() {
        let store = StoreState::default();
        let mut view = View::load(&store, &ns(), None).unwrap();
        view.insert(doc! { "_id": 1 }).unwrap();
        view.delete(&Value::Integer(1));
        assert!(view.into_changes().unwrap().is_empty());
    }

    #[test]
    fn unique_index_enforced_in_view() {
        let mut store = StoreState::default();
        store
            .collection_mut(&ns(), true)
            .unwrap()
            .add_index(&ns(), IndexModel::new([("email", SortOrder::Ascending)]).unique(true), None)
            .unwrap();
        let mut view = View::load(&store, &ns(), None).unwrap();
        view.insert(doc! { "_id": 1, "email": "a@x" }).unwrap();
        assert!(view.insert(doc! { "_id": 2, "email": "a@x" }).is_err());
        assert!(view.replace(&Value::Integer(1), doc! { "email": "a@x", "n": 1 }).is_ok());
    }

    #[test]
    fn txn_record_merges_writes() {
        let mut txn = TxnState::new(TransactionOptions::default());
        let id = Value::Integer(1);
        txn.record(&ns(), vec![(id.clone(), PendingWrite::Insert(vec![1]))]);
        txn.record(&ns(), vec![(id.clone(), PendingWrite::Replace(vec![2]))]);
        assert_eq!(txn.write_count(), 1);
        txn.record(&ns(), vec![(id, PendingWrite::Delete)]);
        assert_eq!(txn.write_count(), 0);
    }

    #[test]
    fn commit_rejects_conflicting_insert_atomically() {
        let mut store = StoreState::default();
        let bytes = doc! { "_id": 1 }.to_cbor().unwrap();
        store
            .apply(&ns(), vec![(Value::Integer(1), PendingWrite::Insert(bytes.clone()))], true)
            .unwrap();

        let mut txn = TxnState::new(TransactionOptions::default());
        let other = doc! { "_id": 2 }.to_cbor().unwrap();
        txn.record(
            &ns(),
            vec![
                (Value::Integer(1), PendingWrite::Insert(bytes)),
                (Value::Integer(2), PendingWrite::Insert(other)),
            ],
        );
        assert!(store.commit(txn, true).is_err());
        assert_eq!(store.collection(&ns()).unwrap().decode_all().unwrap().len(), 1);
    }

    fn email_index(store: &mut StoreState) {
        store
            .collection_mut(&ns(), true)
            .unwrap()
            .add_index(&ns(), IndexModel::new([("email", SortOrder::Ascending)]).unique(true), None)
            .unwrap();
    }

    /// Runs one insert inside `txn` the way a session-bound write does.
    fn insert_in(store: &StoreState, txn: &mut TxnState, doc: Document) {
        let mut view = View::load(store, &ns(), Some(txn)).unwrap();
        view.insert(doc).unwrap();
        txn.record(&ns(), view.into_changes().unwrap());
    }

    #[test]
    fn commit_enforces_unique_index_across_transactions() {
        let mut store = StoreState::default();
        email_index(&mut store);

        let mut first = TxnState::new(TransactionOptions::default());
        let mut second = TxnState::new(TransactionOptions::default());
        insert_in(&store, &mut first, doc! { "_id": 1, "email": "x@y" });
        insert_in(&store, &mut second, doc! { "_id": 2, "email": "x@y" });

        store.commit(first, true).unwrap();
        let err = store.commit(second, true).unwrap_err();
        assert!(err.is_duplicate_key());
        let docs = store.collection(&ns()).unwrap().decode_all().unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs.contains_key(&Value::Integer(1)));
    }

    #[test]
    fn commit_allows_key_freed_by_the_same_transaction() {
        let mut store = StoreState::default();
        email_index(&mut store);
        let bytes = doc! { "_id": 1, "email": "x@y" }.to_cbor().unwrap();
        store
            .apply(&ns(), vec![(Value::Integer(1), PendingWrite::Insert(bytes))], true)
            .unwrap();

        let mut txn = TxnState::new(TransactionOptions::default());
        let mut view = View::load(&store, &ns(), Some(&txn)).unwrap();
        view.delete(&Value::Integer(1));
        view.insert(doc! { "_id": 2, "email": "x@y" }).unwrap();
        txn.record(&ns(), view.into_changes().unwrap());

        store.commit(txn, true).unwrap();
        let docs = store.collection(&ns()).unwrap().decode_all().unwrap();
        assert_eq!(docs.keys().cloned().collect::<Vec<_>>(), vec![Value::Integer(2)]);
    }

    #[test]
    fn unique_index_checks_pending_writes() {
        let mut store = StoreState::default();
        store.create_collection(&ns()).unwrap();
        let mut txn = TxnState::new(TransactionOptions::default());
        insert_in(&store, &mut txn, doc! { "_id": 1, "email": "x@y" });
        insert_in(&store, &mut txn, doc! { "_id": 2, "email": "x@y" });

        let index = IndexModel::new([("email", SortOrder::Ascending)]).unique(true);
        let collection = store.collection_mut(&ns(), false).unwrap();
        assert!(collection
            .add_index(&ns(), index.clone(), Some(&txn))
            .unwrap_err()
            .is_duplicate_key());
        assert!(collection.add_index(&ns(), index, None).is_ok());
    }

    #[test]
    fn rename_and_drop() {
        let mut store = StoreState::default();
        store.create_collection(&ns()).unwrap();
        assert!(store.create_collection(&ns()).is_err());
        let to = Namespace::new("db", "renamed");
        store.rename_collection(&ns(), &to).unwrap();
        assert_eq!(store.collection_names("db"), vec!["renamed".to_string()]);
        store.drop_collection(&to);
        assert!(store.database_names().is_empty());
    }
}
