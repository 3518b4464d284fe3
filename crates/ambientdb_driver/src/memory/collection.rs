//! Collection handles and the data operations behind them.
//!
//! Every operation runs against a [`View`] of the collection. Plain operations
//! load the view from committed state and apply their changes immediately.
//! Session-bound operations inside a transaction load the view with the
//! transaction's buffered writes on top and record their changes back into
//! the transaction. Each operation is atomic: if it fails, none of its
//! changes are kept.

use super::session::MemorySession;
use super::store::View;
use super::ClientShared;
use crate::error::{DriverError, DriverResult};
use crate::query::{
    apply_find_options, run_pipeline, sort_documents, Filter, FindOneAndModifyOptions,
    FindOptions, ReturnDocument, Stage, Update, UpdateOptions,
};
use crate::results::{
    BulkWriteResult, DeleteResult, IndexModel, InsertManyResult, InsertOneResult, Namespace,
    UpdateResult, WriteModel,
};
use crate::traits::Collection;
use crate::value::{Document, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// A collection of a [`MemoryClient`](super::MemoryClient).
#[derive(Clone)]
pub struct MemoryCollection {
    shared: Arc<ClientShared>,
    ns: Namespace,
    view_filter: Filter,
}

impl MemoryCollection {
    pub(crate) fn new(shared: Arc<ClientShared>, ns: Namespace, view_filter: Filter) -> Self {
        Self {
            shared,
            ns,
            view_filter,
        }
    }

    /// The filter every read, update and delete on this handle is narrowed by.
    pub fn view_filter(&self) -> &Filter {
        &self.view_filter
    }

    fn effective(&self, filter: Filter) -> Filter {
        self.view_filter.clone().and(filter)
    }

    fn read<T>(
        &self,
        session: Option<&MemorySession>,
        op: impl FnOnce(&View) -> DriverResult<T>,
    ) -> DriverResult<T> {
        self.shared.stats.record_operation(session.is_some());
        match session {
            None => {
                let store = self.shared.store.read();
                op(&View::load(&store, &self.ns, None)?)
            }
            Some(session) => {
                let state = session.lock_for(&self.shared)?;
                let store = self.shared.store.read();
                op(&View::load(&store, &self.ns, state.txn.as_ref())?)
            }
        }
    }

    fn write<T>(
        &self,
        session: Option<&MemorySession>,
        op: impl FnOnce(&mut View) -> DriverResult<T>,
    ) -> DriverResult<T> {
        self.shared.stats.record_operation(session.is_some());
        let create = self.shared.config.auto_create_collections;

        let mut state = match session {
            Some(session) => Some(session.lock_for(&self.shared)?),
            None => None,
        };
        if let Some(txn) = state.as_mut().and_then(|s| s.txn.as_mut()) {
            let store = self.shared.store.read();
            let mut view = View::load(&store, &self.ns, Some(&*txn))?;
            let out = op(&mut view)?;
            let changes = view.into_changes()?;
            if !create && !changes.is_empty() && store.collection(&self.ns).is_none() {
                return Err(DriverError::namespace_not_found(&self.ns));
            }
            txn.record(&self.ns, changes);
            return Ok(out);
        }

        let mut store = self.shared.store.write();
        let mut view = View::load(&store, &self.ns, None)?;
        let out = op(&mut view)?;
        store.apply(&self.ns, view.into_changes()?, create)?;
        Ok(out)
    }

    fn insert_one_in(
        &self,
        session: Option<&MemorySession>,
        document: Document,
    ) -> DriverResult<InsertOneResult> {
        self.write(session, |view| {
            let inserted_id = view.insert(document)?;
            Ok(InsertOneResult { inserted_id })
        })
    }

    fn insert_many_in(
        &self,
        session: Option<&MemorySession>,
        documents: Vec<Document>,
    ) -> DriverResult<InsertManyResult> {
        self.write(session, |view| {
            let inserted_ids = documents
                .into_iter()
                .map(|doc| view.insert(doc))
                .collect::<DriverResult<Vec<_>>>()?;
            Ok(InsertManyResult { inserted_ids })
        })
    }

    fn find_in(
        &self,
        session: Option<&MemorySession>,
        filter: Filter,
        options: &FindOptions,
    ) -> DriverResult<Vec<Document>> {
        let filter = self.effective(filter);
        self.read(session, |view| {
            Ok(apply_find_options(matching(view, &filter), options))
        })
    }

    fn find_one_in(
        &self,
        session: Option<&MemorySession>,
        filter: Filter,
        options: FindOptions,
    ) -> DriverResult<Option<Document>> {
        let options = options.limit(1);
        Ok(self.find_in(session, filter, &options)?.into_iter().next())
    }

    fn count_in(&self, session: Option<&MemorySession>, filter: Filter) -> DriverResult<u64> {
        let filter = self.effective(filter);
        self.read(session, |view| {
            Ok(view.documents().filter(|d| filter.matches(d)).count() as u64)
        })
    }

    fn distinct_in(
        &self,
        session: Option<&MemorySession>,
        field: &str,
        filter: Filter,
    ) -> DriverResult<Vec<Value>> {
        let filter = self.effective(filter);
        self.read(session, |view| {
            let mut values = BTreeSet::new();
            for doc in view.documents().filter(|d| filter.matches(d)) {
                match doc.get_path(field) {
                    Some(Value::Array(items)) => values.extend(items.iter().cloned()),
                    Some(value) => {
                        values.insert(value.clone());
                    }
                    None => {}
                }
            }
            Ok(values.into_iter().collect())
        })
    }

    fn replace_one_in(
        &self,
        session: Option<&MemorySession>,
        filter: Filter,
        replacement: Document,
        options: UpdateOptions,
    ) -> DriverResult<UpdateResult> {
        let filter = self.effective(filter);
        self.write(session, |view| {
            replace_in_view(view, &filter, replacement, options.upsert)
        })
    }

    fn update_in(
        &self,
        session: Option<&MemorySession>,
        filter: Filter,
        update: Update,
        options: UpdateOptions,
        multi: bool,
    ) -> DriverResult<UpdateResult> {
        let filter = self.effective(filter);
        self.write(session, |view| {
            update_in_view(view, &filter, &update, options.upsert, multi)
        })
    }

    fn delete_in(
        &self,
        session: Option<&MemorySession>,
        filter: Filter,
        multi: bool,
    ) -> DriverResult<DeleteResult> {
        let filter = self.effective(filter);
        self.write(session, |view| Ok(delete_in_view(view, &filter, multi)))
    }

    fn find_one_and_update_in(
        &self,
        session: Option<&MemorySession>,
        filter: Filter,
        update: Update,
        options: FindOneAndModifyOptions,
    ) -> DriverResult<Option<Document>> {
        check_update(&update)?;
        let filter = self.effective(filter);
        self.write(session, |view| {
            let Some(before) = first_sorted(view, &filter, &options) else {
                if !options.upsert {
                    return Ok(None);
                }
                let mut seed = filter.equality_seed();
                update.apply(&mut seed)?;
                return upserted(view, seed, options.return_document);
            };
            let mut after = before.clone();
            update.apply(&mut after)?;
            let id = id_of(&before)?;
            if after != before {
                view.replace(&id, after.clone())?;
            }
            Ok(Some(pick(before, after, options.return_document)))
        })
    }

    fn find_one_and_replace_in(
        &self,
        session: Option<&MemorySession>,
        filter: Filter,
        replacement: Document,
        options: FindOneAndModifyOptions,
    ) -> DriverResult<Option<Document>> {
        let filter = self.effective(filter);
        self.write(session, |view| {
            let Some(before) = first_sorted(view, &filter, &options) else {
                if !options.upsert {
                    return Ok(None);
                }
                return upserted(view, upsert_replacement(&filter, replacement), options.return_document);
            };
            let id = id_of(&before)?;
            view.replace(&id, replacement)?;
            let after = view_document(view, &id);
            Ok(Some(match options.return_document {
                ReturnDocument::Before => before,
                ReturnDocument::After => after.unwrap_or(before),
            }))
        })
    }

    fn find_one_and_delete_in(
        &self,
        session: Option<&MemorySession>,
        filter: Filter,
        options: FindOneAndModifyOptions,
    ) -> DriverResult<Option<Document>> {
        let filter = self.effective(filter);
        self.write(session, |view| {
            let Some(found) = first_sorted(view, &filter, &options) else {
                return Ok(None);
            };
            let id = id_of(&found)?;
            Ok(view.delete(&id))
        })
    }

    fn aggregate_in(
        &self,
        session: Option<&MemorySession>,
        pipeline: &[Stage],
    ) -> DriverResult<Vec<Document>> {
        let base = self.view_filter.clone();
        self.read(session, |view| Ok(run_pipeline(matching(view, &base), pipeline)))
    }

    fn bulk_write_in(
        &self,
        session: Option<&MemorySession>,
        models: Vec<WriteModel>,
    ) -> DriverResult<BulkWriteResult> {
        let models: Vec<WriteModel> = models
            .into_iter()
            .map(|model| self.narrow(model))
            .collect();
        self.write(session, |view| {
            let mut result = BulkWriteResult::default();
            for model in models {
                match model {
                    WriteModel::InsertOne { document } => {
                        view.insert(document)?;
                        result.inserted_count += 1;
                    }
                    WriteModel::UpdateOne {
                        filter,
                        update,
                        upsert,
                    } => result.absorb_update(update_in_view(view, &filter, &update, upsert, false)?),
                    WriteModel::UpdateMany {
                        filter,
                        update,
                        upsert,
                    } => result.absorb_update(update_in_view(view, &filter, &update, upsert, true)?),
                    WriteModel::ReplaceOne {
                        filter,
                        replacement,
                        upsert,
                    } => result.absorb_update(replace_in_view(view, &filter, replacement, upsert)?),
                    WriteModel::DeleteOne { filter } => {
                        result.deleted_count += delete_in_view(view, &filter, false).deleted_count;
                    }
                    WriteModel::DeleteMany { filter } => {
                        result.deleted_count += delete_in_view(view, &filter, true).deleted_count;
                    }
                }
            }
            Ok(result)
        })
    }

    fn narrow(&self, model: WriteModel) -> WriteModel {
        match model {
            WriteModel::InsertOne { .. } => model,
            WriteModel::UpdateOne {
                filter,
                update,
                upsert,
            } => WriteModel::UpdateOne {
                filter: self.effective(filter),
                update,
                upsert,
            },
            WriteModel::UpdateMany {
                filter,
                update,
                upsert,
            } => WriteModel::UpdateMany {
                filter: self.effective(filter),
                update,
                upsert,
            },
            WriteModel::ReplaceOne {
                filter,
                replacement,
                upsert,
            } => WriteModel::ReplaceOne {
                filter: self.effective(filter),
                replacement,
                upsert,
            },
            WriteModel::DeleteOne { filter } => WriteModel::DeleteOne {
                filter: self.effective(filter),
            },
            WriteModel::DeleteMany { filter } => WriteModel::DeleteMany {
                filter: self.effective(filter),
            },
        }
    }

    fn create_index_in(
        &self,
        session: Option<&MemorySession>,
        index: IndexModel,
    ) -> DriverResult<String> {
        // Held so the transaction's pending writes stay put while checked.
        let state = match session {
            Some(session) => Some(session.lock_for(&self.shared)?),
            None => None,
        };
        self.shared.stats.record_operation(session.is_some());
        if index.keys.is_empty() {
            return Err(DriverError::invalid_argument("index must have at least one key"));
        }
        let pending = state.as_ref().and_then(|s| s.txn.as_ref());
        self.shared
            .store
            .write()
            .collection_mut(&self.ns, true)?
            .add_index(&self.ns, index, pending)
    }

    fn drop_index_in(&self, session: Option<&MemorySession>, name: &str) -> DriverResult<()> {
        if let Some(session) = session {
            session.check_command(&self.shared, "dropIndexes", false)?;
        }
        self.shared.stats.record_operation(session.is_some());
        self.shared
            .store
            .write()
            .collection_mut(&self.ns, false)?
            .remove_index(name)
    }

    fn list_indexes_in(&self, session: Option<&MemorySession>) -> DriverResult<Vec<IndexModel>> {
        if let Some(session) = session {
            session.check_command(&self.shared, "listIndexes", true)?;
        }
        self.shared.stats.record_operation(session.is_some());
        self.shared
            .store
            .read()
            .collection(&self.ns)
            .map(|c| c.indexes().to_vec())
            .ok_or_else(|| DriverError::namespace_not_found(&self.ns))
    }
}

fn matching(view: &View, filter: &Filter) -> Vec<Document> {
    view.documents()
        .filter(|d| filter.matches(d))
        .cloned()
        .collect()
}

fn first_sorted(view: &View, filter: &Filter, options: &FindOneAndModifyOptions) -> Option<Document> {
    let mut docs = matching(view, filter);
    sort_documents(&mut docs, &options.sort);
    docs.into_iter().next()
}

fn id_of(doc: &Document) -> DriverResult<Value> {
    doc.id()
        .cloned()
        .ok_or_else(|| DriverError::invalid_argument("stored document has no _id"))
}

fn view_document(view: &View, id: &Value) -> Option<Document> {
    view.documents().find(|d| d.id() == Some(id)).cloned()
}

fn check_update(update: &Update) -> DriverResult<()> {
    if update.is_empty() {
        return Err(DriverError::invalid_update("update must contain at least one operator"));
    }
    Ok(())
}

fn pick(before: Document, after: Document, which: ReturnDocument) -> Document {
    match which {
        ReturnDocument::Before => before,
        ReturnDocument::After => after,
    }
}

fn upserted(view: &mut View, doc: Document, which: ReturnDocument) -> DriverResult<Option<Document>> {
    let id = view.insert(doc)?;
    Ok(match which {
        ReturnDocument::Before => None,
        ReturnDocument::After => view_document(view, &id),
    })
}

/// An upserted replacement takes its `_id` from the filter when it has none.
fn upsert_replacement(filter: &Filter, mut replacement: Document) -> Document {
    if replacement.id().is_none() {
        if let Some(id) = filter.equality_seed().id() {
            replacement.insert(Document::ID_FIELD, id.clone());
        }
    }
    replacement
}

fn update_in_view(
    view: &mut View,
    filter: &Filter,
    update: &Update,
    upsert: bool,
    multi: bool,
) -> DriverResult<UpdateResult> {
    check_update(update)?;
    let mut targets = matching(view, filter);
    if !multi {
        targets.truncate(1);
    }
    let mut result = UpdateResult {
        matched_count: targets.len() as u64,
        ..UpdateResult::default()
    };
    if targets.is_empty() && upsert {
        let mut seed = filter.equality_seed();
        update.apply(&mut seed)?;
        result.upserted_id = Some(view.insert(seed)?);
        return Ok(result);
    }
    for before in targets {
        let mut after = before.clone();
        update.apply(&mut after)?;
        if after != before {
            view.replace(&id_of(&before)?, after)?;
            result.modified_count += 1;
        }
    }
    Ok(result)
}

fn replace_in_view(
    view: &mut View,
    filter: &Filter,
    replacement: Document,
    upsert: bool,
) -> DriverResult<UpdateResult> {
    let Some(before) = matching(view, filter).into_iter().next() else {
        if !upsert {
            return Ok(UpdateResult::default());
        }
        let id = view.insert(upsert_replacement(filter, replacement))?;
        return Ok(UpdateResult {
            upserted_id: Some(id),
            ..UpdateResult::default()
        });
    };
    let id = id_of(&before)?;
    view.replace(&id, replacement)?;
    let changed = view_document(view, &id).as_ref() != Some(&before);
    Ok(UpdateResult {
        matched_count: 1,
        modified_count: u64::from(changed),
        upserted_id: None,
    })
}

fn delete_in_view(view: &mut View, filter: &Filter, multi: bool) -> DeleteResult {
    let mut ids: Vec<Value> = view
        .documents()
        .filter(|d| filter.matches(d))
        .filter_map(|d| d.id().cloned())
        .collect();
    if !multi {
        ids.truncate(1);
    }
    let deleted_count = ids.iter().filter(|id| view.delete(id).is_some()).count() as u64;
    DeleteResult { deleted_count }
}

impl fmt::Debug for MemoryCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCollection")
            .field("namespace", &self.ns)
            .field("view_filter", &self.view_filter)
            .finish()
    }
}

impl Collection for MemoryCollection {
    type Session = MemorySession;

    fn namespace(&self) -> Namespace {
        self.ns.clone()
    }

    fn with_filter(&self, filter: Filter) -> Self {
        Self::new(Arc::clone(&self.shared), self.ns.clone(), self.effective(filter))
    }

    fn insert_one(&self, document: Document) -> DriverResult<InsertOneResult> {
        self.insert_one_in(None, document)
    }

    fn insert_one_with_session(
        &self,
        session: &MemorySession,
        document: Document,
    ) -> DriverResult<InsertOneResult> {
        self.insert_one_in(Some(session), document)
    }

    fn insert_many(&self, documents: Vec<Document>) -> DriverResult<InsertManyResult> {
        self.insert_many_in(None, documents)
    }

    fn insert_many_with_session(
        &self,
        session: &MemorySession,
        documents: Vec<Document>,
    ) -> DriverResult<InsertManyResult> {
        self.insert_many_in(Some(session), documents)
    }

    fn find_one(&self, filter: Filter, options: FindOptions) -> DriverResult<Option<Document>> {
        self.find_one_in(None, filter, options)
    }

    fn find_one_with_session(
        &self,
        session: &MemorySession,
        filter: Filter,
        options: FindOptions,
    ) -> DriverResult<Option<Document>> {
        self.find_one_in(Some(session), filter, options)
    }

    fn find(&self, filter: Filter, options: FindOptions) -> DriverResult<Vec<Document>> {
        self.find_in(None, filter, &options)
    }

    fn find_with_session(
        &self,
        session: &MemorySession,
        filter: Filter,
        options: FindOptions,
    ) -> DriverResult<Vec<Document>> {
        self.find_in(Some(session), filter, &options)
    }

    fn count_documents(&self, filter: Filter) -> DriverResult<u64> {
        self.count_in(None, filter)
    }

    fn count_documents_with_session(
        &self,
        session: &MemorySession,
        filter: Filter,
    ) -> DriverResult<u64> {
        self.count_in(Some(session), filter)
    }

    fn distinct(&self, field: &str, filter: Filter) -> DriverResult<Vec<Value>> {
        self.distinct_in(None, field, filter)
    }

    fn distinct_with_session(
        &self,
        session: &MemorySession,
        field: &str,
        filter: Filter,
    ) -> DriverResult<Vec<Value>> {
        self.distinct_in(Some(session), field, filter)
    }

    fn replace_one(
        &self,
        filter: Filter,
        replacement: Document,
        options: UpdateOptions,
    ) -> DriverResult<UpdateResult> {
        self.replace_one_in(None, filter, replacement, options)
    }

    fn replace_one_with_session(
        &self,
        session: &MemorySession,
        filter: Filter,
        replacement: Document,
        options: UpdateOptions,
    ) -> DriverResult<UpdateResult> {
        self.replace_one_in(Some(session), filter, replacement, options)
    }

    fn update_one(
        &self,
        filter: Filter,
        update: Update,
        options: UpdateOptions,
    ) -> DriverResult<UpdateResult> {
        self.update_in(None, filter, update, options, false)
    }

    fn update_one_with_session(
        &self,
        session: &MemorySession,
        filter: Filter,
        update: Update,
        options: UpdateOptions,
    ) -> DriverResult<UpdateResult> {
        self.update_in(Some(session), filter, update, options, false)
    }

    fn update_many(
        &self,
        filter: Filter,
        update: Update,
        options: UpdateOptions,
    ) -> DriverResult<UpdateResult> {
        self.update_in(None, filter, update, options, true)
    }

    fn update_many_with_session(
        &self,
        session: &MemorySession,
        filter: Filter,
        update: Update,
        options: UpdateOptions,
    ) -> DriverResult<UpdateResult> {
        self.update_in(Some(session), filter, update, options, true)
    }

    fn delete_one(&self, filter: Filter) -> DriverResult<DeleteResult> {
        self.delete_in(None, filter, false)
    }

    fn delete_one_with_session(
        &self,
        session: &MemorySession,
        filter: Filter,
    ) -> DriverResult<DeleteResult> {
        self.delete_in(Some(session), filter, false)
    }

    fn delete_many(&self, filter: Filter) -> DriverResult<DeleteResult> {
        self.delete_in(None, filter, true)
    }

    fn delete_many_with_session(
        &self,
        session: &MemorySession,
        filter: Filter,
    ) -> DriverResult<DeleteResult> {
        self.delete_in(Some(session), filter, true)
    }

    fn find_one_and_update(
        &self,
        filter: Filter,
        update: Update,
        options: FindOneAndModifyOptions,
    ) -> DriverResult<Option<Document>> {
        self.find_one_and_update_in(None, filter, update, options)
    }

    fn find_one_and_update_with_session(
        &self,
        session: &MemorySession,
        filter: Filter,
        update: Update,
        options: FindOneAndModifyOptions,
    ) -> DriverResult<Option<Document>> {
        self.find_one_and_update_in(Some(session), filter, update, options)
    }

    fn find_one_and_replace(
        &self,
        filter: Filter,
        replacement: Document,
        options: FindOneAndModifyOptions,
    ) -> DriverResult<Option<Document>> {
        self.find_one_and_replace_in(None, filter, replacement, options)
    }

    fn find_one_and_replace_with_session(
        &self,
        session: &MemorySession,
        filter: Filter,
        replacement: Document,
        options: FindOneAndModifyOptions,
    ) -> DriverResult<Option<Document>> {
        self.find_one_and_replace_in(Some(session), filter, replacement, options)
    }

    fn find_one_and_delete(
        &self,
        filter: Filter,
        options: FindOneAndModifyOptions,
    ) -> DriverResult<Option<Document>> {
        self.find_one_and_delete_in(None, filter, options)
    }

    fn find_one_and_delete_with_session(
        &self,
        session: &MemorySession,
        filter: Filter,
        options: FindOneAndModifyOptions,
    ) -> DriverResult<Option<Document>> {
        self.find_one_and_delete_in(Some(session), filter, options)
    }

    fn aggregate(&self, pipeline: Vec<Stage>) -> DriverResult<Vec<Document>> {
        self.aggregate_in(None, &pipeline)
    }

    fn aggregate_with_session(
        &self,
        session: &MemorySession,
        pipeline: Vec<Stage>,
    ) -> DriverResult<Vec<Document>> {
        self.aggregate_in(Some(session), &pipeline)
    }

    fn bulk_write(&self, models: Vec<WriteModel>) -> DriverResult<BulkWriteResult> {
        self.bulk_write_in(None, models)
    }

    fn bulk_write_with_session(
        &self,
        session: &MemorySession,
        models: Vec<WriteModel>,
    ) -> DriverResult<BulkWriteResult> {
        self.bulk_write_in(Some(session), models)
    }

    fn create_index(&self, index: IndexModel) -> DriverResult<String> {
        self.create_index_in(None, index)
    }

    fn create_index_with_session(
        &self,
        session: &MemorySession,
        index: IndexModel,
    ) -> DriverResult<String> {
        self.create_index_in(Some(session), index)
    }

    fn drop_index(&self, name: &str) -> DriverResult<()> {
        self.drop_index_in(None, name)
    }

    fn drop_index_with_session(&self, session: &MemorySession, name: &str) -> DriverResult<()> {
        self.drop_index_in(Some(session), name)
    }

    fn list_indexes(&self) -> DriverResult<Vec<IndexModel>> {
        self.list_indexes_in(None)
    }

    fn list_indexes_with_session(&self, session: &MemorySession) -> DriverResult<Vec<IndexModel>> {
        self.list_indexes_in(Some(session))
    }
}
