//! Integration tests for the transactional facade.

use ambientdb_core::{
    Ambient, ScopeOption, SessionRegistry, TransactionScope, TxClient, TxCollection, TxDatabase,
    TxError, TxResult,
};
use ambientdb_driver::memory::{MemoryClient, MemoryCollection};
use ambientdb_driver::{
    doc, Client, Collection, Database, DriverError, Filter, FindOneAndModifyOptions, FindOptions,
    IndexModel, SessionOptions, SortOrder, Stage, Update, UpdateOptions, WriteModel,
};
use ambientdb_testkit::{
    assert_same_contents, document_body_strategy, documents_strategy, filter_strategy,
    stress_concurrent_scopes, update_strategy, StressConfig, TestClient,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;

fn sorted() -> FindOptions {
    FindOptions::new().sort("_id", SortOrder::Ascending)
}

/// Runs the same call on the facade and on a raw collection and compares.
fn same<T: PartialEq + std::fmt::Debug>(facade: TxResult<T>, raw: Result<T, DriverError>) {
    assert_eq!(facade, raw.map_err(TxError::from));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pass_through_matches_raw_driver(
        docs in documents_strategy(8),
        extra in document_body_strategy(),
        select in filter_strategy(),
        update in update_strategy(),
        remove in filter_strategy(),
    ) {
        let t = TestClient::new();
        let facade = t.collection("app", "items");
        let raw = MemoryClient::new().database("app").collection("items");
        let cx = &t.root;

        same(facade.insert_many(cx, docs.clone()), raw.insert_many(docs.clone()));
        let body = extra.clone();
        let mut extra = extra;
        extra.insert("_id", 100);
        same(facade.insert_one(cx, extra.clone()), raw.insert_one(extra.clone()));
        same(facade.insert_one(cx, extra.clone()), raw.insert_one(extra));
        same(
            facade.update_many(cx, select.clone(), update.clone(), UpdateOptions::default()),
            raw.update_many(select.clone(), update.clone(), UpdateOptions::default()),
        );
        same(
            facade.find_one_and_update(cx, select.clone(), update.clone(), FindOneAndModifyOptions::new()),
            raw.find_one_and_update(select.clone(), update, FindOneAndModifyOptions::new()),
        );
        same(facade.count_documents(cx, select.clone()), raw.count_documents(select.clone()));
        same(facade.distinct(cx, "a", select.clone()), raw.distinct("a", select.clone()));
        same(facade.find(cx, select.clone(), sorted()), raw.find(select.clone(), sorted()));
        same(facade.find_one(cx, select.clone(), sorted()), raw.find_one(select.clone(), sorted()));
        same(
            facade.replace_one(cx, select.clone(), body.clone(), UpdateOptions::default()),
            raw.replace_one(select.clone(), body.clone(), UpdateOptions::default()),
        );
        same(
            facade.find_one_and_replace(cx, remove.clone(), body.clone(), FindOneAndModifyOptions::new()),
            raw.find_one_and_replace(remove.clone(), body, FindOneAndModifyOptions::new()),
        );
        let pipeline = vec![
            Stage::Match(select.clone()),
            Stage::Sort(vec![("_id".to_string(), SortOrder::Descending)]),
            Stage::Limit(3),
        ];
        same(facade.aggregate(cx, pipeline.clone()), raw.aggregate(pipeline));
        let models = vec![
            WriteModel::InsertOne { document: doc! { "_id": 200, "a": 1 } },
            WriteModel::UpdateMany { filter: select.clone(), update: Update::new().set("b", 2), upsert: false },
            WriteModel::DeleteOne { filter: remove.clone() },
        ];
        same(facade.bulk_write(cx, models.clone()), raw.bulk_write(models));
        same(
            facade.find_one_and_delete(cx, select.clone(), FindOneAndModifyOptions::new()),
            raw.find_one_and_delete(select, FindOneAndModifyOptions::new()),
        );
        same(facade.delete_one(cx, remove.clone()), raw.delete_one(remove.clone()));
        same(facade.delete_many(cx, remove.clone()), raw.delete_many(remove));

        assert_same_contents(facade.inner(), &raw);
        prop_assert_eq!(t.client.stats().sessions_started, 0);
        prop_assert!(t.registry().is_empty());
    }
}

#[test]
fn pass_through_admin_operations() {
    let t = TestClient::new();
    let db = t.database("app");
    let raw_client = MemoryClient::new();
    let raw = raw_client.database("app");
    let cx = &t.root;

    same(db.create_collection(cx, "a"), raw.create_collection("a"));
    let dup = db.create_collection(cx, "a");
    assert!(matches!(dup, Err(TxError::Driver(DriverError::NamespaceExists { .. }))));
    same(dup, raw.create_collection("a"));
    same(db.rename_collection(cx, "a", "b"), raw.rename_collection("a", "b"));
    same(db.rename_collection(cx, "missing", "c"), raw.rename_collection("missing", "c"));
    same(db.list_collection_names(cx), raw.list_collection_names());
    same(t.list_database_names(cx), raw_client.list_database_names());

    let coll = db.collection("b");
    let raw_coll = raw.collection("b");
    let index = IndexModel::new([("n", SortOrder::Ascending)]).unique(true);
    let name = coll.create_index(cx, index.clone()).unwrap();
    assert_eq!(raw_coll.create_index(index).unwrap(), name);
    same(coll.list_indexes(cx), raw_coll.list_indexes());
    same(coll.drop_index(cx, &name), raw_coll.drop_index(&name));
    same(coll.drop_index(cx, &name), raw_coll.drop_index(&name));
    same(db.drop_collection(cx, "b"), raw.drop_collection("b"));
    same(db.drop_database(cx), raw.drop_database());
    same(t.list_database_names(cx), raw_client.list_database_names());
    same(t.drop_database(cx, "gone"), raw_client.drop_database("gone"));
    assert!(t.list_database_names(cx).unwrap().is_empty());
    assert_eq!(t.client.stats().sessions_started, 0);
}

#[test]
fn derived_objects_join_the_same_transaction() {
    let t = TestClient::new();
    let db = t.database("shop");
    let orders = db.collection("orders");
    let open = orders.with_filter(Filter::eq("open", true));

    let mut scope = TransactionScope::begin(&t.root, ScopeOption::Required);
    let cx = scope.ambient();
    db.create_collection(cx, "orders").unwrap();
    orders.insert_one(cx, doc! { "_id": 1, "open": true }).unwrap();
    orders.insert_one(cx, doc! { "_id": 2, "open": false }).unwrap();
    assert_eq!(open.count_documents(cx, Filter::All).unwrap(), 1);
    open.update_many(cx, Filter::All, Update::new().set("seen", true), UpdateOptions::default())
        .unwrap();
    assert_eq!(t.list_database_names(cx).unwrap(), vec!["shop".to_string()]);

    assert_eq!(t.client.stats().sessions_started, 1);
    assert_eq!(cx.participant_count(), 1);
    assert_eq!(t.committed_count("shop", "orders"), 0);
    scope.complete().unwrap();
    scope.close().unwrap();

    assert_eq!(
        orders.count_documents(&t.root, Filter::eq("seen", true)).unwrap(),
        1
    );
    t.assert_no_leaks();
}

#[test]
fn every_data_operation_runs_on_the_session() {
    let t = TestClient::new();
    let items = t.collection("app", "items");
    items
        .insert_many(&t.root, vec![doc! { "_id": 1, "n": 1 }, doc! { "_id": 2, "n": 2 }])
        .unwrap();
    let plain_before = t.client.stats().plain_operations;

    TransactionScope::run(&t.root, ScopeOption::Required, |cx| {
        items.replace_one(cx, Filter::id(1), doc! { "_id": 1, "n": 10 }, UpdateOptions::default())?;
        items.update_one(cx, Filter::id(2), Update::new().inc("n", 5), UpdateOptions::default())?;
        items.find_one_and_replace(cx, Filter::id(2), doc! { "_id": 2, "n": 20 }, FindOneAndModifyOptions::new())?;
        items.find_one_and_delete(cx, Filter::id(1), FindOneAndModifyOptions::new())?;
        items.bulk_write(
            cx,
            vec![
                WriteModel::InsertOne { document: doc! { "_id": 3, "n": 3 } },
                WriteModel::DeleteMany { filter: Filter::eq("n", 20) },
            ],
        )?;
        let summed = items.aggregate(cx, vec![Stage::Match(Filter::All)])?;
        assert_eq!(summed, vec![doc! { "_id": 3, "n": 3 }]);
        Ok(())
    })
    .unwrap();

    let stats = t.client.stats();
    assert_eq!(stats.plain_operations, plain_before);
    assert_eq!(stats.session_operations, 6);
    assert_eq!(
        items.find(&t.root, Filter::All, FindOptions::default()).unwrap(),
        vec![doc! { "_id": 3, "n": 3 }]
    );
    t.assert_no_leaks();
}

#[test]
fn admin_operation_rejected_inside_transaction() {
    let t = TestClient::new();
    let db = t.database("app");
    db.create_collection(&t.root, "items").unwrap();

    let scope = TransactionScope::begin(&t.root, ScopeOption::Required);
    let err = db.drop_collection(scope.ambient(), "items").unwrap_err();
    assert!(matches!(
        err,
        TxError::Driver(DriverError::NotSupportedInTransaction { .. })
    ));
    drop(scope);
    assert_eq!(db.list_collection_names(&t.root).unwrap(), vec!["items".to_string()]);
    t.assert_no_leaks();
}

#[test]
fn pinned_facades_use_the_given_session() {
    let client = MemoryClient::new();
    let session = Arc::new(client.start_session(&SessionOptions::default()).unwrap());
    let pinned = TxClient::pinned(client.clone(), Arc::clone(&session));
    let items = pinned.database("app").collection("items");

    // The context is ignored: the pinned session runs without a transaction.
    let scope = TransactionScope::begin(&Ambient::default(), ScopeOption::Required);
    items.insert_one(scope.ambient(), doc! { "_id": 1 }).unwrap();
    drop(scope);

    assert!(Arc::ptr_eq(items.pinned_session().unwrap(), &session));
    assert!(pinned.registry().is_none());
    assert_eq!(client.stats().sessions_started, 1);
    assert_eq!(client.stats().session_operations, 1);
    assert_eq!(
        client.database("app").collection("items").count_documents(Filter::All).unwrap(),
        1
    );
}

#[test]
fn pinned_session_on_ambient_facade_fails_loudly() {
    let client = MemoryClient::new();
    let facade = TxClient::new(client.clone());
    assert_eq!(facade.pinned_session().unwrap_err(), TxError::NotPinned);
    assert_eq!(
        facade.database("app").pinned_session().unwrap_err(),
        TxError::NotPinned
    );
    let coll: TxCollection<MemoryCollection> = TxCollection::new(
        client.database("app").collection("items"),
        SessionRegistry::for_client(client.clone()),
    );
    assert_eq!(coll.pinned_session().unwrap_err(), TxError::NotPinned);
}

#[test]
fn registry_without_transaction_is_a_usage_error() {
    let client = MemoryClient::new();
    let registry = SessionRegistry::for_client(client.clone());
    assert_eq!(
        registry.get_or_create(&Ambient::default()).unwrap_err(),
        TxError::NoAmbientTransaction
    );
    let suppressed = TransactionScope::begin(&Ambient::default(), ScopeOption::Suppress);
    assert_eq!(
        registry.get_or_create(suppressed.ambient()).unwrap_err(),
        TxError::NoAmbientTransaction
    );
    assert_eq!(client.stats().sessions_started, 0);
}

#[test]
fn wrapped_database_shares_registry() {
    let client = MemoryClient::new();
    let registry = SessionRegistry::for_client(client.clone());
    let db = TxDatabase::new(client.database("app"), Arc::clone(&registry));
    let items = db.collection("items");

    let scope = TransactionScope::begin(&Ambient::default(), ScopeOption::Required);
    items.insert_one(scope.ambient(), doc! { "_id": 1 }).unwrap();
    assert_eq!(registry.len(), 1);
    drop(scope);
    assert!(registry.is_empty());
    assert_eq!(client.stats().open_sessions(), 0);
}

#[test]
fn ten_concurrent_scopes_each_insert_one() {
    let t = TestClient::new();
    let items = t.collection("app", "items");

    thread::scope(|s| {
        for i in 0..10 {
            let items = items.clone();
            let root = &t.root;
            s.spawn(move || {
                let mut scope = TransactionScope::begin(root, ScopeOption::Required);
                items.insert_one(scope.ambient(), doc! { "_id": i }).unwrap();
                scope.complete().unwrap();
                scope.close().unwrap();
            });
        }
    });

    let ids: Vec<_> = items
        .find(&t.root, Filter::All, sorted())
        .unwrap()
        .into_iter()
        .filter_map(|d| d.id().and_then(|v| v.as_integer()))
        .collect();
    assert_eq!(ids, (0..10).collect::<Vec<i64>>());
    assert_eq!(t.client.stats().sessions_started, 10);
    t.assert_no_leaks();
}

#[test]
fn stress_many_scopes_many_threads() {
    let t = TestClient::new();
    let config = StressConfig::default();
    let result = stress_concurrent_scopes(&t, &config);
    result.print_summary("concurrent scopes");

    let expected = config.threads * config.scopes_per_thread;
    assert_eq!(result.total_ops, expected);
    assert_eq!(result.failed_ops, 0);
    assert_eq!(
        t.committed_count(&config.database, &config.collection),
        (expected * config.ops_per_scope) as u64
    );
    t.assert_no_leaks();
}
