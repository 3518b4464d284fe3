//! Client and database handles.

use super::collection::MemoryCollection;
use super::config::MemoryConfig;
use super::fault::FaultPlan;
use super::session::MemorySession;
use super::stats::StatsSnapshot;
use super::ClientShared;
use crate::error::{DriverError, DriverResult};
use crate::options::SessionOptions;
use crate::query::Filter;
use crate::results::Namespace;
use crate::traits::{Client, Database, SessionId};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::trace;

/// An in-memory deployment.
///
/// Clones share the same data, sessions and counters.
///
/// ```rust
/// use ambientdb_driver::memory::MemoryClient;
/// use ambientdb_driver::{doc, Client, Collection, Database, Session, SessionOptions, TransactionOptions};
///
/// let client = MemoryClient::new();
/// let orders = client.database("shop").collection("orders");
///
/// let session = client.start_session(&SessionOptions::default()).unwrap();
/// session.start_transaction(&TransactionOptions::default()).unwrap();
/// orders.insert_one_with_session(&session, doc! { "_id": 1 }).unwrap();
/// assert_eq!(orders.count_documents(Default::default()).unwrap(), 0);
///
/// session.commit_transaction().unwrap();
/// assert_eq!(orders.count_documents(Default::default()).unwrap(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryClient {
    shared: Arc<ClientShared>,
}

impl MemoryClient {
    /// Creates an empty deployment with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty deployment with the given configuration.
    #[must_use]
    pub fn with_config(config: MemoryConfig) -> Self {
        Self {
            shared: Arc::new(ClientShared {
                config,
                ..ClientShared::default()
            }),
        }
    }

    /// Returns the client's configuration.
    pub fn config(&self) -> &MemoryConfig {
        &self.shared.config
    }

    /// Returns a snapshot of the call counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Returns the fault plan used to make upcoming calls fail.
    pub fn faults(&self) -> &FaultPlan {
        &self.shared.faults
    }

    fn record(&self, session_bound: bool) {
        self.shared.stats.record_operation(session_bound);
    }
}

impl Client for MemoryClient {
    type Session = MemorySession;
    type Database = MemoryDatabase;

    fn start_session(&self, options: &SessionOptions) -> DriverResult<MemorySession> {
        let latency = self.shared.config.session_start_latency;
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        if self.shared.faults.take_session_start() {
            return Err(DriverError::injected("startSession"));
        }
        let id = SessionId::new(self.shared.next_session.fetch_add(1, Ordering::SeqCst) + 1);
        self.shared.stats.record_session_start();
        trace!(session = %id, "session started");
        Ok(MemorySession::new(
            id,
            Arc::clone(&self.shared),
            options.clone(),
        ))
    }

    fn database(&self, name: &str) -> MemoryDatabase {
        MemoryDatabase {
            shared: Arc::clone(&self.shared),
            name: name.to_string(),
        }
    }

    fn list_database_names(&self) -> DriverResult<Vec<String>> {
        self.record(false);
        Ok(self.shared.store.read().database_names())
    }

    fn list_database_names_with_session(
        &self,
        session: &MemorySession,
    ) -> DriverResult<Vec<String>> {
        session.check_command(&self.shared, "listDatabases", true)?;
        self.record(true);
        Ok(self.shared.store.read().database_names())
    }

    fn drop_database(&self, name: &str) -> DriverResult<()> {
        self.record(false);
        self.shared.store.write().drop_database(name);
        Ok(())
    }

    fn drop_database_with_session(&self, session: &MemorySession, name: &str) -> DriverResult<()> {
        session.check_command(&self.shared, "dropDatabase", false)?;
        self.record(true);
        self.shared.store.write().drop_database(name);
        Ok(())
    }
}

/// A database of a [`MemoryClient`].
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    shared: Arc<ClientShared>,
    name: String,
}

impl MemoryDatabase {
    fn namespace(&self, collection: &str) -> Namespace {
        Namespace::new(self.name.clone(), collection)
    }

    fn record(&self, session_bound: bool) {
        self.shared.stats.record_operation(session_bound);
    }

    fn create(&self, name: &str) -> DriverResult<()> {
        self.shared
            .store
            .write()
            .create_collection(&self.namespace(name))
    }

    fn rename(&self, from: &str, to: &str) -> DriverResult<()> {
        self.shared
            .store
            .write()
            .rename_collection(&self.namespace(from), &self.namespace(to))
    }
}

impl Database for MemoryDatabase {
    type Session = MemorySession;
    type Collection = MemoryCollection;

    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> MemoryCollection {
        MemoryCollection::new(Arc::clone(&self.shared), self.namespace(name), Filter::All)
    }

    fn list_collection_names(&self) -> DriverResult<Vec<String>> {
        self.record(false);
        Ok(self.shared.store.read().collection_names(&self.name))
    }

    fn list_collection_names_with_session(
        &self,
        session: &MemorySession,
    ) -> DriverResult<Vec<String>> {
        session.check_command(&self.shared, "listCollections", true)?;
        self.record(true);
        Ok(self.shared.store.read().collection_names(&self.name))
    }

    fn create_collection(&self, name: &str) -> DriverResult<()> {
        self.record(false);
        self.create(name)
    }

    fn create_collection_with_session(&self, session: &MemorySession, name: &str) -> DriverResult<()> {
        session.check_command(&self.shared, "create", true)?;
        self.record(true);
        self.create(name)
    }

    fn drop_collection(&self, name: &str) -> DriverResult<()> {
        self.record(false);
        self.shared.store.write().drop_collection(&self.namespace(name));
        Ok(())
    }

    fn drop_collection_with_session(&self, session: &MemorySession, name: &str) -> DriverResult<()> {
        session.check_command(&self.shared, "drop", false)?;
        self.record(true);
        self.shared.store.write().drop_collection(&self.namespace(name));
        Ok(())
    }

    fn rename_collection(&self, from: &str, to: &str) -> DriverResult<()> {
        self.record(false);
        self.rename(from, to)
    }

    fn rename_collection_with_session(
        &self,
        session: &MemorySession,
        from: &str,
        to: &str,
    ) -> DriverResult<()> {
        session.check_command(&self.shared, "renameCollection", false)?;
        self.record(true);
        self.rename(from, to)
    }

    fn drop_database(&self) -> DriverResult<()> {
        self.record(false);
        self.shared.store.write().drop_database(&self.name);
        Ok(())
    }

    fn drop_database_with_session(&self, session: &MemorySession) -> DriverResult<()> {
        session.check_command(&self.shared, "dropDatabase", false)?;
        self.record(true);
        self.shared.store.write().drop_database(&self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::options::TransactionOptions;
    use crate::traits::{Collection, Session};

    #[test]
    fn sessions_get_distinct_ids() {
        let client = MemoryClient::new();
        let a = client.start_session(&SessionOptions::default()).unwrap();
        let b = client.start_session(&SessionOptions::default()).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(client.stats().sessions_started, 2);
    }

    #[test]
    fn injected_session_start_failure() {
        let client = MemoryClient::new();
        client.faults().fail_session_starts(1);
        assert!(client.start_session(&SessionOptions::default()).is_err());
        assert!(client.start_session(&SessionOptions::default()).is_ok());
        assert_eq!(client.stats().sessions_started, 1);
    }

    #[test]
    fn collection_admin_roundtrip() {
        let client = MemoryClient::new();
        let db = client.database("app");
        db.create_collection("a").unwrap();
        assert!(matches!(
            db.create_collection("a"),
            Err(DriverError::NamespaceExists { .. })
        ));
        db.rename_collection("a", "b").unwrap();
        assert_eq!(db.list_collection_names().unwrap(), vec!["b".to_string()]);
        assert_eq!(client.list_database_names().unwrap(), vec!["app".to_string()]);
        db.drop_collection("b").unwrap();
        assert!(client.list_database_names().unwrap().is_empty());
    }

    #[test]
    fn drop_rejected_inside_transaction() {
        let client = MemoryClient::new();
        let db = client.database("app");
        db.collection("a").insert_one(doc! { "_id": 1 }).unwrap();

        let session = client.start_session(&SessionOptions::default()).unwrap();
        session.start_transaction(&TransactionOptions::default()).unwrap();
        assert!(matches!(
            db.drop_collection_with_session(&session, "a"),
            Err(DriverError::NotSupportedInTransaction { .. })
        ));
        db.create_collection_with_session(&session, "b").unwrap();
        assert_eq!(db.list_collection_names_with_session(&session).unwrap().len(), 2);
    }

    #[test]
    fn session_from_other_client_rejected() {
        let a = MemoryClient::new();
        let b = MemoryClient::new();
        let session = b.start_session(&SessionOptions::default()).unwrap();
        assert!(matches!(
            a.list_database_names_with_session(&session),
            Err(DriverError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn drop_database_from_handle() {
        let client = MemoryClient::new();
        let db = client.database("tmp");
        db.collection("x").insert_one(doc! { "_id": 1 }).unwrap();
        db.drop_database().unwrap();
        assert!(client.list_database_names().unwrap().is_empty());
    }
}
