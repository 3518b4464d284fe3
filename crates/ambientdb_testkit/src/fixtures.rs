//! Test fixtures and client helpers.
//!
//! Provides a reference-driver client wired to a transactional facade and
//! a root context, plus leak checks for tests.

use ambientdb_core::{Ambient, Config, SessionRegistry, TxClient, TxCollection};
use ambientdb_driver::memory::{MemoryClient, MemoryCollection, MemoryConfig, MemorySession};
use ambientdb_driver::{Client, Collection, Database, Filter};
use std::sync::Arc;

/// A reference client with its facade and a root context.
pub struct TestClient {
    /// The raw reference driver.
    pub client: MemoryClient,
    /// The ambient-aware facade over `client`.
    pub facade: TxClient<MemoryClient>,
    /// A context with no transaction.
    pub root: Ambient,
}

impl TestClient {
    /// Creates a test client with default configuration.
    pub fn new() -> Self {
        Self::with_configs(MemoryConfig::default(), Config::default())
    }

    /// Creates a test client with a custom driver configuration.
    pub fn with_config(config: MemoryConfig) -> Self {
        Self::with_configs(config, Config::default())
    }

    /// Creates a test client with custom driver and scope configuration.
    pub fn with_configs(memory: MemoryConfig, config: Config) -> Self {
        let client = MemoryClient::with_config(memory);
        Self {
            facade: TxClient::new(client.clone()),
            client,
            root: Ambient::new(config),
        }
    }

    /// Returns an ambient-aware collection.
    pub fn collection(&self, database: &str, name: &str) -> TxCollection<MemoryCollection> {
        self.facade.database(database).collection(name)
    }

    /// Returns the raw driver collection.
    pub fn raw_collection(&self, database: &str, name: &str) -> MemoryCollection {
        self.client.database(database).collection(name)
    }

    /// The facade's session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry<MemorySession>> {
        self.facade
            .registry()
            .expect("test client facade is ambient-aware")
    }

    /// Counts committed documents, outside any transaction.
    pub fn committed_count(&self, database: &str, name: &str) -> u64 {
        self.raw_collection(database, name)
            .count_documents(Filter::All)
            .expect("Failed to count committed documents")
    }

    /// Asserts that no session is registered and none is left open.
    pub fn assert_no_leaks(&self) {
        let stats = self.client.stats();
        assert!(
            self.registry().is_empty(),
            "registry still holds sessions for {:?}",
            self.registry().transaction_ids()
        );
        assert_eq!(
            stats.open_sessions(),
            0,
            "{} sessions started, {} ended",
            stats.sessions_started,
            stats.sessions_ended
        );
    }
}

impl Default for TestClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestClient {
    type Target = TxClient<MemoryClient>;

    fn deref(&self) -> &Self::Target {
        &self.facade
    }
}

/// Runs a test with a fresh test client.
pub fn with_test_client<F, R>(f: F) -> R
where
    F: FnOnce(&TestClient) -> R,
{
    let client = TestClient::new();
    f(&client)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use ambientdb_driver::doc;

    /// Creates a test client whose `database.name` collection holds
    /// documents with `_id` 0 to `count - 1` and a `balance` of 100.
    pub fn seeded_client(database: &str, name: &str, count: usize) -> TestClient {
        let client = TestClient::new();
        let coll = client.raw_collection(database, name);
        let docs = (0..count)
            .map(|i| doc! { "_id": i as i64, "balance": 100 })
            .collect();
        coll.insert_many(docs).expect("Failed to seed documents");
        client
    }
}
