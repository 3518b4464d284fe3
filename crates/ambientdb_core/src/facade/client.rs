//! Client facade.

use super::binding::SessionBinding;
use super::database::TxDatabase;
use crate::error::TxResult;
use crate::registry::SessionRegistry;
use crate::scope::Ambient;
use ambientdb_driver::{Client, SessionOptions};
use std::fmt;
use std::sync::Arc;

/// A client whose operations join the ambient transaction.
///
/// ```rust
/// use ambientdb_core::{Ambient, ScopeOption, TransactionScope, TxClient};
/// use ambientdb_driver::memory::MemoryClient;
/// use ambientdb_driver::{doc, Filter};
///
/// let client = TxClient::new(MemoryClient::new());
/// let orders = client.database("shop").collection("orders");
/// let root = Ambient::default();
///
/// let mut scope = TransactionScope::begin(&root, ScopeOption::Required);
/// orders.insert_one(scope.ambient(), doc! { "_id": 1 }).unwrap();
/// assert_eq!(orders.count_documents(&root, Filter::All).unwrap(), 0);
/// scope.complete().unwrap();
/// scope.close().unwrap();
///
/// assert_eq!(orders.count_documents(&root, Filter::All).unwrap(), 1);
/// ```
pub struct TxClient<C: Client> {
    inner: C,
    binding: SessionBinding<C::Session>,
}

impl<C: Client> TxClient<C> {
    /// Wraps a client with a registry of its own.
    pub fn new(client: C) -> Self {
        let registry = SessionRegistry::for_client(client.clone());
        Self::with_registry(client, registry)
    }

    /// Wraps a client, sharing an existing registry.
    pub fn with_registry(client: C, registry: Arc<SessionRegistry<C::Session>>) -> Self {
        Self {
            inner: client,
            binding: SessionBinding::Ambient(registry),
        }
    }

    /// Wraps a client pinned to an explicit session.
    pub fn pinned(client: C, session: impl Into<Arc<C::Session>>) -> Self {
        Self {
            inner: client,
            binding: SessionBinding::Pinned(session.into()),
        }
    }

    /// The wrapped client.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// How this facade selects sessions.
    pub fn binding(&self) -> &SessionBinding<C::Session> {
        &self.binding
    }

    /// The registry of an ambient-aware facade.
    pub fn registry(&self) -> Option<&Arc<SessionRegistry<C::Session>>> {
        self.binding.registry()
    }

    /// The pinned session.
    ///
    /// # Errors
    ///
    /// `NotPinned` if the facade was not constructed with a session.
    pub fn pinned_session(&self) -> TxResult<&Arc<C::Session>> {
        self.binding.pinned_session()
    }

    /// Starts an explicit session, outside the ambient mechanism.
    pub fn start_session(&self, options: &SessionOptions) -> TxResult<C::Session> {
        Ok(self.inner.start_session(options)?)
    }

    /// Returns a facade for the named database.
    pub fn database(&self, name: &str) -> TxDatabase<C::Database> {
        TxDatabase::from_parts(self.inner.database(name), self.binding.clone())
    }

    /// Lists database names.
    pub fn list_database_names(&self, cx: &Ambient) -> TxResult<Vec<String>> {
        self.binding.run(
            cx,
            (),
            |()| self.inner.list_database_names(),
            |s, ()| self.inner.list_database_names_with_session(s),
        )
    }

    /// Drops a database.
    pub fn drop_database(&self, cx: &Ambient, name: &str) -> TxResult<()> {
        self.binding.run(
            cx,
            name,
            |name| self.inner.drop_database(name),
            |s, name| self.inner.drop_database_with_session(s, name),
        )
    }
}

impl<C: Client> Clone for TxClient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            binding: self.binding.clone(),
        }
    }
}

impl<C: Client> fmt::Debug for TxClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxClient")
            .field("binding", &self.binding)
            .finish_non_exhaustive()
    }
}
