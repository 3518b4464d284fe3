//! Database facade.

use super::binding::SessionBinding;
use super::collection::TxCollection;
use crate::error::TxResult;
use crate::registry::SessionRegistry;
use crate::scope::Ambient;
use ambientdb_driver::Database;
use std::fmt;
use std::sync::Arc;

/// A database whose operations join the ambient transaction.
pub struct TxDatabase<D: Database> {
    inner: D,
    binding: SessionBinding<D::Session>,
}

impl<D: Database> TxDatabase<D> {
    /// Wraps a database, resolving sessions through `registry`.
    pub fn new(database: D, registry: Arc<SessionRegistry<D::Session>>) -> Self {
        Self::from_parts(database, SessionBinding::Ambient(registry))
    }

    /// Wraps a database pinned to an explicit session.
    pub fn pinned(database: D, session: impl Into<Arc<D::Session>>) -> Self {
        Self::from_parts(database, SessionBinding::Pinned(session.into()))
    }

    pub(crate) fn from_parts(inner: D, binding: SessionBinding<D::Session>) -> Self {
        Self { inner, binding }
    }

    /// The wrapped database.
    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// How this facade selects sessions.
    pub fn binding(&self) -> &SessionBinding<D::Session> {
        &self.binding
    }

    /// The pinned session.
    ///
    /// # Errors
    ///
    /// `NotPinned` if the facade was not constructed with a session.
    pub fn pinned_session(&self) -> TxResult<&Arc<D::Session>> {
        self.binding.pinned_session()
    }

    /// The database name.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Returns a facade for the named collection.
    pub fn collection(&self, name: &str) -> TxCollection<D::Collection> {
        TxCollection::from_parts(self.inner.collection(name), self.binding.clone())
    }

    /// Lists collection names.
    pub fn list_collection_names(&self, cx: &Ambient) -> TxResult<Vec<String>> {
        self.binding.run(
            cx,
            (),
            |()| self.inner.list_collection_names(),
            |s, ()| self.inner.list_collection_names_with_session(s),
        )
    }

    /// Creates a collection.
    pub fn create_collection(&self, cx: &Ambient, name: &str) -> TxResult<()> {
        self.binding.run(
            cx,
            name,
            |name| self.inner.create_collection(name),
            |s, name| self.inner.create_collection_with_session(s, name),
        )
    }

    /// Drops a collection.
    pub fn drop_collection(&self, cx: &Ambient, name: &str) -> TxResult<()> {
        self.binding.run(
            cx,
            name,
            |name| self.inner.drop_collection(name),
            |s, name| self.inner.drop_collection_with_session(s, name),
        )
    }

    /// Renames a collection.
    pub fn rename_collection(&self, cx: &Ambient, from: &str, to: &str) -> TxResult<()> {
        self.binding.run(
            cx,
            (from, to),
            |(from, to)| self.inner.rename_collection(from, to),
            |s, (from, to)| self.inner.rename_collection_with_session(s, from, to),
        )
    }

    /// Drops this database.
    pub fn drop_database(&self, cx: &Ambient) -> TxResult<()> {
        self.binding.run(
            cx,
            (),
            |()| self.inner.drop_database(),
            |s, ()| self.inner.drop_database_with_session(s),
        )
    }
}

impl<D: Database> Clone for TxDatabase<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            binding: self.binding.clone(),
        }
    }
}

impl<D: Database> fmt::Debug for TxDatabase<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxDatabase")
            .field("name", &self.inner.name())
            .field("binding", &self.binding)
            .finish()
    }
}
