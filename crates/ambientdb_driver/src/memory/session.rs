//! Sessions and their transactions.

use super::store::TxnState;
use super::ClientShared;
use crate::error::{DriverError, DriverResult};
use crate::options::{SessionOptions, TransactionOptions};
use crate::traits::{Session, SessionId};
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Default)]
pub(crate) struct SessionState {
    ended: bool,
    pub(crate) txn: Option<TxnState>,
}

struct SessionInner {
    id: SessionId,
    shared: Arc<ClientShared>,
    options: SessionOptions,
    state: Mutex<SessionState>,
}

/// A session of a [`MemoryClient`](super::MemoryClient).
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct MemorySession {
    inner: Arc<SessionInner>,
}

impl MemorySession {
    pub(crate) fn new(id: SessionId, shared: Arc<ClientShared>, options: SessionOptions) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                shared,
                options,
                state: Mutex::new(SessionState::default()),
            }),
        }
    }

    /// Options the session was started with.
    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    /// Options of the open transaction, if any.
    pub fn transaction_options(&self) -> Option<TransactionOptions> {
        self.inner.state.lock().txn.as_ref().map(|t| t.options.clone())
    }

    /// Number of writes buffered in the open transaction.
    pub fn pending_write_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .txn
            .as_ref()
            .map_or(0, TxnState::write_count)
    }

    /// Returns true once the session has ended.
    pub fn is_ended(&self) -> bool {
        self.inner.state.lock().ended
    }

    /// Locks the session for one operation against `shared`'s store.
    ///
    /// Fails if the session belongs to another client or has ended. The
    /// guard is held for the whole operation so a concurrent commit cannot
    /// interleave with it.
    pub(crate) fn lock_for(
        &self,
        shared: &Arc<ClientShared>,
    ) -> DriverResult<MutexGuard<'_, SessionState>> {
        if !Arc::ptr_eq(&self.inner.shared, shared) {
            return Err(DriverError::invalid_argument(
                "session was started by a different client",
            ));
        }
        let state = self.inner.state.lock();
        if state.ended {
            return Err(self.ended_error());
        }
        Ok(state)
    }

    /// Validates a session-bound administrative command.
    pub(crate) fn check_command(
        &self,
        shared: &Arc<ClientShared>,
        operation: &str,
        allowed_in_transaction: bool,
    ) -> DriverResult<()> {
        let state = self.lock_for(shared)?;
        if state.txn.is_some() && !allowed_in_transaction {
            return Err(DriverError::not_supported_in_transaction(operation));
        }
        Ok(())
    }

    fn ended_error(&self) -> DriverError {
        DriverError::SessionEnded {
            session: self.inner.id.to_string(),
        }
    }

    fn no_transaction_error(&self) -> DriverError {
        DriverError::NoTransactionStarted {
            session: self.inner.id.to_string(),
        }
    }
}

impl Session for MemorySession {
    fn id(&self) -> SessionId {
        self.inner.id
    }

    fn start_transaction(&self, options: &TransactionOptions) -> DriverResult<()> {
        let mut state = self.inner.state.lock();
        if state.ended {
            return Err(self.ended_error());
        }
        if state.txn.is_some() {
            return Err(DriverError::TransactionInProgress {
                session: self.inner.id.to_string(),
            });
        }
        if self.inner.shared.faults.take_transaction_start() {
            return Err(DriverError::injected("startTransaction"));
        }
        let options = options
            .clone()
            .or(&self.inner.options.default_transaction_options);
        state.txn = Some(TxnState::new(options));
        self.inner.shared.stats.record_transaction_start();
        trace!(session = %self.inner.id, "transaction started");
        Ok(())
    }

    fn commit_transaction(&self) -> DriverResult<()> {
        let mut state = self.inner.state.lock();
        if state.txn.is_none() {
            return Err(self.no_transaction_error());
        }
        if self.inner.shared.faults.take_commit() {
            return Err(DriverError::injected("commitTransaction"));
        }
        let Some(txn) = state.txn.take() else {
            return Err(self.no_transaction_error());
        };
        let shared = &self.inner.shared;
        let result = shared
            .store
            .write()
            .commit(txn, shared.config.auto_create_collections);
        match result {
            Ok(applied) => {
                shared.stats.record_transaction_commit();
                debug!(session = %self.inner.id, writes = applied, "transaction committed");
                Ok(())
            }
            Err(e) => {
                shared.stats.record_transaction_abort();
                debug!(session = %self.inner.id, error = %e, "commit rejected, transaction aborted");
                Err(e)
            }
        }
    }

    fn abort_transaction(&self) -> DriverResult<()> {
        let mut state = self.inner.state.lock();
        if state.txn.is_none() {
            return Err(self.no_transaction_error());
        }
        if self.inner.shared.faults.take_abort() {
            return Err(DriverError::injected("abortTransaction"));
        }
        state.txn = None;
        self.inner.shared.stats.record_transaction_abort();
        trace!(session = %self.inner.id, "transaction aborted");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.inner.state.lock().txn.is_some()
    }

    fn end_session(&self) {
        let mut state = self.inner.state.lock();
        let first = !state.ended;
        state.ended = true;
        if state.txn.take().is_some() {
            self.inner.shared.stats.record_transaction_abort();
        }
        self.inner.shared.stats.record_end_session_call(first);
        if first {
            trace!(session = %self.inner.id, "session ended");
        }
    }
}

impl fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySession")
            .field("id", &self.inner.id)
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}
