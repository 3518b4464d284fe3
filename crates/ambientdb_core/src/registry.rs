//! Session registry.
//!
//! Maps each active ambient transaction to exactly one driver session with an
//! open transaction. The session is created lazily by the first operation
//! that runs under the transaction and is removed when the transaction
//! completes.

use crate::enlistment::Enlistment;
use crate::error::{TxError, TxResult};
use crate::scope::{Ambient, AmbientTransaction};
use crate::types::AmbientTxId;
use ambientdb_driver::{Client, DriverResult, Session, SessionOptions};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

type SessionStarter<S> = Box<dyn Fn(&SessionOptions) -> DriverResult<S> + Send + Sync>;
type Slot<S> = Arc<OnceCell<Arc<SessionHandle<S>>>>;

/// A driver session bound to one ambient transaction.
///
/// The session's transaction is committed or aborted at most once, and the
/// session is ended at most once. Operations run under [`enter`](Self::enter)
/// never overlap the commit or abort.
pub struct SessionHandle<S: Session> {
    id: AmbientTxId,
    session: S,
    gate: RwLock<()>,
    completed: AtomicBool,
    disposed: AtomicBool,
}

impl<S: Session> SessionHandle<S> {
    fn new(id: AmbientTxId, session: S) -> Self {
        Self {
            id,
            session,
            gate: RwLock::new(()),
            completed: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    /// The ambient transaction this session belongs to.
    pub fn transaction_id(&self) -> AmbientTxId {
        self.id
    }

    /// The driver session.
    pub fn session(&self) -> &S {
        &self.session
    }

    /// Returns true once the session's transaction was committed or aborted.
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Returns true once the session was ended.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Admits one operation on the session's transaction.
    ///
    /// Returns `None` once the transaction was committed or aborted. While
    /// the guard is held, completion waits.
    pub fn enter(&self) -> Option<RwLockReadGuard<'_, ()>> {
        let guard = self.gate.read();
        (!self.is_completed()).then_some(guard)
    }

    pub(crate) fn commit(&self) -> TxResult<()> {
        let _gate = self.gate.write();
        if self.completed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.session.commit_transaction()?;
        Ok(())
    }

    pub(crate) fn abort(&self) -> TxResult<()> {
        let _gate = self.gate.write();
        if self.completed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.session.abort_transaction()?;
        Ok(())
    }

    pub(crate) fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.session.end_session();
            debug!(tx = %self.id, session = %self.session.id(), "session disposed");
        }
    }
}

impl<S: Session> fmt::Debug for SessionHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("tx", &self.id)
            .field("session", &self.session.id())
            .field("completed", &self.is_completed())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Process-local map from ambient transaction to session.
///
/// A registry is an ordinary owned value, usually shared as
/// `Arc<SessionRegistry<S>>` by every facade derived from one client.
/// Independent registries never see each other's sessions.
pub struct SessionRegistry<S: Session> {
    starter: SessionStarter<S>,
    slots: Mutex<HashMap<AmbientTxId, Slot<S>>>,
}

impl<S: Session> SessionRegistry<S> {
    /// Creates a registry that starts sessions with `starter`.
    pub fn new(
        starter: impl Fn(&SessionOptions) -> DriverResult<S> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            starter: Box::new(starter),
            slots: Mutex::new(HashMap::new()),
        })
    }

    /// Creates a registry that starts sessions on `client`.
    pub fn for_client<C>(client: C) -> Arc<Self>
    where
        C: Client<Session = S>,
    {
        Self::new(move |options| client.start_session(options))
    }

    /// Returns the session for the context's transaction, creating it on
    /// first use.
    ///
    /// Concurrent callers with the same transaction receive the same handle
    /// and only one session is started. Creation starts a session, opens its
    /// transaction and enlists it; if any step fails the partial session is
    /// ended and no entry remains.
    ///
    /// # Errors
    ///
    /// `NoAmbientTransaction` if the context carries no transaction,
    /// `TransactionNotActive` or `Timeout` if it can no longer accept work,
    /// and any driver failure while starting the session or its transaction.
    pub fn get_or_create(self: &Arc<Self>, cx: &Ambient) -> TxResult<Arc<SessionHandle<S>>> {
        let tx = cx.transaction().ok_or(TxError::NoAmbientTransaction)?;
        let id = tx.id();
        let slot = Arc::clone(self.slots.lock().entry(id).or_default());

        match slot.get_or_try_init(|| self.create(cx, tx)) {
            Ok(handle) if handle.is_completed() => Err(TxError::TransactionNotActive {
                id,
                status: tx.status(),
            }),
            Ok(handle) => Ok(Arc::clone(handle)),
            Err(e) => {
                self.release_empty(id, slot);
                Err(e)
            }
        }
    }

    fn create(
        self: &Arc<Self>,
        cx: &Ambient,
        tx: &Arc<AmbientTransaction>,
    ) -> TxResult<Arc<SessionHandle<S>>> {
        let id = tx.id();
        tx.ensure_active()?;

        let session = (self.starter)(&cx.config().session_options)?;
        if let Err(e) = session.start_transaction(tx.options()) {
            session.end_session();
            return Err(e.into());
        }

        let handle = Arc::new(SessionHandle::new(id, session));
        let registry = Arc::downgrade(self);
        let enlistment = Enlistment::new(Arc::clone(&handle), move || detach(&registry, id));
        if let Err(e) = tx.enlist(Box::new(enlistment)) {
            if let Err(abort_err) = handle.abort() {
                warn!(tx = %id, error = %abort_err, "abort after failed enlistment failed");
            }
            handle.dispose();
            return Err(e);
        }

        debug!(tx = %id, session = %handle.session().id(), "session created and enlisted");
        Ok(handle)
    }

    /// Drops a slot whose initialization failed, unless another caller
    /// still holds it and will retry.
    fn release_empty(&self, id: AmbientTxId, slot: Slot<S>) {
        let mut slots = self.slots.lock();
        let ours = slots.get(&id).is_some_and(|s| Arc::ptr_eq(s, &slot));
        // One reference in the map, one held here.
        if ours && slot.get().is_none() && Arc::strong_count(&slot) == 2 {
            slots.remove(&id);
        }
        drop(slot);
    }

    /// Removes and disposes the session of a transaction.
    ///
    /// Safe to call any number of times; the session is disposed once.
    /// Returns true if a session was removed by this call.
    pub fn remove(&self, id: AmbientTxId) -> bool {
        match self.detach(id) {
            Some(handle) => {
                handle.dispose();
                true
            }
            None => false,
        }
    }

    /// Takes a transaction's slot out of the map without disposing it.
    fn detach(&self, id: AmbientTxId) -> Option<Arc<SessionHandle<S>>> {
        let slot = self.slots.lock().remove(&id)?;
        let handle = slot.get().cloned();
        if handle.is_some() {
            debug!(tx = %id, "session detached from registry");
        }
        handle
    }

    /// Returns the session of a transaction, if it has been created.
    pub fn lookup(&self, id: AmbientTxId) -> Option<Arc<SessionHandle<S>>> {
        self.slots.lock().get(&id).and_then(|s| s.get()).cloned()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|s| s.get().is_some())
            .count()
    }

    /// Returns true if no session is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Transactions that currently have a session.
    pub fn transaction_ids(&self) -> Vec<AmbientTxId> {
        self.slots
            .lock()
            .iter()
            .filter(|(_, s)| s.get().is_some())
            .map(|(id, _)| *id)
            .collect()
    }
}

fn detach<S: Session>(registry: &Weak<SessionRegistry<S>>, id: AmbientTxId) {
    if let Some(registry) = registry.upgrade() {
        registry.detach(id);
    }
}

impl<S: Session> fmt::Debug for SessionRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish_non_exhaustive()
    }
}
