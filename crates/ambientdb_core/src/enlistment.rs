//! Enlistment adapter.
//!
//! Lets an ambient transaction drive a registered session through its
//! completion callbacks.

use crate::error::TxResult;
use crate::registry::SessionHandle;
use crate::scope::{ResourceParticipant, Vote};
use ambientdb_driver::Session;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

type Unregister = Box<dyn FnOnce() + Send>;

/// The participant enlisted for one session handle.
///
/// Every callback unregisters before it commits or aborts and disposes the
/// handle afterwards. Both happen exactly once across all callbacks.
pub struct Enlistment<S: Session> {
    handle: Arc<SessionHandle<S>>,
    unregister: Mutex<Option<Unregister>>,
}

impl<S: Session> Enlistment<S> {
    /// Creates an enlistment that calls `unregister` when the transaction
    /// starts completing.
    pub fn new(handle: Arc<SessionHandle<S>>, unregister: impl FnOnce() + Send + 'static) -> Self {
        Self {
            handle,
            unregister: Mutex::new(Some(Box::new(unregister))),
        }
    }

    /// The enlisted session handle.
    pub fn handle(&self) -> &Arc<SessionHandle<S>> {
        &self.handle
    }

    /// Returns true once the enlistment has unregistered.
    pub fn is_unregistered(&self) -> bool {
        self.unregister.lock().is_none()
    }

    fn unregister(&self) {
        // Take the callback before running it so the lock is not held.
        let callback = self.unregister.lock().take();
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl<S: Session> ResourceParticipant for Enlistment<S> {
    fn prepare(&self) -> Vote {
        trace!(tx = %self.handle.transaction_id(), "prepared");
        Vote::Prepared
    }

    // Unregister before the outcome so no new caller can pick up a session
    // whose transaction is ending.
    fn commit(&self) -> TxResult<()> {
        self.unregister();
        let result = self.handle.commit();
        match &result {
            Ok(()) => debug!(tx = %self.handle.transaction_id(), "session committed"),
            Err(e) => warn!(tx = %self.handle.transaction_id(), error = %e, "session commit failed"),
        }
        self.handle.dispose();
        result
    }

    fn rollback(&self) -> TxResult<()> {
        self.unregister();
        let result = self.handle.abort();
        debug!(tx = %self.handle.transaction_id(), "session rolled back");
        self.handle.dispose();
        result
    }

    fn in_doubt(&self) -> TxResult<()> {
        debug!(tx = %self.handle.transaction_id(), "outcome in doubt, aborting session");
        self.rollback()
    }
}

impl<S: Session> fmt::Debug for Enlistment<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enlistment")
            .field("handle", &self.handle)
            .field("unregistered", &self.is_unregistered())
            .finish()
    }
}
