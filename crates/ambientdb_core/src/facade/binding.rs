//! Per-call session selection.

use crate::error::{TxError, TxResult};
use crate::registry::SessionRegistry;
use crate::scope::{Ambient, TransactionStatus};
use ambientdb_driver::{DriverResult, Session};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// How a facade finds the session for a call.
pub enum SessionBinding<S: Session> {
    /// Use the ambient transaction's session from the registry, or no
    /// session when the context has no transaction.
    Ambient(Arc<SessionRegistry<S>>),
    /// Always use this session.
    Pinned(Arc<S>),
}

impl<S: Session> SessionBinding<S> {
    /// Runs one operation through the right driver overload.
    ///
    /// `args` goes to whichever overload runs. A pinned binding always calls
    /// `bound` with its session. An ambient binding calls `plain` when `cx`
    /// has no transaction, without touching the registry; otherwise it gets
    /// or creates the transaction's session and calls `bound` with it. The
    /// call fails if the session's transaction completed in the meantime.
    pub fn run<A, T>(
        &self,
        cx: &Ambient,
        args: A,
        plain: impl FnOnce(A) -> DriverResult<T>,
        bound: impl FnOnce(&S, A) -> DriverResult<T>,
    ) -> TxResult<T> {
        match self {
            Self::Pinned(session) => Ok(bound(session, args)?),
            Self::Ambient(registry) => {
                if !cx.has_transaction() {
                    return Ok(plain(args)?);
                }
                let handle = registry.get_or_create(cx)?;
                trace!(
                    tx = %handle.transaction_id(),
                    session = %handle.session().id(),
                    "dispatching on ambient session"
                );
                let _active = handle.enter().ok_or_else(|| TxError::TransactionNotActive {
                    id: handle.transaction_id(),
                    status: cx.transaction_status().unwrap_or(TransactionStatus::Active),
                })?;
                Ok(bound(handle.session(), args)?)
            }
        }
    }

    /// The pinned session.
    ///
    /// # Errors
    ///
    /// `NotPinned` for an ambient binding.
    pub fn pinned_session(&self) -> TxResult<&Arc<S>> {
        match self {
            Self::Pinned(session) => Ok(session),
            Self::Ambient(_) => Err(TxError::NotPinned),
        }
    }

    /// The registry of an ambient binding.
    pub fn registry(&self) -> Option<&Arc<SessionRegistry<S>>> {
        match self {
            Self::Ambient(registry) => Some(registry),
            Self::Pinned(_) => None,
        }
    }

    /// Returns true for a pinned binding.
    pub fn is_pinned(&self) -> bool {
        matches!(self, Self::Pinned(_))
    }
}

impl<S: Session> Clone for SessionBinding<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Ambient(registry) => Self::Ambient(Arc::clone(registry)),
            Self::Pinned(session) => Self::Pinned(Arc::clone(session)),
        }
    }
}

impl<S: Session> fmt::Debug for SessionBinding<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ambient(registry) => f.debug_tuple("Ambient").field(registry).finish(),
            Self::Pinned(session) => f.debug_tuple("Pinned").field(&session.id()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{ScopeOption, TransactionScope};
    use ambientdb_driver::memory::{MemoryClient, MemorySession};
    use ambientdb_driver::{Client, SessionOptions};

    fn ambient_binding(client: &MemoryClient) -> SessionBinding<MemorySession> {
        SessionBinding::Ambient(SessionRegistry::for_client(client.clone()))
    }

    #[test]
    fn plain_path_without_transaction() {
        let client = MemoryClient::new();
        let binding = ambient_binding(&client);
        let path = binding
            .run(&Ambient::default(), (), |()| Ok("plain"), |_, ()| Ok("bound"))
            .unwrap();
        assert_eq!(path, "plain");
        assert!(binding.registry().unwrap().is_empty());
        assert_eq!(client.stats().sessions_started, 0);
    }

    #[test]
    fn bound_path_inside_transaction() {
        let client = MemoryClient::new();
        let binding = ambient_binding(&client);
        let scope = TransactionScope::begin(&Ambient::default(), ScopeOption::Required);
        let path = binding
            .run(scope.ambient(), 7, |_| Ok(0), |s, n| {
                assert!(s.in_transaction());
                Ok(n)
            })
            .unwrap();
        assert_eq!(path, 7);
        assert_eq!(binding.registry().unwrap().len(), 1);
    }

    #[test]
    fn pinned_ignores_context() {
        let client = MemoryClient::new();
        let session = Arc::new(client.start_session(&SessionOptions::default()).unwrap());
        let binding = SessionBinding::Pinned(Arc::clone(&session));
        let used = binding
            .run(&Ambient::default(), (), |()| Ok(None), |s, ()| Ok(Some(s.id())))
            .unwrap();
        assert_eq!(used, Some(session.id()));
        assert!(binding.is_pinned());
        assert!(binding.registry().is_none());
    }

    #[test]
    fn pinned_session_fails_loudly_for_ambient_binding() {
        let client = MemoryClient::new();
        assert_eq!(
            ambient_binding(&client).pinned_session().unwrap_err(),
            TxError::NotPinned
        );
    }
}
