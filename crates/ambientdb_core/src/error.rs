//! Error types for ambientdb core.

use crate::scope::TransactionStatus;
use crate::types::AmbientTxId;
use ambientdb_driver::DriverError;
use thiserror::Error;

/// Result type for core operations.
pub type TxResult<T> = Result<T, TxError>;

/// Errors raised by scopes, the session registry and the facade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    /// A session was requested but the context carries no ambient transaction.
    #[error("no ambient transaction is active")]
    NoAmbientTransaction,

    /// The ambient transaction can no longer accept work.
    #[error("transaction {id} is not active (status: {status:?})")]
    TransactionNotActive {
        /// The transaction.
        id: AmbientTxId,
        /// Its current status.
        status: TransactionStatus,
    },

    /// The transaction was rolled back instead of committed.
    #[error("transaction {id} aborted: {reason}")]
    TransactionAborted {
        /// The transaction.
        id: AmbientTxId,
        /// Why it was rolled back.
        reason: String,
    },

    /// The transaction outlived its scope timeout.
    #[error("transaction {id} timed out")]
    Timeout {
        /// The transaction.
        id: AmbientTxId,
    },

    /// A pinned session was requested from a facade bound to the ambient registry.
    #[error("facade is not pinned to an explicit session")]
    NotPinned,

    /// `complete()` was called twice on the same scope.
    #[error("transaction scope already completed")]
    ScopeAlreadyCompleted,

    /// The transaction outcome is unknown after a partial commit.
    #[error("transaction {id} outcome is in doubt")]
    InDoubt {
        /// The transaction.
        id: AmbientTxId,
    },

    /// Error reported by the driver, passed through unchanged.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl TxError {
    /// Creates a transaction-aborted error.
    pub fn aborted(id: AmbientTxId, reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            id,
            reason: reason.into(),
        }
    }

    /// Returns the driver error, if this is one.
    pub fn as_driver(&self) -> Option<&DriverError> {
        match self {
            Self::Driver(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_errors_display_unchanged() {
        let inner = DriverError::injected("commitTransaction");
        let err = TxError::from(inner.clone());
        assert_eq!(err.to_string(), inner.to_string());
        assert_eq!(err.as_driver(), Some(&inner));
    }

    #[test]
    fn aborted_carries_reason() {
        let id = AmbientTxId::new();
        let err = TxError::aborted(id, "doomed");
        assert_eq!(err.to_string(), format!("transaction {id} aborted: doomed"));
        assert!(err.as_driver().is_none());
    }
}
