//! Error types for driver operations.

use thiserror::Error;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors that can occur in driver operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// A unique index (including `_id`) rejected a write.
    #[error("duplicate key in {namespace} on index {index}: {key}")]
    DuplicateKey {
        /// Namespace the write targeted.
        namespace: String,
        /// Name of the violated index.
        index: String,
        /// Rendered key value.
        key: String,
    },

    /// Database or collection does not exist.
    #[error("namespace not found: {namespace}")]
    NamespaceNotFound {
        /// The missing namespace.
        namespace: String,
    },

    /// Collection already exists.
    #[error("namespace already exists: {namespace}")]
    NamespaceExists {
        /// The existing namespace.
        namespace: String,
    },

    /// Index does not exist.
    #[error("index not found: {name}")]
    IndexNotFound {
        /// Name of the missing index.
        name: String,
    },

    /// Commit or abort requested while no transaction is open on the session.
    #[error("no transaction started on session {session}")]
    NoTransactionStarted {
        /// Session identifier.
        session: String,
    },

    /// A transaction is already open on the session.
    #[error("transaction already in progress on session {session}")]
    TransactionInProgress {
        /// Session identifier.
        session: String,
    },

    /// The session has been ended and can no longer be used.
    #[error("session {session} has ended")]
    SessionEnded {
        /// Session identifier.
        session: String,
    },

    /// The operation cannot run inside a multi-document transaction.
    #[error("operation not supported in transaction: {operation}")]
    NotSupportedInTransaction {
        /// Name of the rejected operation.
        operation: String,
    },

    /// An update document could not be applied.
    #[error("invalid update: {message}")]
    InvalidUpdate {
        /// Description of the problem.
        message: String,
    },

    /// An argument was rejected.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// Document encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// A failure produced by a fault plan.
    #[error("injected failure: {operation}")]
    Injected {
        /// The operation that was made to fail.
        operation: String,
    },
}

impl DriverError {
    /// Creates a duplicate key error.
    pub fn duplicate_key(
        namespace: impl ToString,
        index: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::DuplicateKey {
            namespace: namespace.to_string(),
            index: index.into(),
            key: key.into(),
        }
    }

    /// Creates a namespace not found error.
    pub fn namespace_not_found(namespace: impl ToString) -> Self {
        Self::NamespaceNotFound {
            namespace: namespace.to_string(),
        }
    }

    /// Creates a namespace exists error.
    pub fn namespace_exists(namespace: impl ToString) -> Self {
        Self::NamespaceExists {
            namespace: namespace.to_string(),
        }
    }

    /// Creates a not-supported-in-transaction error.
    pub fn not_supported_in_transaction(operation: impl Into<String>) -> Self {
        Self::NotSupportedInTransaction {
            operation: operation.into(),
        }
    }

    /// Creates an invalid update error.
    pub fn invalid_update(message: impl Into<String>) -> Self {
        Self::InvalidUpdate {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an injected failure error.
    pub fn injected(operation: impl Into<String>) -> Self {
        Self::Injected {
            operation: operation.into(),
        }
    }

    /// Returns true if this is a duplicate key error.
    #[must_use]
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}
