//! Core type definitions.

use std::fmt;
use uuid::Uuid;

/// Identifier of one logical ambient transaction.
///
/// Identifiers are random, so ids minted by unrelated root contexts never
/// collide in a shared registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AmbientTxId(Uuid);

impl AmbientTxId {
    /// Mints a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AmbientTxId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AmbientTxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ambient:{}", self.0)
    }
}
