//! Memento error types

use memento_snapshot::{RegistryError, StoreError, TypeName};

/// Errors raised when building, resolving or transporting mementos
#[derive(Debug, thiserror::Error)]
pub enum MementoError {
    /// Value is neither value-typed, identifiable nor serializable
    #[error("unsupported type {0}: no recreation strategy applies")]
    UnsupportedType(TypeName),

    /// Descriptor lookup failed
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Session collaborator failed
    #[error("session error: {0}")]
    Store(#[from] StoreError),

    /// JSON transport failed
    #[error("memento transport error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MementoError {
    /// True if the referenced object no longer exists
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound(_)))
    }

    /// True if the session reported a stale version token
    ///
    /// The memento has already refreshed its identifier when this is
    /// returned, so resolving again is expected to succeed.
    #[inline]
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::Conflict { .. }))
    }
}
