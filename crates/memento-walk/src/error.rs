//! Error types for capture and apply walks

use memento_snapshot::{NodeKind, Oid, RegistryError, StoreError, TypeName};

/// Errors raised by the marshaller and the unmarshaller
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalkError {
    /// Snapshot does not fit the metadata or violates node invariants
    #[error("malformed snapshot: {0}")]
    Malformed(String),

    /// Node kind does not match what the declared type requires
    #[error("malformed snapshot: {type_name} expects a {expected} node, found {found}")]
    KindMismatch {
        type_name: TypeName,
        expected: NodeKind,
        found: NodeKind,
    },

    /// Existing live object is not the one the snapshot describes
    #[error("identity mismatch: snapshot describes {expected}, live object is {actual}")]
    IdentityMismatch { expected: Oid, actual: String },

    /// Value cannot be captured at all
    #[error("unsupported type {0}: neither value-typed, identifiable nor serializable")]
    UnsupportedType(TypeName),

    /// Nesting exceeded the configured bound
    #[error("walk exceeded maximum depth {0}")]
    DepthExceeded(usize),

    /// Descriptor lookup failed
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Session collaborator failed
    #[error("session error: {0}")]
    Store(#[from] StoreError),
}

impl WalkError {
    /// True if the underlying cause is a missing object
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound(_)))
    }
}
