//! Error types for the snapshot data model and its collaborators

use crate::descriptor::TypeName;
use crate::oid::Oid;

/// Errors parsing the canonical identifier string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OidParseError {
    /// Empty input
    #[error("empty identifier")]
    Empty,

    /// Missing segment
    #[error("identifier is missing its {0}")]
    MissingSegment(&'static str),

    /// Unknown durability marker
    #[error("invalid durability marker '{0}' (expected 'P' or 'T')")]
    InvalidState(String),

    /// Numeric key that does not parse
    #[error("invalid numeric key '{0}'")]
    InvalidKey(String),

    /// Version token that does not parse
    #[error("invalid version token '{0}'")]
    InvalidVersion(String),

    /// Broken percent escape
    #[error("invalid escape sequence in '{0}'")]
    InvalidEscape(String),
}

/// Errors from the type descriptor registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Nothing registered under this name
    #[error("unknown type: {0}")]
    UnknownType(TypeName),

    /// Name registered twice
    #[error("type already registered: {0}")]
    Duplicate(TypeName),

    /// Association or element type not registered
    #[error("type '{owner}' references unregistered type '{missing}'")]
    DanglingType { owner: TypeName, missing: TypeName },

    /// Descriptor document could not be parsed
    #[error("descriptor document invalid: {0}")]
    Parse(String),
}

/// Errors raised by the persistence/session collaborator
///
/// The walks never catch these; they reach the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Identifier no longer denotes a live object
    #[error("object not found: {0}")]
    NotFound(Oid),

    /// Stale version token; `current` carries the up-to-date identifier
    #[error("concurrent modification of {requested}: current version is {current}")]
    Conflict { requested: Oid, current: Oid },

    /// Instantiation failed
    #[error("cannot create instance of {type_name}: {reason}")]
    Creation { type_name: TypeName, reason: String },

    /// Value codec failure
    #[error("cannot convert value of type {type_name}: {reason}")]
    Codec { type_name: TypeName, reason: String },

    /// Member access failure
    #[error("cannot access '{member}' on {type_name}: {reason}")]
    Access {
        type_name: TypeName,
        member: String,
        reason: String,
    },

    /// Handle does not belong to this session
    #[error("stale or foreign handle: {0}")]
    InvalidHandle(String),
}

/// Errors encoding or decoding a node tree for transport
#[derive(Debug, thiserror::Error)]
pub enum NodeCodecError {
    /// JSON failure
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
