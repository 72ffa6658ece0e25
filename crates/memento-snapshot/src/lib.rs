//! Memento Snapshot Model
//!
//! Identifier-addressed, serializable snapshots of live object graphs.
//!
//! # Core Concepts
//!
//! - [`Oid`]: Value-compared object identifier (persistent, transient, parented)
//! - [`SnapshotNode`]: Closed sum type of captured state
//! - [`EncodedValue`]: Canonical string encoding of a value-typed instance
//! - [`TypeDescriptor`]: Registration-time metadata for one type
//! - [`TypeRegistry`]: Descriptor lookup collaborator
//!
//! # Example
//!
//! ```rust
//! use memento_snapshot::{EncodedValue, ObjectData, Oid, SnapshotNode};
//!
//! let node: SnapshotNode = ObjectData::new(Oid::persistent("Customer", 1_i64), "Customer")
//!     .with_field("age", EncodedValue::new("42"))
//!     .into();
//!
//! let json = node.to_json().unwrap();
//! assert_eq!(SnapshotNode::from_json(&json).unwrap(), node);
//! ```

#![warn(unreachable_pub)]

mod descriptor;
mod error;
mod node;
mod oid;
mod value;

// Re-exports
pub use descriptor::{
    Association, AssociationKind, CollectionShape, DescriptorTable, TypeDescriptor, TypeName,
    TypeRegistry,
};
pub use error::{NodeCodecError, OidParseError, RegistryError, StoreError};
pub use node::{CollectionData, FieldValue, NodeKind, ObjectData, SnapshotNode};
pub use oid::{Durability, Oid, OidKey};
pub use value::{hex_bytes, EncodedValue, Payload};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
