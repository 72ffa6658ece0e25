//! Memento Walks
//!
//! Depth-first walks between live object graphs and snapshot node trees.
//!
//! # Core Concepts
//!
//! - [`Session`]: Persistence/session collaborator, passed in by the caller
//! - [`Marshaller`]: Live graph -> [`SnapshotNode`](memento_snapshot::SnapshotNode)
//! - [`Unmarshaller`]: Node tree -> fresh live graph, or field-level update of
//!   an existing one
//! - [`CollectionDelta`]: Add/remove difference applied to collections
//! - [`WalkConfig`]: Depth bound and unknown-field policy
//!
//! # Example
//!
//! ```rust,ignore
//! use memento_walk::{Marshaller, Unmarshaller};
//!
//! let node = Marshaller::new(&registry, &session).capture(&customer)?;
//! let copy = Unmarshaller::new(&registry, &session).reconstruct(&node)?;
//!
//! // later: re-apply edited state onto the live object
//! Unmarshaller::new(&registry, &session).update(&customer, &edited)?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod config;
mod delta;
mod error;
mod marshal;
mod session;
mod unmarshal;

// Re-exports
pub use config::WalkConfig;
pub use delta::{CollectionDelta, DeltaOperation};
pub use error::WalkError;
pub use marshal::{CaptureReport, Marshaller};
pub use session::{Resolved, Session};
pub use unmarshal::{ApplyReport, Unmarshaller};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
