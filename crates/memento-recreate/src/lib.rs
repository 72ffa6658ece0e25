//! Memento Recreation
//!
//! Serializable stand-ins for live handles, recreated lazily.
//!
//! # Strategies
//!
//! Chosen once per handle when the memento is built:
//!
//! 1. **Encodable**: value-typed handles keep their canonical encoding
//! 2. **Lookup**: identifiable handles keep their identifier (plus optional
//!    title and UI hint key) and are resolved through the session; the stored
//!    identifier follows version rewrites so a retried resolve converges
//! 3. **Generically serialized**: anything else that can be copied as bytes
//!
//! Handles that fit none of these fail at construction with
//! [`MementoError::UnsupportedType`].
//!
//! # Example
//!
//! ```rust,ignore
//! use memento_recreate::Memento;
//!
//! let mut memento = Memento::capture(&registry, &session, &customer)?;
//! let json = memento.to_json()?;
//!
//! // later, possibly in another request
//! let mut memento = Memento::from_json(&json)?;
//! let customer = memento.resolve(&session)?.single();
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod error;
mod memento;
mod strategy;

// Re-exports
pub use error::MementoError;
pub use memento::{Memento, Recreated, ScalarMemento};
pub use strategy::{Recreation, StrategyKind};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
