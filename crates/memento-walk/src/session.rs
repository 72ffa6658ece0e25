//! Persistence/session collaborator
//!
//! The walks never touch live objects directly. Every read, write, lookup and
//! instantiation goes through a [`Session`] supplied by the caller at the call
//! boundary.

use memento_snapshot::{EncodedValue, Oid, StoreError, TypeName};
use std::fmt::Debug;

/// Result of resolving an identifier
#[derive(Debug, Clone)]
pub struct Resolved<H> {
    /// Live handle
    pub handle: H,

    /// Identifier as currently known to the session
    ///
    /// May carry a newer version token than the one requested.
    pub oid: Oid,
}

/// Live-object access and persistence
///
/// # Handles
/// `Handle` equality is identity equality for objects and value equality for
/// values. The reconciler relies on it to skip redundant setter calls and to
/// compute collection deltas.
pub trait Session {
    /// Live handle type
    type Handle: Clone + PartialEq + Debug;

    // identity

    /// Identifier of a live handle; `None` for pure values
    ///
    /// # Errors
    /// Returns error for handles the session does not know
    fn identify(&self, handle: &Self::Handle) -> Result<Option<Oid>, StoreError>;

    /// Runtime type of a live handle
    ///
    /// # Errors
    /// Returns error for handles the session does not know
    fn type_of(&self, handle: &Self::Handle) -> Result<TypeName, StoreError>;

    /// Human-readable title, used as a display hint
    fn title(&self, _handle: &Self::Handle) -> Option<String> {
        None
    }

    // persistence

    /// Load a live handle by identifier
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if the object is gone, [`StoreError::Conflict`]
    /// if the requested version is stale
    fn resolve(&self, oid: &Oid) -> Result<Resolved<Self::Handle>, StoreError>;

    /// Instantiate a fresh, transient object
    ///
    /// # Errors
    /// Returns error if the type cannot be instantiated
    fn create(&self, type_name: &TypeName) -> Result<Self::Handle, StoreError>;

    // values

    /// Canonical string encoding of a value
    ///
    /// # Errors
    /// Returns error if the handle is not an encodable value
    fn encode(&self, type_name: &TypeName, value: &Self::Handle)
        -> Result<EncodedValue, StoreError>;

    /// Decode a value from its canonical encoding
    ///
    /// # Errors
    /// Returns error on malformed encodings
    fn decode(&self, type_name: &TypeName, encoded: &EncodedValue)
        -> Result<Self::Handle, StoreError>;

    /// Opaque byte copy of a handle
    ///
    /// # Errors
    /// Returns error if the handle cannot be copied
    fn serialize(&self, handle: &Self::Handle) -> Result<Vec<u8>, StoreError>;

    /// Rebuild a handle from an opaque byte copy
    ///
    /// # Errors
    /// Returns error on malformed input
    fn deserialize(&self, type_name: &TypeName, bytes: &[u8])
        -> Result<Self::Handle, StoreError>;

    // one-to-one

    /// Current value of a property
    ///
    /// # Errors
    /// Returns error if the member cannot be read
    fn get(&self, owner: &Self::Handle, name: &str) -> Result<Option<Self::Handle>, StoreError>;

    /// Overwrite a property
    ///
    /// # Errors
    /// Returns error if the member cannot be written
    fn set(
        &self,
        owner: &Self::Handle,
        name: &str,
        value: Option<Self::Handle>,
    ) -> Result<(), StoreError>;

    // one-to-many

    /// Current elements of a collection association, in order
    ///
    /// # Errors
    /// Returns error if the member cannot be read
    fn elements(&self, owner: &Self::Handle, name: &str) -> Result<Vec<Self::Handle>, StoreError>;

    /// Add one element through the association's add operation
    ///
    /// # Errors
    /// Returns error if the member cannot be written
    fn add_element(
        &self,
        owner: &Self::Handle,
        name: &str,
        element: Self::Handle,
    ) -> Result<(), StoreError>;

    /// Remove one element through the association's remove operation
    ///
    /// # Errors
    /// Returns error if the member cannot be written
    fn remove_element(
        &self,
        owner: &Self::Handle,
        name: &str,
        element: &Self::Handle,
    ) -> Result<(), StoreError>;

    // free collections

    /// Fresh, empty collection of a collection type
    ///
    /// # Errors
    /// Returns error if the type cannot be instantiated
    fn create_list(&self, type_name: &TypeName) -> Result<Self::Handle, StoreError>;

    /// Current elements of a free collection
    ///
    /// # Errors
    /// Returns error if the handle is not a collection
    fn list_elements(&self, list: &Self::Handle) -> Result<Vec<Self::Handle>, StoreError>;

    /// Append to a free collection
    ///
    /// # Errors
    /// Returns error if the handle is not a collection
    fn list_push(&self, list: &Self::Handle, element: Self::Handle) -> Result<(), StoreError>;

    /// Remove from a free collection
    ///
    /// # Errors
    /// Returns error if the handle is not a collection
    fn list_remove(&self, list: &Self::Handle, element: &Self::Handle) -> Result<(), StoreError>;
}
