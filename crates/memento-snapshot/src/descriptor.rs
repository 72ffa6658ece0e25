//! Type descriptors
//!
//! A [`TypeDescriptor`] tells the walks whether a type is a value, a
//! collection or an entity, and lists its associations in declared order.
//! Descriptors are plain data built ahead of time (in code or from a YAML/JSON
//! document) and looked up through the [`TypeRegistry`] trait.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

use crate::error::RegistryError;

/// Logical type name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeName(String);

impl TypeName {
    /// Create a type name
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// String view
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TypeName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TypeName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&TypeName> for TypeName {
    fn from(value: &TypeName) -> Self {
        value.clone()
    }
}

/// Cardinality of an association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    /// Single-valued property
    OneToOne,

    /// Collection-valued association
    OneToMany,
}

/// One association (property or collection) of a type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    /// Member name
    pub name: String,

    /// Cardinality
    pub kind: AssociationKind,

    /// Declared target type (element type for one-to-many)
    #[serde(rename = "type")]
    pub type_name: TypeName,

    /// Backed by persistent state
    #[serde(default = "default_true")]
    pub persisted: bool,

    /// Writable through a setter / add-remove pair
    #[serde(default = "default_true")]
    pub has_setter: bool,

    /// Derived or contributed member; never part of the object's own state
    #[serde(default)]
    pub derived: bool,
}

fn default_true() -> bool {
    true
}

impl Association {
    /// Single-valued property, persisted and writable
    #[must_use]
    pub fn one_to_one(name: &str, type_name: impl Into<TypeName>) -> Self {
        Self {
            name: name.to_string(),
            kind: AssociationKind::OneToOne,
            type_name: type_name.into(),
            persisted: true,
            has_setter: true,
            derived: false,
        }
    }

    /// Collection-valued association, persisted and writable
    #[must_use]
    pub fn one_to_many(name: &str, element_type: impl Into<TypeName>) -> Self {
        Self {
            kind: AssociationKind::OneToMany,
            ..Self::one_to_one(name, element_type)
        }
    }

    /// Mark as not backed by persistent state
    #[inline]
    #[must_use]
    pub fn not_persisted(mut self) -> Self {
        self.persisted = false;
        self
    }

    /// Mark as accessor-only (no setter)
    #[inline]
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.has_setter = false;
        self
    }

    /// Mark as derived/contributed
    #[inline]
    #[must_use]
    pub fn derived(mut self) -> Self {
        self.derived = true;
        self
    }

    /// True for one-to-many associations
    #[inline]
    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.kind == AssociationKind::OneToMany
    }

    /// Whether this member takes part in capture and apply
    ///
    /// Derived members are never captured. A member that is neither persisted
    /// nor writable cannot be round-tripped. Capture and apply both consult
    /// this single predicate.
    #[inline]
    #[must_use]
    pub fn is_captured(&self) -> bool {
        !self.derived && (self.persisted || self.has_setter)
    }
}

/// Shape of a collection-typed type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionShape {
    /// Declared element type
    pub element_type: TypeName,
}

/// Metadata for one type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Type name
    pub name: TypeName,

    /// Instances are values with a canonical string encoding
    #[serde(default)]
    pub value: bool,

    /// Instances are addressable by an identifier
    #[serde(default)]
    pub identifiable: bool,

    /// Instances can be copied byte-for-byte
    #[serde(default)]
    pub serializable: bool,

    /// Present for collection-typed types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<CollectionShape>,

    /// Associations in declared order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associations: Vec<Association>,
}

impl TypeDescriptor {
    /// Value type with a string codec
    #[must_use]
    pub fn value(name: impl Into<TypeName>) -> Self {
        Self {
            value: true,
            ..Self::bare(name)
        }
    }

    /// Identifiable entity type
    #[must_use]
    pub fn entity(name: impl Into<TypeName>) -> Self {
        Self {
            identifiable: true,
            ..Self::bare(name)
        }
    }

    /// Collection type holding `element_type`
    #[must_use]
    pub fn collection(name: impl Into<TypeName>, element_type: impl Into<TypeName>) -> Self {
        Self {
            collection: Some(CollectionShape {
                element_type: element_type.into(),
            }),
            ..Self::bare(name)
        }
    }

    /// Type that is only copyable byte-for-byte
    #[must_use]
    pub fn serializable(name: impl Into<TypeName>) -> Self {
        Self {
            serializable: true,
            ..Self::bare(name)
        }
    }

    /// Type with no capabilities at all
    #[must_use]
    pub fn bare(name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            value: false,
            identifiable: false,
            serializable: false,
            collection: None,
            associations: Vec::new(),
        }
    }

    /// Append an association
    #[inline]
    #[must_use]
    pub fn with(mut self, association: Association) -> Self {
        self.associations.push(association);
        self
    }

    /// True if value-codec-capable
    #[inline]
    #[must_use]
    pub fn is_value(&self) -> bool {
        self.value
    }

    /// True for collection-typed, non-value types
    #[inline]
    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.collection.is_some() && !self.value
    }

    /// Look up an association by name
    #[must_use]
    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.name == name)
    }

    /// Associations that take part in capture and apply, in declared order
    pub fn captured_associations(&self) -> impl Iterator<Item = &Association> {
        self.associations.iter().filter(|a| a.is_captured())
    }
}

/// Source of type descriptors
pub trait TypeRegistry {
    /// Look up a descriptor
    fn lookup(&self, type_name: &TypeName) -> Option<&TypeDescriptor>;

    /// Look up a descriptor, failing for unknown types
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownType`] if nothing is registered
    fn describe(&self, type_name: &TypeName) -> Result<&TypeDescriptor, RegistryError> {
        self.lookup(type_name)
            .ok_or_else(|| RegistryError::UnknownType(type_name.clone()))
    }
}

/// Serialized form of a descriptor table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TableDocument {
    #[serde(default)]
    types: Vec<TypeDescriptor>,
}

/// In-memory descriptor table
#[derive(Debug, Clone, Default)]
pub struct DescriptorTable {
    types: HashMap<TypeName, TypeDescriptor>,
}

impl DescriptorTable {
    /// Create an empty table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor
    ///
    /// # Errors
    /// Returns [`RegistryError::Duplicate`] if the name is already taken
    pub fn register(&mut self, descriptor: TypeDescriptor) -> Result<(), RegistryError> {
        if self.types.contains_key(&descriptor.name) {
            return Err(RegistryError::Duplicate(descriptor.name));
        }
        self.types.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Builder-style registration
    ///
    /// # Errors
    /// See [`DescriptorTable::register`]
    pub fn with(mut self, descriptor: TypeDescriptor) -> Result<Self, RegistryError> {
        self.register(descriptor)?;
        Ok(self)
    }

    /// Load a table from a YAML document with a top-level `types` list
    ///
    /// # Errors
    /// Returns error on malformed YAML or duplicate names
    pub fn from_yaml(source: &str) -> Result<Self, RegistryError> {
        let doc: TableDocument = serde_yaml::from_str(source)
            .map_err(|e| RegistryError::Parse(e.to_string()))?;
        Self::from_document(doc)
    }

    /// Load a table from a JSON document with a top-level `types` list
    ///
    /// # Errors
    /// Returns error on malformed JSON or duplicate names
    pub fn from_json(source: &str) -> Result<Self, RegistryError> {
        let doc: TableDocument =
            serde_json::from_str(source).map_err(|e| RegistryError::Parse(e.to_string()))?;
        Self::from_document(doc)
    }

    fn from_document(doc: TableDocument) -> Result<Self, RegistryError> {
        let mut table = Self::new();
        for descriptor in doc.types {
            table.register(descriptor)?;
        }
        table.check_references()?;
        Ok(table)
    }

    /// Verify every association and element type is registered
    ///
    /// # Errors
    /// Returns [`RegistryError::DanglingType`] naming the first unknown type
    pub fn check_references(&self) -> Result<(), RegistryError> {
        for descriptor in self.types.values() {
            let referenced = descriptor
                .associations
                .iter()
                .map(|a| &a.type_name)
                .chain(descriptor.collection.iter().map(|c| &c.element_type));
            for type_name in referenced {
                if !self.types.contains_key(type_name) {
                    return Err(RegistryError::DanglingType {
                        owner: descriptor.name.clone(),
                        missing: type_name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Number of registered types
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True if nothing is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterate over registered descriptors
    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values()
    }
}

impl TypeRegistry for DescriptorTable {
    fn lookup(&self, type_name: &TypeName) -> Option<&TypeDescriptor> {
        self.types.get(type_name)
    }
}
