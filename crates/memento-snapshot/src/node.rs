//! Snapshot nodes
//!
//! [`SnapshotNode`] is the closed set of captured-state shapes produced by the
//! marshaller and consumed by the unmarshaller. Nodes are immutable values;
//! a node tree carries no live references and can cross any transport that
//! preserves node kind, field order and element order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::descriptor::TypeName;
use crate::error::NodeCodecError;
use crate::oid::Oid;
use crate::value::{EncodedValue, Payload};

/// One piece of captured state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnapshotNode {
    /// Reference to an object captured elsewhere, or deliberately not inlined
    Bare {
        /// Referenced identifier
        oid: Oid,
        /// Declared type
        #[serde(rename = "type")]
        type_name: TypeName,
    },

    /// Field state of one non-collection object
    Object(ObjectData),

    /// Elements of a collection-valued owner
    Collection(CollectionData),

    /// Value-typed leaf with no identity
    Standalone {
        /// Value type
        #[serde(rename = "type")]
        type_name: TypeName,
        /// Encoded or opaque payload
        payload: Payload,
    },

    /// Explicit absence
    Null,
}

/// Captured fields of one object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectData {
    /// Identifier of the captured object
    ///
    /// Keeps the version token the session reported at capture time.
    /// Equality ignores it but the JSON form does not, so two snapshots of
    /// one object taken at different versions compare equal yet serialize
    /// differently.
    pub oid: Oid,

    /// Runtime type of the captured object
    #[serde(rename = "type")]
    pub type_name: TypeName,

    /// Field name -> captured state, in declared order
    pub fields: IndexMap<String, FieldValue>,
}

/// Captured elements of one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionData {
    /// Identifier of the collection (parented under its owner for associations)
    pub oid: Oid,

    /// Collection type for free collections, element type for associations
    #[serde(rename = "type")]
    pub type_name: TypeName,

    /// Elements in order
    pub elements: Vec<SnapshotNode>,
}

/// State of one captured field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Inline value encoding
    Encoded(EncodedValue),

    /// Nested node
    Node(SnapshotNode),
}

impl FieldValue {
    /// Nested node, if any
    #[inline]
    #[must_use]
    pub fn as_node(&self) -> Option<&SnapshotNode> {
        match self {
            Self::Node(node) => Some(node),
            Self::Encoded(_) => None,
        }
    }

    /// Inline encoding, if any
    #[inline]
    #[must_use]
    pub fn as_encoded(&self) -> Option<&EncodedValue> {
        match self {
            Self::Encoded(value) => Some(value),
            Self::Node(_) => None,
        }
    }
}

impl From<SnapshotNode> for FieldValue {
    fn from(node: SnapshotNode) -> Self {
        Self::Node(node)
    }
}

impl From<EncodedValue> for FieldValue {
    fn from(value: EncodedValue) -> Self {
        Self::Encoded(value)
    }
}

/// Discriminant of a [`SnapshotNode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// [`SnapshotNode::Bare`]
    Bare,
    /// [`SnapshotNode::Object`]
    Object,
    /// [`SnapshotNode::Collection`]
    Collection,
    /// [`SnapshotNode::Standalone`]
    Standalone,
    /// [`SnapshotNode::Null`]
    Null,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Bare => "bare",
            Self::Object => "object",
            Self::Collection => "collection",
            Self::Standalone => "standalone",
            Self::Null => "null",
        };
        f.write_str(name)
    }
}

impl SnapshotNode {
    /// Bare reference
    #[inline]
    #[must_use]
    pub fn bare(oid: Oid, type_name: impl Into<TypeName>) -> Self {
        Self::Bare {
            oid,
            type_name: type_name.into(),
        }
    }

    /// Standalone encoded value
    #[inline]
    #[must_use]
    pub fn encoded(type_name: impl Into<TypeName>, value: impl Into<EncodedValue>) -> Self {
        Self::Standalone {
            type_name: type_name.into(),
            payload: Payload::Encoded(value.into()),
        }
    }

    /// Discriminant
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Bare { .. } => NodeKind::Bare,
            Self::Object(_) => NodeKind::Object,
            Self::Collection(_) => NodeKind::Collection,
            Self::Standalone { .. } => NodeKind::Standalone,
            Self::Null => NodeKind::Null,
        }
    }

    /// Identifier carried by the node; standalone values and nulls have none
    #[must_use]
    pub fn oid(&self) -> Option<&Oid> {
        match self {
            Self::Bare { oid, .. } => Some(oid),
            Self::Object(data) => Some(&data.oid),
            Self::Collection(data) => Some(&data.oid),
            Self::Standalone { .. } | Self::Null => None,
        }
    }

    /// Declared type carried by the node
    #[must_use]
    pub fn type_name(&self) -> Option<&TypeName> {
        match self {
            Self::Bare { type_name, .. } | Self::Standalone { type_name, .. } => Some(type_name),
            Self::Object(data) => Some(&data.type_name),
            Self::Collection(data) => Some(&data.type_name),
            Self::Null => None,
        }
    }

    /// True for [`SnapshotNode::Null`]
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Direct child nodes, in order
    #[must_use]
    pub fn children(&self) -> Vec<&SnapshotNode> {
        match self {
            Self::Object(data) => data.fields.values().filter_map(FieldValue::as_node).collect(),
            Self::Collection(data) => data.elements.iter().collect(),
            Self::Bare { .. } | Self::Standalone { .. } | Self::Null => Vec::new(),
        }
    }

    /// Depth-first pre-order visit of this node and every descendant
    pub fn visit<'a>(&'a self, visitor: &mut impl FnMut(&'a SnapshotNode)) {
        visitor(self);
        for child in self.children() {
            child.visit(visitor);
        }
    }

    /// Number of nodes in the tree carrying full object or collection data
    #[must_use]
    pub fn full_node_count(&self) -> usize {
        let mut count = 0;
        self.visit(&mut |node| {
            if matches!(node, Self::Object(_) | Self::Collection(_)) {
                count += 1;
            }
        });
        count
    }

    /// Find the full (object or collection) node for an identifier
    #[must_use]
    pub fn find_full_node(&self, oid: &Oid) -> Option<&SnapshotNode> {
        let mut found = None;
        self.visit(&mut |node| {
            if found.is_none()
                && matches!(node, Self::Object(_) | Self::Collection(_))
                && node.oid() == Some(oid)
            {
                found = Some(node);
            }
        });
        found
    }

    /// Indented human-readable rendering, for logs and test failures
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = String::new();
        self.describe_into(&mut out, 0);
        out
    }

    fn describe_into(&self, out: &mut String, depth: usize) {
        let pad = "  ".repeat(depth);
        match self {
            Self::Bare { oid, type_name } => {
                let _ = writeln!(out, "{pad}bare {type_name} {oid}");
            }
            Self::Object(data) => {
                let _ = writeln!(out, "{pad}object {} {}", data.type_name, data.oid);
                for (name, field) in &data.fields {
                    match field {
                        FieldValue::Encoded(value) => {
                            let _ = writeln!(out, "{pad}  {name} = {value:?}");
                        }
                        FieldValue::Node(node) => {
                            let _ = writeln!(out, "{pad}  {name}:");
                            node.describe_into(out, depth + 2);
                        }
                    }
                }
            }
            Self::Collection(data) => {
                let _ = writeln!(
                    out,
                    "{pad}collection {} {} [{}]",
                    data.type_name,
                    data.oid,
                    data.elements.len()
                );
                for element in &data.elements {
                    element.describe_into(out, depth + 1);
                }
            }
            Self::Standalone { type_name, payload } => match payload {
                Payload::Encoded(value) => {
                    let _ = writeln!(out, "{pad}value {type_name} {value:?}");
                }
                Payload::Serialized(bytes) => {
                    let _ = writeln!(out, "{pad}value {type_name} <{} bytes>", bytes.len());
                }
            },
            Self::Null => {
                let _ = writeln!(out, "{pad}null");
            }
        }
    }

    /// Encode as JSON for transport
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String, NodeCodecError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON
    ///
    /// # Errors
    /// Returns error on malformed input
    pub fn from_json(source: &str) -> Result<Self, NodeCodecError> {
        Ok(serde_json::from_str(source)?)
    }
}

impl ObjectData {
    /// Empty field set for `oid`
    #[inline]
    #[must_use]
    pub fn new(oid: Oid, type_name: impl Into<TypeName>) -> Self {
        Self {
            oid,
            type_name: type_name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Append a field
    #[inline]
    #[must_use]
    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Captured field by name
    #[inline]
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

impl CollectionData {
    /// Empty element list for `oid`
    #[inline]
    #[must_use]
    pub fn new(oid: Oid, type_name: impl Into<TypeName>) -> Self {
        Self {
            oid,
            type_name: type_name.into(),
            elements: Vec::new(),
        }
    }

    /// Append an element
    #[inline]
    #[must_use]
    pub fn with_element(mut self, element: SnapshotNode) -> Self {
        self.elements.push(element);
        self
    }
}

impl From<ObjectData> for SnapshotNode {
    fn from(data: ObjectData) -> Self {
        Self::Object(data)
    }
}

impl From<CollectionData> for SnapshotNode {
    fn from(data: CollectionData) -> Self {
        Self::Collection(data)
    }
}
