//! Recreation strategies
//!
//! A [`Recreation`] is the part of a memento that knows how to get a live
//! handle back. The variant is chosen once, when the memento is built, from
//! the type's capabilities in this order: value codec, identity, generic
//! serialization.

use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};

use memento_snapshot::{hex_bytes, EncodedValue, Oid, StoreError, TypeName, TypeRegistry};
use memento_walk::Session;
use serde::{Deserialize, Serialize};

use crate::error::MementoError;

/// Discriminant of a [`Recreation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Decoded from a canonical string
    Encodable,

    /// Looked up by identifier
    Lookup,

    /// Rebuilt from opaque bytes
    GenericallySerialized,
}

impl Display for StrategyKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Encodable => "encodable",
            Self::Lookup => "lookup",
            Self::GenericallySerialized => "serialized",
        })
    }
}

/// How a memento recreates its live handle
///
/// # Equality
/// Same-strategy comparison looks at the stored payload only. A lookup is
/// equal to another lookup of the same identifier regardless of version
/// token, title or hint key. Different strategies never compare equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Recreation {
    /// Canonical string encoding of a value
    Encodable {
        /// Encoded value
        value: EncodedValue,
    },

    /// Identifier of an addressable object
    Lookup {
        /// Identifier, including the last version token seen
        oid: Oid,

        /// Display title at capture time
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,

        /// Caller-supplied UI hint key
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hint_key: Option<String>,
    },

    /// Opaque byte copy
    GenericallySerialized {
        /// Serialized bytes
        #[serde(with = "hex_bytes")]
        bytes: Vec<u8>,
    },
}

impl Recreation {
    /// Pick the strategy for `handle`, an instance of `type_name`
    ///
    /// A type that is both value-typed and identifiable becomes `Encodable`.
    /// Collection-typed handles are never copied as opaque bytes; see
    /// [`crate::Memento::capture`], which turns them into vectors.
    ///
    /// # Errors
    /// [`MementoError::UnsupportedType`] if no strategy applies; registry or
    /// session errors are propagated
    pub fn select<R, S>(
        registry: &R,
        session: &S,
        type_name: &TypeName,
        handle: &S::Handle,
    ) -> Result<Self, MementoError>
    where
        R: TypeRegistry + ?Sized,
        S: Session,
    {
        let descriptor = registry.describe(type_name)?;

        if descriptor.is_value() {
            return Ok(Self::Encodable {
                value: session.encode(type_name, handle)?,
            });
        }

        if descriptor.identifiable {
            if let Some(oid) = session.identify(handle)? {
                return Ok(Self::Lookup {
                    oid,
                    title: session.title(handle),
                    hint_key: None,
                });
            }
        }

        if descriptor.serializable && !descriptor.is_collection() {
            return Ok(Self::GenericallySerialized {
                bytes: session.serialize(handle)?,
            });
        }

        Err(MementoError::UnsupportedType(type_name.clone()))
    }

    /// Strategy discriminant
    #[must_use]
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Encodable { .. } => StrategyKind::Encodable,
            Self::Lookup { .. } => StrategyKind::Lookup,
            Self::GenericallySerialized { .. } => StrategyKind::GenericallySerialized,
        }
    }

    /// Stored identifier of a lookup
    #[must_use]
    pub fn oid(&self) -> Option<&Oid> {
        match self {
            Self::Lookup { oid, .. } => Some(oid),
            _ => None,
        }
    }

    /// Overwrite the stored identifier of a lookup
    ///
    /// Returns `false` (and changes nothing) for other strategies.
    pub fn refresh_oid(&mut self, fresh: Oid) -> bool {
        match self {
            Self::Lookup { oid, .. } => {
                *oid = fresh;
                true
            }
            _ => false,
        }
    }

    /// Recreate a live handle without touching stored state
    ///
    /// Returns `None` for a lookup, which has to go through
    /// [`Recreation::resolve`] so it can refresh its identifier.
    pub fn resolve_shared<S: Session>(
        &self,
        type_name: &TypeName,
        session: &S,
    ) -> Option<Result<S::Handle, MementoError>> {
        match self {
            Self::Encodable { value } => Some(session.decode(type_name, value).map_err(Into::into)),
            Self::GenericallySerialized { bytes } => {
                Some(session.deserialize(type_name, bytes).map_err(Into::into))
            }
            Self::Lookup { .. } => None,
        }
    }

    /// Recreate a live handle of type `type_name`
    ///
    /// A lookup stores whatever identifier the session hands back, both the
    /// rewritten one on success and the current one reported with a
    /// version conflict.
    ///
    /// # Errors
    /// Session errors are propagated unchanged
    pub fn resolve<S: Session>(
        &mut self,
        type_name: &TypeName,
        session: &S,
    ) -> Result<S::Handle, MementoError> {
        match self {
            Self::Encodable { value } => Ok(session.decode(type_name, value)?),
            Self::GenericallySerialized { bytes } => Ok(session.deserialize(type_name, bytes)?),
            Self::Lookup { oid, .. } => match session.resolve(oid) {
                Ok(resolved) => {
                    if resolved.oid.version() != oid.version() {
                        tracing::debug!("Lookup of {} rewritten to {}", oid, resolved.oid);
                    }
                    *oid = resolved.oid;
                    Ok(resolved.handle)
                }
                Err(StoreError::Conflict { requested, current }) => {
                    tracing::warn!("Stale lookup {}, refreshing to {}", requested, current);
                    *oid = current.clone();
                    Err(StoreError::Conflict { requested, current }.into())
                }
                Err(err) => Err(err.into()),
            },
        }
    }
}

impl PartialEq for Recreation {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Encodable { value: a }, Self::Encodable { value: b }) => a == b,
            (Self::Lookup { oid: a, .. }, Self::Lookup { oid: b, .. }) => a == b,
            (Self::GenericallySerialized { bytes: a }, Self::GenericallySerialized { bytes: b }) => {
                a == b
            }
            _ => false,
        }
    }
}

impl Eq for Recreation {}

impl Hash for Recreation {
    fn hash<T: Hasher>(&self, state: &mut T) {
        self.kind().hash(state);
        match self {
            Self::Encodable { value } => value.hash(state),
            Self::Lookup { oid, .. } => oid.hash(state),
            Self::GenericallySerialized { bytes } => bytes.hash(state),
        }
    }
}

impl Display for Recreation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encodable { value } => write!(f, "\"{value}\""),
            Self::Lookup { oid, title, .. } => match title {
                Some(title) => write!(f, "{oid} ({title})"),
                None => write!(f, "{oid}"),
            },
            Self::GenericallySerialized { bytes } => write!(f, "0x{}", hex::encode(bytes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(recreation: &Recreation) -> u64 {
        let mut hasher = DefaultHasher::new();
        recreation.hash(&mut hasher);
        hasher.finish()
    }

    fn lookup(oid: Oid, title: Option<&str>) -> Recreation {
        Recreation::Lookup {
            oid,
            title: title.map(str::to_string),
            hint_key: None,
        }
    }

    #[test]
    fn lookup_equality_ignores_version_and_title() {
        let a = lookup(Oid::persistent("Customer", 1_i64).with_version(1), Some("Ann"));
        let b = lookup(Oid::persistent("Customer", 1_i64).with_version(5), None);

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn strategies_never_compare_across_kinds() {
        let encoded = Recreation::Encodable {
            value: EncodedValue::new("1"),
        };
        let bytes = Recreation::GenericallySerialized { bytes: b"1".to_vec() };

        assert_ne!(encoded, bytes);
        assert_ne!(encoded, lookup(Oid::persistent("i64", "1"), None));
    }

    #[test]
    fn refresh_only_touches_lookups() {
        let mut looked_up = lookup(Oid::persistent("Customer", 1_i64), None);
        assert!(looked_up.refresh_oid(Oid::persistent("Customer", 1_i64).with_version(2)));
        assert_eq!(looked_up.oid().and_then(Oid::version), Some(2));

        let mut encoded = Recreation::Encodable {
            value: EncodedValue::new("42"),
        };
        assert!(!encoded.refresh_oid(Oid::persistent("Customer", 1_i64)));
        assert_eq!(encoded.oid(), None);
    }

    #[test]
    fn serde_tags_strategy_and_hex_encodes_bytes() {
        let bytes = Recreation::GenericallySerialized {
            bytes: vec![0xde, 0xad],
        };
        let json = serde_json::to_value(&bytes).unwrap();

        assert_eq!(json["strategy"], "generically_serialized");
        assert_eq!(json["bytes"], "dead");
    }

    #[test]
    fn lookup_serializes_canonical_oid_and_omits_empty_hints() {
        let recreation = lookup(Oid::persistent("Customer", 7_i64).with_version(3), None);
        let json = serde_json::to_value(&recreation).unwrap();

        assert_eq!(json["oid"], "P:Customer:#7^3");
        assert!(json.get("title").is_none());

        let back: Recreation = serde_json::from_value(json).unwrap();
        assert_eq!(back.oid().and_then(Oid::version), Some(3));
    }

    #[test]
    fn display_renders_payload() {
        let bytes = Recreation::GenericallySerialized { bytes: vec![0xca, 0xfe] };
        assert_eq!(bytes.to_string(), "0xcafe");
        assert_eq!(StrategyKind::Lookup.to_string(), "lookup");
    }
}
