//! Object identifiers
//!
//! Provides [`Oid`], the value that addresses one domain object instance,
//! together with its canonical string form.
//!
//! # Canonical form
//!
//! ```text
//! P:Customer:42            persistent, text key
//! T:Order:#7               transient, numeric key
//! P:Order:1~lines          parented under `P:Order:1`, local name `lines`
//! P:Customer:42^3          version token 3
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::descriptor::TypeName;
use crate::error::OidParseError;

/// Lifecycle state of the addressed object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    /// Not yet durable; only meaningful within the current session
    Transient,

    /// Durable; resolvable by a later session
    Persistent,
}

impl Durability {
    fn marker(self) -> char {
        match self {
            Self::Transient => 'T',
            Self::Persistent => 'P',
        }
    }
}

/// Opaque per-instance key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OidKey {
    /// Free-form text key
    Text(String),

    /// Numeric key
    Number(i64),
}

impl From<&str> for OidKey {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OidKey {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for OidKey {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl Display for OidKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(&escape(text)),
            Self::Number(n) => write!(f, "#{n}"),
        }
    }
}

/// Object identifier
///
/// Identifiers compare by value. The version token is carried along for
/// optimistic concurrency but never participates in equality or hashing, so
/// an identifier refreshed by the session still denotes the same object.
///
/// # Invariants
/// - A parented identifier is only meaningful under its parent
/// - A parented identifier inherits durability from its root ancestor
#[derive(Debug, Clone)]
pub struct Oid {
    type_name: TypeName,
    key: OidKey,
    durability: Durability,
    parent: Option<Box<Oid>>,
    version: Option<u64>,
}

impl Oid {
    /// Identifier of a durable object
    #[inline]
    #[must_use]
    pub fn persistent(type_name: impl Into<TypeName>, key: impl Into<OidKey>) -> Self {
        Self {
            type_name: type_name.into(),
            key: key.into(),
            durability: Durability::Persistent,
            parent: None,
            version: None,
        }
    }

    /// Identifier of a not-yet-durable object
    #[inline]
    #[must_use]
    pub fn transient(type_name: impl Into<TypeName>, key: impl Into<OidKey>) -> Self {
        Self {
            type_name: type_name.into(),
            key: key.into(),
            durability: Durability::Transient,
            parent: None,
            version: None,
        }
    }

    /// Identifier owned by `parent` under `local_name`
    ///
    /// Used for collections held by an association and for aggregated
    /// objects that have no identity outside their owner.
    #[must_use]
    pub fn parented(parent: &Oid, type_name: impl Into<TypeName>, local_name: &str) -> Self {
        Self {
            type_name: type_name.into(),
            key: OidKey::Text(local_name.to_string()),
            durability: parent.durability,
            parent: Some(Box::new(parent.clone().without_version())),
            version: None,
        }
    }

    /// Attach a version token
    #[inline]
    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Strip the version token
    #[inline]
    #[must_use]
    pub fn without_version(mut self) -> Self {
        self.version = None;
        self
    }

    /// Declared type of the addressed object
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &TypeName {
        &self.type_name
    }

    /// Per-instance key
    #[inline]
    #[must_use]
    pub fn key(&self) -> &OidKey {
        &self.key
    }

    /// Durability flag
    #[inline]
    #[must_use]
    pub fn durability(&self) -> Durability {
        self.durability
    }

    /// True for not-yet-durable objects
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.durability == Durability::Transient
    }

    /// True for durable objects
    #[inline]
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.durability == Durability::Persistent
    }

    /// Owning identifier, if parented
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<&Oid> {
        self.parent.as_deref()
    }

    /// True if owned by another identifier
    #[inline]
    #[must_use]
    pub fn is_parented(&self) -> bool {
        self.parent.is_some()
    }

    /// Version token
    #[inline]
    #[must_use]
    pub fn version(&self) -> Option<u64> {
        self.version
    }

    /// Root (non-parented) ancestor
    #[must_use]
    pub fn root(&self) -> &Oid {
        let mut current = self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Canonical string form
    #[must_use]
    pub fn enc_string(&self) -> String {
        self.to_string()
    }

    fn identity_eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
            && self.key == other.key
            && self.durability == other.durability
            && self.parent == other.parent
    }
}

impl PartialEq for Oid {
    fn eq(&self, other: &Self) -> bool {
        self.identity_eq(other)
    }
}

impl Eq for Oid {}

impl Hash for Oid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_name.hash(state);
        self.key.hash(state);
        self.durability.hash(state);
        self.parent.hash(state);
    }
}

impl Display for Oid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.parent {
            Some(parent) => {
                write!(f, "{parent}~{}", self.key)?;
                if self.type_name != *parent.type_name() {
                    write!(f, "@{}", escape(self.type_name.as_str()))?;
                }
            }
            None => write!(
                f,
                "{}:{}:{}",
                self.durability.marker(),
                escape(self.type_name.as_str()),
                self.key
            )?,
        }
        if let Some(version) = self.version {
            write!(f, "^{version}")?;
        }
        Ok(())
    }
}

impl FromStr for Oid {
    type Err = OidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(OidParseError::Empty);
        }

        let (body, version) = match s.rsplit_once('^') {
            Some((body, v)) => {
                let version = v
                    .parse::<u64>()
                    .map_err(|_| OidParseError::InvalidVersion(v.to_string()))?;
                (body, Some(version))
            }
            None => (s, None),
        };

        let mut segments = body.split('~');
        let head = segments.next().ok_or(OidParseError::Empty)?;
        let mut oid = parse_root(head)?;

        for segment in segments {
            let (local, type_name) = match segment.split_once('@') {
                Some((local, ty)) => (local, TypeName::new(unescape(ty)?)),
                None => (segment, oid.type_name.clone()),
            };
            if local.is_empty() {
                return Err(OidParseError::MissingSegment("local name"));
            }
            oid = Oid::parented(&oid, type_name, &unescape(local)?);
        }

        oid.version = version;
        Ok(oid)
    }
}

fn parse_root(head: &str) -> Result<Oid, OidParseError> {
    let mut parts = head.splitn(3, ':');
    let marker = parts.next().ok_or(OidParseError::MissingSegment("state"))?;
    let type_name = parts.next().ok_or(OidParseError::MissingSegment("type"))?;
    let key = parts.next().ok_or(OidParseError::MissingSegment("key"))?;

    if type_name.is_empty() {
        return Err(OidParseError::MissingSegment("type"));
    }
    if key.is_empty() {
        return Err(OidParseError::MissingSegment("key"));
    }

    let key = match key.strip_prefix('#') {
        Some(number) => OidKey::Number(
            number
                .parse()
                .map_err(|_| OidParseError::InvalidKey(key.to_string()))?,
        ),
        None => OidKey::Text(unescape(key)?),
    };

    let type_name = TypeName::new(unescape(type_name)?);
    match marker {
        "P" => Ok(Oid::persistent(type_name, key)),
        "T" => Ok(Oid::transient(type_name, key)),
        other => Err(OidParseError::InvalidState(other.to_string())),
    }
}

const RESERVED: [char; 6] = ['%', ':', '~', '^', '@', '#'];

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if RESERVED.contains(&c) {
            out.push_str(&format!("%{:02X}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

fn unescape(encoded: &str) -> Result<String, OidParseError> {
    let mut out = String::with_capacity(encoded.len());
    let mut chars = encoded.chars();
    while let Some(c) = chars.next() {
        if c == '%' {
            let hi = chars.next();
            let lo = chars.next();
            let code = match (hi, lo) {
                (Some(hi), Some(lo)) => u8::from_str_radix(&format!("{hi}{lo}"), 16).ok(),
                _ => None,
            };
            match code {
                Some(code) => out.push(char::from(code)),
                None => return Err(OidParseError::InvalidEscape(encoded.to_string())),
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

impl Serialize for Oid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Oid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
