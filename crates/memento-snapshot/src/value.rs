//! Encoded leaf values
//!
//! [`EncodedValue`] is a value type's canonical string encoding.
//! [`Payload`] is what a standalone value carries: either that encoding or an
//! opaque byte copy.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Canonical string encoding of a value-typed instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedValue(String);

impl EncodedValue {
    /// Wrap an encoded string
    #[inline]
    #[must_use]
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// String view
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the inner string
    #[inline]
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for EncodedValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EncodedValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EncodedValue {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Payload of a standalone value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// Canonical string encoding
    Encoded(EncodedValue),

    /// Opaque byte copy, hex on the wire
    Serialized(#[serde(with = "hex_bytes")] Vec<u8>),
}

impl Payload {
    /// Size of the payload in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Encoded(value) => value.as_str().len(),
            Self::Serialized(bytes) => bytes.len(),
        }
    }

    /// True for an empty payload
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serde adapter writing byte buffers as lowercase hex strings
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as hex
    ///
    /// # Errors
    /// Propagates serializer errors
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    /// Deserialize bytes from hex
    ///
    /// # Errors
    /// Fails on non-hex input
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        hex::decode(raw).map_err(serde::de::Error::custom)
    }
}
