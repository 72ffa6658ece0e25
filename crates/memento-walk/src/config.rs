//! Walk configuration

use serde::{Deserialize, Serialize};

/// Settings shared by capture and apply walks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    /// Maximum nesting depth before a walk gives up
    ///
    /// The captured-identifier set already guarantees termination; this
    /// bound only trips when identifier equality is broken by bad metadata.
    pub max_depth: usize,

    /// Reject snapshot fields the descriptor does not declare
    ///
    /// When false, unknown fields are logged and ignored.
    pub strict_fields: bool,
}

impl WalkConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With maximum depth
    #[inline]
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// With unknown-field policy
    #[inline]
    #[must_use]
    pub fn with_strict_fields(mut self, strict: bool) -> Self {
        self.strict_fields = strict;
        self
    }
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            max_depth: 512,
            strict_fields: true,
        }
    }
}
