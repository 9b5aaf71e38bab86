//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::{Deserialize, Serialize};

/// Strictness applied to legacy (dot-separated) metric names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelLegacy {
    /// Reject any malformed line
    Strict,
    /// Reject only lines that would corrupt the downstream protocol
    Medium,
    /// Accept everything
    None,
}

impl LevelLegacy {
    /// Parse a level name, case-insensitively.
    ///
    /// # Examples
    /// ```
    /// use carbon_relay::domain::LevelLegacy;
    ///
    /// assert_eq!(LevelLegacy::parse("Medium"), Some(LevelLegacy::Medium));
    /// assert_eq!(LevelLegacy::parse("loose"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "medium" => Some(Self::Medium),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Medium => "medium",
            Self::None => "none",
        }
    }
}

impl Default for LevelLegacy {
    fn default() -> Self {
        Self::Medium
    }
}

impl std::fmt::Display for LevelLegacy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Strictness applied to metrics 2.0 (tagged, `key=value`) metric names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelM20 {
    /// Require well-formed `unit=` and `mtype=` tags
    Strict,
    /// Only forbid the `=` separator in untagged nodes
    Medium,
    /// Accept everything
    None,
}

impl LevelM20 {
    /// Parse a level name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "medium" => Some(Self::Medium),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Medium => "medium",
            Self::None => "none",
        }
    }
}

impl Default for LevelM20 {
    fn default() -> Self {
        Self::Medium
    }
}

impl std::fmt::Display for LevelM20 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
