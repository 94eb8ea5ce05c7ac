//! Schema version tokens.

use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MigrationError;

/// An opaque, totally ordered schema version token such as `"0.0.1"` or
/// `"2016.12.0"`.
///
/// Tokens compare component-wise as numbers, so `1.0.10` sorts after
/// `1.0.9` and `2016.12.0` after `1.0.2`. The original spelling is kept for
/// display.
///
/// # Example
///
/// ```
/// use noi_migrate::SchemaVersion;
///
/// let old: SchemaVersion = "1.0.2".parse().unwrap();
/// let new: SchemaVersion = "2016.12.0".parse().unwrap();
/// assert!(old < new);
/// assert_eq!(new.to_string(), "2016.12.0");
/// ```
#[derive(Debug, Clone)]
pub struct SchemaVersion {
    token: String,
    parts: Vec<u32>,
}

impl SchemaVersion {
    /// Parse a dotted decimal version token.
    pub fn parse(token: &str) -> Result<Self, MigrationError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(MigrationError::InvalidVersion(token.to_string()));
        }
        let parts = token
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(MigrationError::InvalidVersion(token.to_string()));
                }
                part.parse::<u32>()
                    .map_err(|_| MigrationError::InvalidVersion(token.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            token: token.to_string(),
            parts,
        })
    }

    /// Build a version from numeric components, e.g. `[1, 0, 2]`.
    pub fn from_components(parts: &[u32]) -> Self {
        let token = parts
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(".");
        Self {
            token,
            parts: parts.to_vec(),
        }
    }

    /// The token as originally written.
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Numeric components of the token.
    pub fn components(&self) -> &[u32] {
        &self.parts
    }
}

impl PartialEq for SchemaVersion {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
    }
}

impl Eq for SchemaVersion {}

impl PartialOrd for SchemaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SchemaVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts.cmp(&other.parts)
    }
}

impl core::hash::Hash for SchemaVersion {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.parts.hash(state);
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

impl FromStr for SchemaVersion {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SchemaVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.token)
    }
}

impl<'de> Deserialize<'de> for SchemaVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Self::parse(&token).map_err(serde::de::Error::custom)
    }
}
