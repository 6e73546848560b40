//! Stable identifier type used for items and containers.
//!
//! The backend assigns identifiers when an item is created (UUIDv4 strings for
//! the bundled backends); the core never interprets them beyond equality and
//! ordering.

use serde::{Deserialize, Serialize};

/// A stable identifier for an ordered item or a container.
///
/// Modules and lessons are both items (inside their parent's list) and
/// containers (owning their own list), so a single identifier type covers
/// both roles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ID(String);

impl ID {
    /// Creates a new ID from any string-like input.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the ID is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for ID {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ID {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&ID> for ID {
    fn from(id: &ID) -> Self {
        id.clone()
    }
}

impl AsRef<str> for ID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl PartialEq<str> for ID {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ID {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl PartialEq<ID> for &str {
    fn eq(&self, other: &ID) -> bool {
        *self == other.0
    }
}

impl From<ID> for String {
    fn from(id: ID) -> Self {
        id.0
    }
}

// Serialized as a bare string so backend rows and JSON files stay readable
impl Serialize for ID {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ID {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(ID(s))
    }
}
