//! Revision and entity identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a revision in the revision log.
///
/// Allocated by the storage layer's auto-increment; strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(pub i64);

impl RevisionId {
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for RevisionId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an entity row.
///
/// Holds one component per identifier field, in the order the entity
/// metadata declares them. Simple identifiers have exactly one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Vec<Value>);

impl EntityId {
    /// Identifier with a single component.
    pub fn single(value: impl Into<Value>) -> Self {
        Self(vec![value.into()])
    }

    /// Identifier with several components (composite key).
    #[must_use]
    pub const fn composite(values: Vec<Value>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The only component of a simple identifier.
    #[must_use]
    pub fn as_single(&self) -> Option<&Value> {
        match self.0.as_slice() {
            [value] => Some(value),
            _ => None,
        }
    }

    /// Stable string key, usable for hashing and grouping.
    #[must_use]
    pub fn key(&self) -> String {
        Value::Array(self.0.clone()).to_string()
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self::single(value)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::single(value)
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self::single(value)
    }
}

impl From<Value> for EntityId {
    fn from(value: Value) -> Self {
        Self::single(value)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match value {
                Value::String(s) => f.write_str(s)?,
                other => write!(f, "{other}")?,
            }
        }
        Ok(())
    }
}
