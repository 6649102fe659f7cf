//! Change kinds and field types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

// ---------------------------------------------------------------------------
// ChangeKind
// ---------------------------------------------------------------------------

/// Kind of change recorded by an audit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub const ALL: [Self; 3] = [Self::Insert, Self::Update, Self::Delete];

    /// Return the string representation used in SQL storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    /// Collapse two changes to the same row within one flush.
    ///
    /// Returns `None` when the pair cancels out (inserted then deleted).
    #[must_use]
    pub const fn merge(self, next: Self) -> Option<Self> {
        match (self, next) {
            (Self::Insert, Self::Update | Self::Insert) => Some(Self::Insert),
            (Self::Insert, Self::Delete) => None,
            (Self::Delete, Self::Insert | Self::Update) => Some(Self::Update),
            (_, next) => Some(next),
        }
    }
}

impl FromStr for ChangeKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(CoreError::Parse(format!("unknown change kind '{other}'"))),
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FieldType
// ---------------------------------------------------------------------------

/// Semantic type of an entity field.
///
/// `Custom` carries a host type name the engine has no built-in
/// serialization for; it must be registered against a base type before the
/// field can be audited.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Float,
    Text,
    Boolean,
    DateTime,
    Json,
    Custom(String),
}

impl FieldType {
    /// Map a host type name onto a field type.
    ///
    /// Unknown names become `Custom`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "integer" | "int" | "smallint" | "bigint" => Self::Integer,
            "float" | "real" | "double" | "decimal" => Self::Float,
            "string" | "text" | "guid" | "ascii_string" => Self::Text,
            "boolean" | "bool" => Self::Boolean,
            "datetime" | "datetimetz" | "datetime_immutable" | "date" | "time" => Self::DateTime,
            "json" | "json_array" | "array" | "simple_array" => Self::Json,
            _ => Self::Custom(name.to_string()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::DateTime => "datetime",
            Self::Json => "json",
            Self::Custom(name) => name,
        }
    }

    /// SQL column type, or `None` for custom types.
    #[must_use]
    pub const fn sql_type(&self) -> Option<&'static str> {
        match self {
            Self::Integer | Self::Boolean => Some("INTEGER"),
            Self::Float => Some("REAL"),
            Self::Text | Self::DateTime | Self::Json => Some("TEXT"),
            Self::Custom(_) => None,
        }
    }

    #[must_use]
    pub const fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
