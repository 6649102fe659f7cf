//! Cross-cutting error types for annal.
//!
//! Storage and engine errors (`AuditError`) live in `annal-db`; configuration
//! errors live in `annal-config`.

use thiserror::Error;

/// Errors that can be raised while building or parsing core types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity metadata is inconsistent (missing identifier, unknown field, ...).
    #[error("Invalid metadata for entity '{entity}': {reason}")]
    InvalidMetadata { entity: String, reason: String },

    /// A stored value could not be parsed into a core type.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
