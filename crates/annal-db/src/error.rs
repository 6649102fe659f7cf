//! Error types for annal-db.

use annal_core::errors::CoreError;
use annal_core::ids::RevisionId;
use thiserror::Error;

/// Errors from the audit engine and its storage.
#[derive(Debug, Error)]
pub enum AuditError {
    /// A kept field has a type with no known serialization.
    #[error("Field '{entity}.{field}' has unsupported type '{type_name}'; register it as a custom type")]
    UnsupportedFieldType {
        entity: String,
        field: String,
        type_name: String,
    },

    /// The association cannot be audited or resolved.
    #[error("Association '{entity}.{association}' is not supported: {reason}")]
    UnsupportedAssociation {
        entity: String,
        association: String,
        reason: String,
    },

    /// A configuration setter was called after the first revision was allocated.
    #[error("Audit configuration is locked once the first revision has been allocated")]
    ConfigurationLocked,

    /// Writing an audit row failed; the whole flush is rolled back.
    #[error("Failed to write audit row for {entity}#{id} at revision {}: {source}", display_revision(.revision))]
    AuditWriteFailed {
        entity: String,
        id: String,
        revision: Option<RevisionId>,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The entity type is known but not audited.
    #[error("Entity '{entity}' is not audited")]
    NotAudited { entity: String },

    /// The metadata provider does not know the entity type.
    #[error("Unknown entity '{entity}'")]
    UnknownEntity { entity: String },

    /// The identifier does not match the entity's identifier fields.
    #[error("Invalid identifier for '{entity}': {reason}")]
    InvalidIdentifier { entity: String, reason: String },

    /// A cancellable operation was cancelled. Partial results were discarded.
    #[error("Operation cancelled")]
    Cancelled,

    /// Entity metadata failed validation.
    #[error(transparent)]
    Metadata(#[from] CoreError),

    /// A SQL query failed or returned malformed data.
    #[error("Query failed: {0}")]
    Query(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Expected a result row but none was returned.
    #[error("No result returned")]
    NoResult,

    /// Invalid state encountered (e.g., bad data in DB, misuse of a unit of work).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Underlying libSQL error.
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn display_revision(revision: &Option<RevisionId>) -> String {
    revision.map_or_else(|| "(none)".to_string(), |r| r.to_string())
}
