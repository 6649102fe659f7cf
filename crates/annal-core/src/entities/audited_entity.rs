use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::AuditRow;
use crate::enums::ChangeKind;
use crate::ids::{EntityId, RevisionId};
use crate::snapshot::Snapshot;

/// An entity as it existed at a past revision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditedEntity {
    pub entity: String,
    pub id: EntityId,
    /// Revision of the audit row the state was read from.
    pub revision: RevisionId,
    /// Revision the caller asked for. Associations resolve at this revision.
    pub as_of: RevisionId,
    pub kind: ChangeKind,
    pub fields: Snapshot,
}

impl AuditedEntity {
    /// Build from the audit row that was current at `as_of`.
    #[must_use]
    pub fn from_row(row: AuditRow, as_of: RevisionId) -> Self {
        Self {
            entity: row.entity,
            id: row.id,
            revision: row.revision,
            as_of,
            kind: row.kind,
            fields: row.snapshot,
        }
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// String value of a field, if present and a string.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }
}
