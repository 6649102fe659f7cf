use serde::{Deserialize, Serialize};

use crate::enums::ChangeKind;
use crate::ids::{EntityId, RevisionId};
use crate::snapshot::Snapshot;

/// One snapshot record: one entity, one revision, one change kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRow {
    pub entity: String,
    pub id: EntityId,
    pub revision: RevisionId,
    pub kind: ChangeKind,
    pub snapshot: Snapshot,
}
