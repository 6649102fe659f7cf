use std::collections::BTreeMap;

use annal_core::ids::{EntityId, RevisionId};
use annal_core::snapshot::{FieldDiff, diff_snapshots};

use super::AuditReader;
use crate::error::AuditError;

impl AuditReader<'_> {
    /// Fields whose value differs between two revisions of an entity.
    ///
    /// A side where the entity does not exist (not created yet, or deleted)
    /// contributes `null` for every field.
    ///
    /// # Errors
    ///
    /// Same as [`Self::reconstruct`].
    pub async fn diff(
        &self,
        entity: &str,
        id: &EntityId,
        from: RevisionId,
        to: RevisionId,
    ) -> Result<BTreeMap<String, FieldDiff>, AuditError> {
        let old = self
            .reconstruct(entity, id, from)
            .await?
            .map(|e| e.fields)
            .unwrap_or_default();
        let new = self
            .reconstruct(entity, id, to)
            .await?
            .map(|e| e.fields)
            .unwrap_or_default();
        Ok(diff_snapshots(&old, &new))
    }
}
