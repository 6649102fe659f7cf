//! History reader.
//!
//! Read-only queries over the revision log and the shadow tables. Methods
//! are split across submodules, each adding an `impl AuditReader` block:
//!
//! - `reconstruct`: point-in-time state, per-entity history
//! - `associations`: to-one and to-many resolution at a revision
//! - `revisions`: the lazy revision cursor
//! - `diff`: field differences between two revisions
//! - `batch`: cancellable batched reconstruction

mod associations;
mod batch;
mod diff;
mod reconstruct;
mod revisions;

use std::sync::Arc;

use annal_core::entities::Revision;
use annal_core::ids::RevisionId;

pub use associations::Related;
pub use revisions::RevisionCursor;

use crate::AnnalDb;
use crate::config::AuditConfiguration;
use crate::error::AuditError;
use crate::schema::{SchemaMapper, ShadowLayout};

pub struct AuditReader<'a> {
    db: &'a AnnalDb,
    config: Arc<AuditConfiguration>,
    mapper: Arc<SchemaMapper>,
}

impl<'a> AuditReader<'a> {
    #[must_use]
    pub fn new(db: &'a AnnalDb, mapper: Arc<SchemaMapper>) -> Self {
        Self {
            db,
            config: Arc::clone(mapper.config()),
            mapper,
        }
    }

    /// Layout of an audited entity type.
    fn layout(&self, entity: &str) -> Result<Arc<ShadowLayout>, AuditError> {
        if !self.config.is_audited(entity) {
            if self.mapper.metadata().entity(entity).is_none() {
                return Err(AuditError::UnknownEntity {
                    entity: entity.to_string(),
                });
            }
            return Err(AuditError::NotAudited {
                entity: entity.to_string(),
            });
        }
        self.mapper.derive_shadow_layout(entity)
    }

    /// A single revision record.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if the query fails.
    pub async fn find_revision(&self, id: RevisionId) -> Result<Option<Revision>, AuditError> {
        crate::revision::find_revision(self.db, &self.config.revision_table(), id).await
    }

    /// Revision records, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if the query fails.
    pub async fn revision_history(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Revision>, AuditError> {
        crate::revision::revision_history(self.db, &self.config.revision_table(), limit, offset)
            .await
    }
}
