use std::collections::VecDeque;
use std::sync::Arc;

use annal_core::entities::Revision;
use annal_core::ids::{EntityId, RevisionId};

use super::AuditReader;
use crate::AnnalDb;
use crate::error::AuditError;
use crate::helpers::quote_ident;
use crate::revision::row_to_revision;
use crate::schema::ShadowLayout;

/// Revisions that changed one entity, oldest first.
///
/// Nothing is queried until the first [`RevisionCursor::next`]; pages are
/// fetched with keyset pagination on the revision id.
pub struct RevisionCursor<'a> {
    db: &'a AnnalDb,
    layout: Arc<ShadowLayout>,
    id_params: Vec<libsql::Value>,
    page_size: usize,
    buffer: VecDeque<Revision>,
    last: Option<RevisionId>,
    exhausted: bool,
}

impl RevisionCursor<'_> {
    /// The next revision, or `None` at the end.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if fetching a page fails.
    pub async fn next(&mut self) -> Result<Option<Revision>, AuditError> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_page().await?;
        }
        let next = self.buffer.pop_front();
        if let Some(revision) = &next {
            self.last = Some(revision.id);
        }
        Ok(next)
    }

    /// Start over from the first revision.
    pub fn rewind(&mut self) {
        self.buffer.clear();
        self.last = None;
        self.exhausted = false;
    }

    /// Drain the remaining revisions.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if fetching a page fails.
    pub async fn collect_remaining(&mut self) -> Result<Vec<Revision>, AuditError> {
        let mut all = Vec::new();
        while let Some(revision) = self.next().await? {
            all.push(revision);
        }
        Ok(all)
    }

    async fn fetch_page(&mut self) -> Result<(), AuditError> {
        let layout = &self.layout;
        let mut params = self.id_params.clone();
        let after = params.len() + 1;
        params.push(libsql::Value::Integer(self.last.map_or(0, RevisionId::get)));
        params.push(libsql::Value::Integer(
            i64::try_from(self.page_size).unwrap_or(i64::MAX),
        ));
        let sql = format!(
            "SELECT r.id, r.timestamp, r.actor, r.metadata FROM {} r \
             WHERE r.id IN (SELECT a.{} FROM {} a WHERE {}) AND r.id > ?{after} \
             ORDER BY r.id ASC LIMIT ?{}",
            quote_ident(&layout.revision_table),
            quote_ident(&layout.revision_column),
            quote_ident(&layout.table),
            layout.id_predicate("a", 1),
            after + 1,
        );

        let mut rows = self.db.query(&sql, params).await?;
        let mut fetched = 0usize;
        while let Some(row) = rows.next().await? {
            self.buffer.push_back(row_to_revision(&row)?);
            fetched += 1;
        }
        if fetched < self.page_size {
            self.exhausted = true;
        }
        tracing::trace!(entity = %self.layout.entity, fetched, "fetched revision page");
        Ok(())
    }
}

impl<'a> AuditReader<'a> {
    /// Lazy, restartable sequence of the revisions that changed an entity.
    ///
    /// # Errors
    ///
    /// - `NotAudited` / `UnknownEntity` for the entity type
    /// - `InvalidIdentifier` if `id` does not fit the identifier fields
    pub fn list_revisions(
        &self,
        entity: &str,
        id: &EntityId,
    ) -> Result<RevisionCursor<'a>, AuditError> {
        let layout = self.layout(entity)?;
        let id_params = layout.id_params(id)?;
        Ok(RevisionCursor {
            db: self.db,
            layout,
            id_params,
            page_size: self.config.batch_size(),
            buffer: VecDeque::new(),
            last: None,
            exhausted: false,
        })
    }
}
