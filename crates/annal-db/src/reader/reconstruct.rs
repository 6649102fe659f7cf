use annal_core::entities::{AuditRow, AuditedEntity, Revision};
use annal_core::enums::ChangeKind;
use annal_core::ids::{EntityId, RevisionId};

use super::AuditReader;
use crate::error::AuditError;
use crate::helpers::quote_ident;
use crate::revision::row_to_revision;
use crate::schema::ShadowLayout;

impl AuditReader<'_> {
    /// The entity as it existed at `revision`.
    ///
    /// Reads the newest audit row at or before `revision`. Returns `None` if
    /// the entity did not exist yet or that row is a deletion.
    ///
    /// # Errors
    ///
    /// - `NotAudited` / `UnknownEntity` for the entity type
    /// - `InvalidIdentifier` if `id` does not fit the identifier fields
    pub async fn reconstruct(
        &self,
        entity: &str,
        id: &EntityId,
        revision: RevisionId,
    ) -> Result<Option<AuditedEntity>, AuditError> {
        let layout = self.layout(entity)?;
        let row = self.latest_row(&layout, id, revision).await?;
        Ok(row
            .filter(|row| row.kind != ChangeKind::Delete)
            .map(|row| AuditedEntity::from_row(row, revision)))
    }

    pub(super) async fn latest_row(
        &self,
        layout: &ShadowLayout,
        id: &EntityId,
        revision: RevisionId,
    ) -> Result<Option<AuditRow>, AuditError> {
        let mut params = layout.id_params(id)?;
        let rev_param = params.len() + 1;
        params.push(libsql::Value::Integer(revision.get()));
        let sql = format!(
            "SELECT {} FROM {} a WHERE {} AND a.{} <= ?{rev_param} ORDER BY a.{} DESC LIMIT 1",
            layout.select_list(Some("a")),
            quote_ident(&layout.table),
            layout.id_predicate("a", 1),
            quote_ident(&layout.revision_column),
            quote_ident(&layout.revision_column),
        );
        let mut rows = self.db.query(&sql, params).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(layout.read_row(&row, 0)?)),
            None => Ok(None),
        }
    }

    /// Newest revision that changed the entity.
    ///
    /// # Errors
    ///
    /// Same as [`Self::reconstruct`].
    pub async fn current_revision(
        &self,
        entity: &str,
        id: &EntityId,
    ) -> Result<Option<RevisionId>, AuditError> {
        let layout = self.layout(entity)?;
        let sql = format!(
            "SELECT MAX(a.{}) FROM {} a WHERE {}",
            quote_ident(&layout.revision_column),
            quote_ident(&layout.table),
            layout.id_predicate("a", 1),
        );
        let mut rows = self.db.query(&sql, layout.id_params(id)?).await?;
        let row = rows.next().await?.ok_or(AuditError::NoResult)?;
        Ok(row.get::<Option<i64>>(0)?.map(RevisionId))
    }

    /// Revisions that changed the entity, newest first.
    ///
    /// # Errors
    ///
    /// Same as [`Self::reconstruct`].
    pub async fn find_revisions(
        &self,
        entity: &str,
        id: &EntityId,
    ) -> Result<Vec<Revision>, AuditError> {
        let layout = self.layout(entity)?;
        let sql = format!(
            "SELECT r.id, r.timestamp, r.actor, r.metadata FROM {} r \
             JOIN {} a ON a.{} = r.id WHERE {} ORDER BY r.id DESC",
            quote_ident(&layout.revision_table),
            quote_ident(&layout.table),
            quote_ident(&layout.revision_column),
            layout.id_predicate("a", 1),
        );
        let mut rows = self.db.query(&sql, layout.id_params(id)?).await?;
        let mut revisions = Vec::new();
        while let Some(row) = rows.next().await? {
            revisions.push(row_to_revision(&row)?);
        }
        Ok(revisions)
    }

    /// Every audit row of the entity, newest first, deletions included.
    ///
    /// # Errors
    ///
    /// Same as [`Self::reconstruct`].
    pub async fn entity_history(
        &self,
        entity: &str,
        id: &EntityId,
    ) -> Result<Vec<AuditRow>, AuditError> {
        let layout = self.layout(entity)?;
        let sql = format!(
            "SELECT {} FROM {} a WHERE {} ORDER BY a.{} DESC",
            layout.select_list(Some("a")),
            quote_ident(&layout.table),
            layout.id_predicate("a", 1),
            quote_ident(&layout.revision_column),
        );
        let mut rows = self.db.query(&sql, layout.id_params(id)?).await?;
        let mut history = Vec::new();
        while let Some(row) = rows.next().await? {
            history.push(layout.read_row(&row, 0)?);
        }
        Ok(history)
    }

    /// Every audit row written in `revision`, grouped by entity type name.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if a layout cannot be derived or a query fails.
    pub async fn entities_changed_at(
        &self,
        revision: RevisionId,
    ) -> Result<Vec<AuditRow>, AuditError> {
        let mut changed = Vec::new();
        for entity in self.config.audited_entities() {
            let layout = self.layout(&entity)?;
            let order: Vec<String> = layout
                .identifier_columns()
                .map(|c| format!("a.{}", quote_ident(&c.column)))
                .collect();
            let sql = format!(
                "SELECT {} FROM {} a WHERE a.{} = ?1 ORDER BY {}",
                layout.select_list(Some("a")),
                quote_ident(&layout.table),
                quote_ident(&layout.revision_column),
                order.join(", "),
            );
            let mut rows = self
                .db
                .query(&sql, vec![libsql::Value::Integer(revision.get())])
                .await?;
            while let Some(row) = rows.next().await? {
                changed.push(layout.read_row(&row, 0)?);
            }
        }
        Ok(changed)
    }
}
