use std::collections::HashMap;

use annal_core::entities::{AuditRow, AuditedEntity};
use annal_core::enums::ChangeKind;
use annal_core::ids::{EntityId, RevisionId};
use tokio_util::sync::CancellationToken;

use super::AuditReader;
use crate::error::AuditError;
use crate::helpers::{placeholders, quote_ident};
use crate::schema::ShadowLayout;

/// SQLite's default `SQLITE_MAX_VARIABLE_NUMBER`.
const MAX_BIND_PARAMS: usize = 32_766;

impl AuditReader<'_> {
    /// Reconstruct many entities of one type at the same revision.
    ///
    /// Identifiers are queried in chunks of the configured batch size, capped
    /// so a chunk never binds more parameters than SQLite accepts. The result
    /// is aligned with `ids`. Cancelling `cancel` aborts the whole
    /// call with `Cancelled`; chunks already read are discarded.
    ///
    /// # Errors
    ///
    /// - `Cancelled` if `cancel` fires before the last chunk completes
    /// - anything [`Self::reconstruct`] can return
    pub async fn reconstruct_many(
        &self,
        entity: &str,
        ids: &[EntityId],
        revision: RevisionId,
        cancel: &CancellationToken,
    ) -> Result<Vec<Option<AuditedEntity>>, AuditError> {
        let layout = self.layout(entity)?;
        let keys = ids
            .iter()
            .map(|id| layout.canonical_id(id).map(|id| id.key()))
            .collect::<Result<Vec<_>, _>>()?;
        let arity = layout.identifier_columns().count().max(1);
        let chunk_size = self
            .config
            .batch_size()
            .min((MAX_BIND_PARAMS - 1) / arity)
            .max(1);
        let mut found: HashMap<String, AuditRow> = HashMap::with_capacity(ids.len());

        for chunk in ids.chunks(chunk_size) {
            if cancel.is_cancelled() {
                return Err(AuditError::Cancelled);
            }
            let rows = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(AuditError::Cancelled),
                rows = self.fetch_chunk(&layout, chunk, revision) => rows?,
            };
            for row in rows {
                found.insert(row.id.key(), row);
            }
        }

        tracing::debug!(
            entity,
            requested = ids.len(),
            found = found.len(),
            revision = %revision,
            "batch reconstruction"
        );
        Ok(keys
            .iter()
            .map(|key| {
                found
                    .get(key)
                    .filter(|row| row.kind != ChangeKind::Delete)
                    .cloned()
                    .map(|row| AuditedEntity::from_row(row, revision))
            })
            .collect())
    }

    async fn fetch_chunk(
        &self,
        layout: &ShadowLayout,
        ids: &[EntityId],
        revision: RevisionId,
    ) -> Result<Vec<AuditRow>, AuditError> {
        let mut params = Vec::new();
        for id in ids {
            params.extend(layout.id_params(id)?);
        }
        let id_columns: Vec<String> = layout
            .identifier_columns()
            .map(|c| quote_ident(&c.column))
            .collect();

        let matches = if id_columns.len() == 1 {
            format!("a.{} IN ({})", id_columns[0], placeholders(1, ids.len()))
        } else {
            let arity = id_columns.len();
            let tuples = (0..ids.len())
                .map(|i| format!("({})", placeholders(i * arity + 1, arity)))
                .collect::<Vec<_>>()
                .join(", ");
            let row = id_columns
                .iter()
                .map(|col| format!("a.{col}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("({row}) IN (VALUES {tuples})")
        };
        let correlate = id_columns
            .iter()
            .map(|col| format!("b.{col} = a.{col}"))
            .collect::<Vec<_>>()
            .join(" AND ");
        let rev = quote_ident(&layout.revision_column);
        let rev_param = params.len() + 1;
        params.push(libsql::Value::Integer(revision.get()));

        let sql = format!(
            "SELECT {select} FROM {table} a WHERE ({matches}) \
             AND a.{rev} = (SELECT MAX(b.{rev}) FROM {table} b WHERE {correlate} AND b.{rev} <= ?{rev_param})",
            select = layout.select_list(Some("a")),
            table = quote_ident(&layout.table),
        );
        let mut rows = self.db.query(&sql, params).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(layout.read_row(&row, 0)?);
        }
        Ok(out)
    }
}
