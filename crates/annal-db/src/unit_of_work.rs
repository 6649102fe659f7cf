//! Unit of work.
//!
//! Queues primary-table writes and applies them in one transaction on
//! [`UnitOfWork::flush`], notifying registered [`LifecycleListener`]s at each
//! call point. Any error rolls the whole transaction back.

use std::sync::Arc;

use annal_core::enums::ChangeKind;
use annal_core::ids::{EntityId, RevisionId};
use annal_core::metadata::EntityMetadata;
use annal_core::snapshot::Snapshot;
use serde_json::Value;

use crate::AnnalDb;
use crate::error::AuditError;
use crate::helpers::{from_sql_value, placeholders, quote_ident, to_sql_value};
use crate::lifecycle::{EntityChange, FlushContext, LifecycleListener};
use crate::metadata::MetadataProvider;
use crate::schema::primary_table_sql;

#[derive(Debug, Clone)]
enum PendingWrite {
    Persist { entity: String, fields: Snapshot },
    Update { entity: String, id: EntityId, changes: Snapshot },
    Remove { entity: String, id: EntityId },
}

/// Outcome of a successful flush.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushSummary {
    /// Identifiers of persisted entities, in persist order.
    pub inserted: Vec<EntityId>,
    pub updated: usize,
    pub deleted: usize,
    /// Revision allocated by a listener, if any.
    pub revision: Option<RevisionId>,
}

pub struct UnitOfWork<'a> {
    db: &'a AnnalDb,
    metadata: Arc<dyn MetadataProvider>,
    listeners: Vec<Box<dyn LifecycleListener>>,
    pending: Vec<PendingWrite>,
    context: FlushContext,
}

impl<'a> UnitOfWork<'a> {
    #[must_use]
    pub fn new(db: &'a AnnalDb, metadata: Arc<dyn MetadataProvider>) -> Self {
        Self {
            db,
            metadata,
            listeners: Vec::new(),
            pending: Vec::new(),
            context: FlushContext::default(),
        }
    }

    pub fn register_listener(&mut self, listener: Box<dyn LifecycleListener>) {
        self.listeners.push(listener);
    }

    /// Queue an insert. A single integer identifier may be omitted.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::UnknownEntity` if the type is not known.
    pub fn persist(&mut self, entity: &str, fields: Snapshot) -> Result<(), AuditError> {
        self.metadata.require(entity)?;
        self.pending.push(PendingWrite::Persist {
            entity: entity.to_string(),
            fields,
        });
        Ok(())
    }

    /// Queue an update of the given fields.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::UnknownEntity` if the type is not known, or
    /// `AuditError::InvalidState` if `changes` touches an identifier field.
    pub fn update(
        &mut self,
        entity: &str,
        id: impl Into<EntityId>,
        changes: Snapshot,
    ) -> Result<(), AuditError> {
        let meta = self.metadata.require(entity)?;
        if let Some(field) = changes.keys().find(|f| meta.is_identifier(f)) {
            return Err(AuditError::InvalidState(format!(
                "identifier field '{entity}.{field}' cannot be updated"
            )));
        }
        self.pending.push(PendingWrite::Update {
            entity: entity.to_string(),
            id: id.into(),
            changes,
        });
        Ok(())
    }

    /// Queue a delete.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::UnknownEntity` if the type is not known.
    pub fn remove(&mut self, entity: &str, id: impl Into<EntityId>) -> Result<(), AuditError> {
        self.metadata.require(entity)?;
        self.pending.push(PendingWrite::Remove {
            entity: entity.to_string(),
            id: id.into(),
        });
        Ok(())
    }

    /// Metadata stored on the revision the next flush allocates.
    pub fn set_revision_metadata(&mut self, metadata: Value) {
        self.context.revision_metadata = Some(metadata);
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Current stored state of a primary row.
    ///
    /// # Errors
    ///
    /// Returns `AuditError` if the type is unknown or the query fails.
    pub async fn find(
        &self,
        entity: &str,
        id: impl Into<EntityId>,
    ) -> Result<Option<Snapshot>, AuditError> {
        let meta = self.metadata.require(entity)?;
        load_row(self.db, meta, &id.into()).await
    }

    /// Apply all queued writes in one transaction.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a primary write or a listener. The
    /// transaction is rolled back and every listener gets `after_rollback`.
    pub async fn flush(&mut self) -> Result<FlushSummary, AuditError> {
        let pending = std::mem::take(&mut self.pending);
        let mut context = std::mem::take(&mut self.context);
        if pending.is_empty() {
            return Ok(FlushSummary::default());
        }

        self.db.begin().await?;
        let result = match self.apply(pending, &mut context).await {
            Ok(summary) => self.db.commit().await.map(|()| summary),
            Err(e) => Err(e),
        };

        match result {
            Ok(summary) => {
                for listener in &mut self.listeners {
                    listener.after_commit().await;
                }
                tracing::debug!(
                    inserted = summary.inserted.len(),
                    updated = summary.updated,
                    deleted = summary.deleted,
                    revision = ?summary.revision,
                    "flush committed"
                );
                Ok(summary)
            }
            Err(e) => {
                if !self.db.is_autocommit() {
                    if let Err(rollback) = self.db.rollback().await {
                        tracing::warn!(error = %rollback, "rollback after failed flush failed");
                    }
                }
                for listener in &mut self.listeners {
                    listener.after_rollback().await;
                }
                tracing::debug!(error = %e, "flush rolled back");
                Err(e)
            }
        }
    }

    async fn apply(
        &mut self,
        pending: Vec<PendingWrite>,
        context: &mut FlushContext,
    ) -> Result<FlushSummary, AuditError> {
        let mut summary = FlushSummary::default();
        for write in pending {
            let change = match write {
                PendingWrite::Persist { entity, fields } => {
                    let change = self.apply_persist(&entity, &fields).await?;
                    summary.inserted.push(change.id.clone());
                    change
                }
                PendingWrite::Update {
                    entity,
                    id,
                    changes,
                } => {
                    summary.updated += 1;
                    self.apply_update(&entity, id, &changes).await?
                }
                PendingWrite::Remove { entity, id } => {
                    summary.deleted += 1;
                    self.apply_remove(&entity, id).await?
                }
            };
            for listener in &mut self.listeners {
                listener.on_before_flush(&change).await?;
            }
        }
        for listener in &mut self.listeners {
            listener.before_commit(self.db, context).await?;
        }
        summary.revision = context.revision;
        Ok(summary)
    }

    async fn apply_persist(
        &self,
        entity: &str,
        fields: &Snapshot,
    ) -> Result<EntityChange, AuditError> {
        let meta = self.metadata.require(entity)?;
        let supplied = identifier_from(meta, fields);
        if supplied.is_none() && meta.identifier.len() != 1 {
            return Err(AuditError::InvalidIdentifier {
                entity: entity.to_string(),
                reason: "composite identifiers must be supplied on persist".into(),
            });
        }
        let mut columns = Vec::new();
        let mut params = Vec::new();
        for field in &meta.fields {
            if let Some(value) = fields.get(&field.name) {
                columns.push(quote_ident(&field.column));
                params.push(primary_value(meta, &field.name, value)?);
            }
        }
        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(&meta.table))
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(&meta.table),
                columns.join(", "),
                placeholders(1, columns.len())
            )
        };
        self.db.execute(&sql, params).await?;

        let id = supplied.unwrap_or_else(|| EntityId::from(self.db.last_insert_rowid()));
        let current = load_row(self.db, meta, &id).await?.ok_or(AuditError::NoResult)?;
        Ok(EntityChange {
            entity: entity.to_string(),
            id,
            kind: ChangeKind::Insert,
            previous: None,
            current: Some(current),
        })
    }

    async fn apply_update(
        &self,
        entity: &str,
        id: EntityId,
        changes: &Snapshot,
    ) -> Result<EntityChange, AuditError> {
        let meta = self.metadata.require(entity)?;
        let previous = require_row(self.db, meta, &id).await?;

        let mut assignments = Vec::new();
        let mut params = Vec::new();
        for field in &meta.fields {
            if let Some(value) = changes.get(&field.name) {
                params.push(primary_value(meta, &field.name, value)?);
                assignments.push(format!("{} = ?{}", quote_ident(&field.column), params.len()));
            }
        }
        if let Some(unknown) = changes.keys().find(|f| meta.field_named(f).is_none()) {
            return Err(AuditError::InvalidState(format!(
                "'{entity}' has no field '{unknown}'"
            )));
        }
        if !assignments.is_empty() {
            let start = params.len() + 1;
            params.extend(id_params(meta, &id)?);
            let sql = format!(
                "UPDATE {} SET {} WHERE {}",
                quote_ident(&meta.table),
                assignments.join(", "),
                id_predicate(meta, start)
            );
            self.db.execute(&sql, params).await?;
        }

        let current = require_row(self.db, meta, &id).await?;
        Ok(EntityChange {
            entity: entity.to_string(),
            id,
            kind: ChangeKind::Update,
            previous: Some(previous),
            current: Some(current),
        })
    }

    async fn apply_remove(&self, entity: &str, id: EntityId) -> Result<EntityChange, AuditError> {
        let meta = self.metadata.require(entity)?;
        let previous = require_row(self.db, meta, &id).await?;
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            quote_ident(&meta.table),
            id_predicate(meta, 1)
        );
        self.db.execute(&sql, id_params(meta, &id)?).await?;
        Ok(EntityChange {
            entity: entity.to_string(),
            id,
            kind: ChangeKind::Delete,
            previous: Some(previous),
            current: None,
        })
    }
}

/// Create the primary table of every known entity type.
///
/// # Errors
///
/// Returns `AuditError` if a statement fails.
pub async fn create_primary_tables(
    db: &AnnalDb,
    metadata: &dyn MetadataProvider,
) -> Result<(), AuditError> {
    for name in metadata.entity_names() {
        let meta = metadata.require(&name)?;
        db.execute_batch(&primary_table_sql(meta)).await?;
    }
    Ok(())
}

fn primary_value(meta: &EntityMetadata, field: &str, value: &Value) -> Result<libsql::Value, AuditError> {
    let field_type = &meta
        .field_named(field)
        .ok_or_else(|| AuditError::InvalidState(format!("'{}' has no field '{field}'", meta.name)))?
        .field_type;
    to_sql_value(field_type, value)
        .map_err(|reason| AuditError::InvalidState(format!("{}.{field}: {reason}", meta.name)))
}

fn identifier_from(meta: &EntityMetadata, fields: &Snapshot) -> Option<EntityId> {
    let values: Vec<Value> = meta
        .identifier
        .iter()
        .map(|f| fields.get(f).filter(|v| !v.is_null()).cloned())
        .collect::<Option<_>>()?;
    Some(if values.len() == 1 {
        EntityId::single(values.into_iter().next().unwrap_or_default())
    } else {
        EntityId::composite(values)
    })
}

fn id_predicate(meta: &EntityMetadata, start: usize) -> String {
    meta.identifier_fields()
        .enumerate()
        .map(|(i, f)| format!("{} = ?{}", quote_ident(&f.column), start + i))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn id_params(meta: &EntityMetadata, id: &EntityId) -> Result<Vec<libsql::Value>, AuditError> {
    if id.len() != meta.identifier.len() {
        return Err(AuditError::InvalidIdentifier {
            entity: meta.name.clone(),
            reason: format!(
                "expected {} component(s), got {}",
                meta.identifier.len(),
                id.len()
            ),
        });
    }
    meta.identifier_fields()
        .zip(id.values())
        .map(|(field, value)| {
            to_sql_value(&field.field_type, value).map_err(|reason| AuditError::InvalidIdentifier {
                entity: meta.name.clone(),
                reason: format!("{}: {reason}", field.name),
            })
        })
        .collect()
}

async fn load_row(
    db: &AnnalDb,
    meta: &EntityMetadata,
    id: &EntityId,
) -> Result<Option<Snapshot>, AuditError> {
    let columns: Vec<String> = meta.fields.iter().map(|f| quote_ident(&f.column)).collect();
    let sql = format!(
        "SELECT {} FROM {} WHERE {}",
        columns.join(", "),
        quote_ident(&meta.table),
        id_predicate(meta, 1)
    );
    let mut rows = db.query(&sql, id_params(meta, id)?).await?;
    let Some(row) = rows.next().await? else {
        return Ok(None);
    };
    let mut snapshot = Snapshot::new();
    for (idx, field) in (0_i32..).zip(&meta.fields) {
        let value = from_sql_value(&field.field_type, row.get_value(idx)?)
            .map_err(|e| AuditError::Query(format!("{}.{}: {e}", meta.table, field.column)))?;
        snapshot.insert(field.name.clone(), value);
    }
    Ok(Some(snapshot))
}

async fn require_row(
    db: &AnnalDb,
    meta: &EntityMetadata,
    id: &EntityId,
) -> Result<Snapshot, AuditError> {
    load_row(db, meta, id).await?.ok_or_else(|| {
        AuditError::InvalidState(format!("{}#{id} does not exist", meta.name))
    })
}
