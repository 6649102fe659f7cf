use annal_core::entities::AuditedEntity;
use annal_core::enums::ChangeKind;
use annal_core::ids::EntityId;
use annal_core::metadata::{AssociationKind, AssociationMetadata, Cardinality};

use super::AuditReader;
use crate::error::AuditError;
use crate::helpers::{quote_ident, to_sql_value};

/// Result of resolving an association of either cardinality.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    One(Option<AuditedEntity>),
    Many(Vec<AuditedEntity>),
}

fn unsupported(entity: &str, association: &str, reason: impl Into<String>) -> AuditError {
    AuditError::UnsupportedAssociation {
        entity: entity.to_string(),
        association: association.to_string(),
        reason: reason.into(),
    }
}

impl AuditReader<'_> {
    fn association(
        &self,
        entity: &str,
        name: &str,
    ) -> Result<AssociationMetadata, AuditError> {
        let meta = self.mapper.metadata().require(entity)?;
        meta.association_named(name)
            .cloned()
            .ok_or_else(|| unsupported(entity, name, "no such association"))
    }

    fn require_audited_target(&self, association: &AssociationMetadata) -> Result<(), AuditError> {
        if self.config.is_audited(&association.target) {
            Ok(())
        } else {
            Err(AuditError::NotAudited {
                entity: association.target.clone(),
            })
        }
    }

    /// Resolve a to-one association at the revision `entity` was read at.
    ///
    /// # Errors
    ///
    /// - `UnsupportedAssociation` if the association is not to-one, its
    ///   foreign key field is not audited, or the target has a composite id
    /// - `NotAudited` if the target type is not audited
    pub async fn to_one(
        &self,
        entity: &AuditedEntity,
        association: &str,
    ) -> Result<Option<AuditedEntity>, AuditError> {
        let assoc = self.association(&entity.entity, association)?;
        let AssociationKind::ToOne { field } = &assoc.kind else {
            return Err(unsupported(
                &entity.entity,
                association,
                "not a to-one association",
            ));
        };
        self.require_audited_target(&assoc)?;

        let Some(foreign_key) = entity.get(field) else {
            return Err(unsupported(
                &entity.entity,
                association,
                format!("foreign key field '{field}' is not audited"),
            ));
        };
        if foreign_key.is_null() {
            return Ok(None);
        }

        let target = self.layout(&assoc.target)?;
        if target.identifier_columns().count() != 1 {
            return Err(unsupported(
                &entity.entity,
                association,
                "target has a composite identifier",
            ));
        }
        self.reconstruct(
            &assoc.target,
            &EntityId::single(foreign_key.clone()),
            entity.as_of,
        )
        .await
    }

    /// Resolve a to-many association at the revision `entity` was read at.
    ///
    /// Returns the targets whose newest row at or before that revision
    /// references `entity` and is not a deletion, ordered by identifier.
    ///
    /// # Errors
    ///
    /// - `UnsupportedAssociation` for many-to-many, composite source ids, or
    ///   an inverse field that is not audited
    /// - `NotAudited` if the target type is not audited
    pub async fn to_many(
        &self,
        entity: &AuditedEntity,
        association: &str,
    ) -> Result<Vec<AuditedEntity>, AuditError> {
        let assoc = self.association(&entity.entity, association)?;
        let mapped_by = match &assoc.kind {
            AssociationKind::ToMany { mapped_by } => mapped_by,
            AssociationKind::ManyToMany { .. } => {
                return Err(unsupported(
                    &entity.entity,
                    association,
                    "many-to-many associations are not audited",
                ));
            }
            AssociationKind::ToOne { .. } => {
                return Err(unsupported(
                    &entity.entity,
                    association,
                    "not a to-many association",
                ));
            }
        };
        self.require_audited_target(&assoc)?;
        let Some(source_id) = entity.id.as_single() else {
            return Err(unsupported(
                &entity.entity,
                association,
                "source has a composite identifier",
            ));
        };

        let target_meta = self.mapper.metadata().require(&assoc.target)?;
        // `mapped_by` names the owning association on the target, or its field.
        let inverse_field = match target_meta.association_named(mapped_by).map(|a| &a.kind) {
            Some(AssociationKind::ToOne { field }) => field.clone(),
            Some(_) => {
                return Err(unsupported(
                    &entity.entity,
                    association,
                    format!("'{mapped_by}' on '{}' is not a to-one association", assoc.target),
                ));
            }
            None => mapped_by.clone(),
        };

        let layout = self.layout(&assoc.target)?;
        let Some(column) = layout.column_for_field(&inverse_field) else {
            return Err(unsupported(
                &entity.entity,
                association,
                format!("inverse field '{inverse_field}' is not audited"),
            ));
        };
        let foreign_key = to_sql_value(&column.storage, source_id).map_err(|reason| {
            AuditError::InvalidIdentifier {
                entity: entity.entity.clone(),
                reason,
            }
        })?;

        let rev = quote_ident(&layout.revision_column);
        let correlate: Vec<String> = layout
            .identifier_columns()
            .map(|c| {
                let col = quote_ident(&c.column);
                format!("b.{col} = a.{col}")
            })
            .collect();
        let order: Vec<String> = layout
            .identifier_columns()
            .map(|c| format!("a.{}", quote_ident(&c.column)))
            .collect();
        let sql = format!(
            "SELECT {select} FROM {table} a \
             WHERE a.{fk} = ?1 \
               AND a.{kind} <> '{deleted}' \
               AND a.{rev} = (SELECT MAX(b.{rev}) FROM {table} b WHERE {correlate} AND b.{rev} <= ?2) \
             ORDER BY {order}",
            select = layout.select_list(Some("a")),
            table = quote_ident(&layout.table),
            fk = quote_ident(&column.column),
            kind = quote_ident(&layout.change_kind_column),
            deleted = ChangeKind::Delete.as_str(),
            correlate = correlate.join(" AND "),
            order = order.join(", "),
        );
        let mut rows = self
            .db
            .query(
                &sql,
                vec![foreign_key, libsql::Value::Integer(entity.as_of.get())],
            )
            .await?;

        let mut related = Vec::new();
        while let Some(row) = rows.next().await? {
            related.push(AuditedEntity::from_row(layout.read_row(&row, 0)?, entity.as_of));
        }
        Ok(related)
    }

    /// Resolve an association of any supported cardinality.
    ///
    /// # Errors
    ///
    /// See [`Self::to_one`] and [`Self::to_many`].
    pub async fn related(
        &self,
        entity: &AuditedEntity,
        association: &str,
    ) -> Result<Related, AuditError> {
        let assoc = self.association(&entity.entity, association)?;
        match assoc.cardinality() {
            Cardinality::ToOne => Ok(Related::One(self.to_one(entity, association).await?)),
            Cardinality::ToMany | Cardinality::ManyToMany => {
                Ok(Related::Many(self.to_many(entity, association).await?))
            }
        }
    }
}
