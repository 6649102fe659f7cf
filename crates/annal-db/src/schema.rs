//! Shadow-table layouts.
//!
//! A layout is a pure function of an entity's metadata and the audit
//! configuration: the entity's columns minus ignored ones, plus the revision
//! column and the change-kind marker. Layouts are cached per entity type and
//! re-derived if the configuration changed since they were cached.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, PoisonError, RwLock};

use annal_core::entities::AuditRow;
use annal_core::enums::{ChangeKind, FieldType};
use annal_core::errors::CoreError;
use annal_core::ids::{EntityId, RevisionId};
use annal_core::metadata::{AssociationKind, EntityMetadata};
use annal_core::snapshot::Snapshot;
use serde_json::Value;

use crate::config::AuditConfiguration;
use crate::error::AuditError;
use crate::helpers::{from_sql_value, placeholders, quote_ident, to_sql_value};
use crate::metadata::MetadataProvider;

/// One data column of a shadow table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowColumn {
    pub field: String,
    pub column: String,
    /// Resolved storage type (never `Custom`).
    pub storage: FieldType,
    pub nullable: bool,
    pub identifier: bool,
}

/// Shadow table layout of one audited entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowLayout {
    pub entity: String,
    pub source_table: String,
    pub table: String,
    pub revision_table: String,
    /// Kept columns, in metadata declaration order.
    pub columns: Vec<ShadowColumn>,
    pub revision_column: String,
    pub change_kind_column: String,
    /// Every non-identifier field is ignored; nothing worth recording.
    pub fully_ignored: bool,
}

impl ShadowLayout {
    pub fn identifier_columns(&self) -> impl Iterator<Item = &ShadowColumn> {
        self.columns.iter().filter(|c| c.identifier)
    }

    pub fn data_columns(&self) -> impl Iterator<Item = &ShadowColumn> {
        self.columns.iter().filter(|c| !c.identifier)
    }

    #[must_use]
    pub fn column_for_field(&self, field: &str) -> Option<&ShadowColumn> {
        self.columns.iter().find(|c| c.field == field)
    }

    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.column == column)
            || column == self.revision_column
            || column == self.change_kind_column
    }

    /// `CREATE TABLE` and revision index statements.
    #[must_use]
    pub fn create_table_sql(&self) -> String {
        let mut sql = format!("CREATE TABLE IF NOT EXISTS {} (\n", quote_ident(&self.table));
        for column in &self.columns {
            let not_null = if column.identifier { " NOT NULL" } else { "" };
            let sql_type = column.storage.sql_type().unwrap_or("TEXT");
            let _ = writeln!(
                sql,
                "    {} {sql_type}{not_null},",
                quote_ident(&column.column)
            );
        }
        let rev = quote_ident(&self.revision_column);
        let kind = quote_ident(&self.change_kind_column);
        let allowed = ChangeKind::ALL
            .iter()
            .map(|k| format!("'{}'", k.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(
            sql,
            "    {rev} INTEGER NOT NULL REFERENCES {}(id),",
            quote_ident(&self.revision_table)
        );
        let _ = writeln!(sql, "    {kind} TEXT NOT NULL CHECK ({kind} IN ({allowed})),");
        let mut key: Vec<String> = self
            .identifier_columns()
            .map(|c| quote_ident(&c.column))
            .collect();
        key.push(rev.clone());
        let _ = writeln!(sql, "    PRIMARY KEY ({})", key.join(", "));
        sql.push_str(");\n");
        let _ = writeln!(
            sql,
            "CREATE INDEX IF NOT EXISTS {} ON {} ({rev});",
            quote_ident(&format!("idx_{}_{}", self.table, self.revision_column)),
            quote_ident(&self.table)
        );
        sql
    }

    /// Column list for a SELECT: data columns, then revision, then change kind.
    #[must_use]
    pub fn select_list(&self, alias: Option<&str>) -> String {
        let prefix = alias.map_or_else(String::new, |a| format!("{a}."));
        self.columns
            .iter()
            .map(|c| c.column.as_str())
            .chain([
                self.revision_column.as_str(),
                self.change_kind_column.as_str(),
            ])
            .map(|c| format!("{prefix}{}", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `INSERT` of one audit row; parameters follow [`Self::row_params`].
    #[must_use]
    pub fn insert_sql(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| c.column.as_str())
            .chain([
                self.revision_column.as_str(),
                self.change_kind_column.as_str(),
            ])
            .map(quote_ident)
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.table),
            columns.join(", "),
            placeholders(1, columns.len())
        )
    }

    /// `alias."id" = ?{start} AND ...` over the identifier columns.
    #[must_use]
    pub fn id_predicate(&self, alias: &str, start: usize) -> String {
        self.identifier_columns()
            .enumerate()
            .map(|(i, c)| format!("{alias}.{} = ?{}", quote_ident(&c.column), start + i))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Bind parameters for an identifier.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::InvalidIdentifier` if the arity or a component
    /// type does not match.
    pub fn id_params(&self, id: &EntityId) -> Result<Vec<libsql::Value>, AuditError> {
        let columns: Vec<&ShadowColumn> = self.identifier_columns().collect();
        if columns.len() != id.len() {
            return Err(AuditError::InvalidIdentifier {
                entity: self.entity.clone(),
                reason: format!(
                    "expected {} component(s), got {}",
                    columns.len(),
                    id.len()
                ),
            });
        }
        columns
            .iter()
            .zip(id.values())
            .map(|(column, value)| {
                to_sql_value(&column.storage, value).map_err(|reason| {
                    AuditError::InvalidIdentifier {
                        entity: self.entity.clone(),
                        reason: format!("{}: {reason}", column.field),
                    }
                })
            })
            .collect()
    }

    /// `id` as it reads back from storage, e.g. `2` becomes `2.0` for a
    /// float column and `1` becomes `true` for a boolean one.
    ///
    /// # Errors
    ///
    /// Same as [`Self::id_params`].
    pub fn canonical_id(&self, id: &EntityId) -> Result<EntityId, AuditError> {
        let params = self.id_params(id)?;
        let values = self
            .identifier_columns()
            .zip(params)
            .map(|(column, raw)| {
                from_sql_value(&column.storage, raw).map_err(|reason| {
                    AuditError::InvalidIdentifier {
                        entity: self.entity.clone(),
                        reason: format!("{}: {reason}", column.field),
                    }
                })
            })
            .collect::<Result<Vec<Value>, _>>()?;
        Ok(if values.len() == 1 {
            EntityId::single(values.into_iter().next().unwrap_or_default())
        } else {
            EntityId::composite(values)
        })
    }

    /// Identifier of the entity described by a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::InvalidIdentifier` if an identifier field is
    /// missing or null.
    pub fn id_from_snapshot(&self, snapshot: &Snapshot) -> Result<EntityId, AuditError> {
        let values = self
            .identifier_columns()
            .map(|c| match snapshot.get(&c.field) {
                Some(v) if !v.is_null() => Ok(v.clone()),
                _ => Err(AuditError::InvalidIdentifier {
                    entity: self.entity.clone(),
                    reason: format!("identifier field '{}' is missing", c.field),
                }),
            })
            .collect::<Result<Vec<Value>, _>>()?;
        Ok(if values.len() == 1 {
            EntityId::single(values.into_iter().next().unwrap_or_default())
        } else {
            EntityId::composite(values)
        })
    }

    /// Keep only the fields this layout records.
    #[must_use]
    pub fn project(&self, snapshot: &Snapshot) -> Snapshot {
        self.columns
            .iter()
            .map(|c| {
                (
                    c.field.clone(),
                    snapshot.get(&c.field).cloned().unwrap_or(Value::Null),
                )
            })
            .collect()
    }

    /// Bind parameters for [`Self::insert_sql`].
    ///
    /// # Errors
    ///
    /// Returns the offending field name and the conversion error.
    pub fn row_params(
        &self,
        snapshot: &Snapshot,
        revision: RevisionId,
        kind: ChangeKind,
    ) -> Result<Vec<libsql::Value>, (String, String)> {
        let mut params = Vec::with_capacity(self.columns.len() + 2);
        for column in &self.columns {
            let value = snapshot.get(&column.field).unwrap_or(&Value::Null);
            let sql = to_sql_value(&column.storage, value)
                .map_err(|reason| (column.field.clone(), reason))?;
            params.push(sql);
        }
        params.push(libsql::Value::Integer(revision.get()));
        params.push(libsql::Value::Text(kind.as_str().to_string()));
        Ok(params)
    }

    /// Decode a row selected with [`Self::select_list`], starting at column `offset`.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Query` if a stored value does not decode.
    pub fn read_row(&self, row: &libsql::Row, offset: i32) -> Result<AuditRow, AuditError> {
        let mut snapshot = Snapshot::new();
        let mut idx = offset;
        for column in &self.columns {
            let raw = row.get_value(idx)?;
            let value = from_sql_value(&column.storage, raw).map_err(|e| {
                AuditError::Query(format!("{}.{}: {e}", self.table, column.column))
            })?;
            snapshot.insert(column.field.clone(), value);
            idx += 1;
        }
        let revision = RevisionId(row.get::<i64>(idx)?);
        let kind = row
            .get::<String>(idx + 1)?
            .parse::<ChangeKind>()
            .map_err(|e| AuditError::Query(e.to_string()))?;
        let id = self.id_from_snapshot(&snapshot)?;
        Ok(AuditRow {
            entity: self.entity.clone(),
            id,
            revision,
            kind,
            snapshot,
        })
    }
}

/// Derives and caches shadow layouts.
pub struct SchemaMapper {
    config: Arc<AuditConfiguration>,
    metadata: Arc<dyn MetadataProvider>,
    cache: RwLock<HashMap<String, (u64, Arc<ShadowLayout>)>>,
}

impl SchemaMapper {
    #[must_use]
    pub fn new(config: Arc<AuditConfiguration>, metadata: Arc<dyn MetadataProvider>) -> Self {
        Self {
            config,
            metadata,
            cache: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Arc<AuditConfiguration> {
        &self.config
    }

    #[must_use]
    pub fn metadata(&self) -> &Arc<dyn MetadataProvider> {
        &self.metadata
    }

    /// Shadow layout of `entity`.
    ///
    /// # Errors
    ///
    /// - `UnknownEntity` if the metadata provider does not know the type
    /// - `UnsupportedFieldType` for a kept field of an unregistered custom type
    /// - `Metadata` if a kept column collides with the revision or change-kind column
    pub fn derive_shadow_layout(&self, entity: &str) -> Result<Arc<ShadowLayout>, AuditError> {
        let generation = self.config.generation();
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some((cached_generation, layout)) = cache.get(entity) {
                if *cached_generation == generation {
                    return Ok(Arc::clone(layout));
                }
            }
        }

        let meta = self.metadata.require(entity)?;
        let layout = Arc::new(self.build_layout(meta)?);
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entity.to_string(), (generation, Arc::clone(&layout)));
        Ok(layout)
    }

    fn build_layout(&self, meta: &EntityMetadata) -> Result<ShadowLayout, AuditError> {
        let naming = self.config.naming();
        let mut columns = Vec::with_capacity(meta.fields.len());
        let mut non_identifier = 0usize;

        for field in &meta.fields {
            let identifier = meta.is_identifier(&field.name);
            if !identifier {
                non_identifier += 1;
                if self
                    .config
                    .is_property_ignored(&meta.name, &field.name, &field.column)
                {
                    continue;
                }
            }
            if field.column == naming.revision_field || field.column == naming.change_kind_field {
                return Err(CoreError::InvalidMetadata {
                    entity: meta.name.clone(),
                    reason: format!(
                        "column '{}' collides with the audit marker columns",
                        field.column
                    ),
                }
                .into());
            }
            let storage = self.config.resolve_field_type(&field.field_type).ok_or_else(|| {
                AuditError::UnsupportedFieldType {
                    entity: meta.name.clone(),
                    field: field.name.clone(),
                    type_name: field.field_type.name().to_string(),
                }
            })?;
            columns.push(ShadowColumn {
                field: field.name.clone(),
                column: field.column.clone(),
                storage,
                nullable: field.nullable,
                identifier,
            });
        }

        for association in &meta.associations {
            if let AssociationKind::ManyToMany { join_table } = &association.kind {
                tracing::warn!(
                    entity = %meta.name,
                    association = %association.name,
                    join_table = %join_table,
                    "many-to-many association is not audited"
                );
            }
        }

        let kept = columns.iter().filter(|c| !c.identifier).count();
        Ok(ShadowLayout {
            entity: meta.name.clone(),
            source_table: meta.table.clone(),
            table: self.config.shadow_table_name(&meta.table),
            revision_table: naming.revision_table,
            columns,
            revision_column: naming.revision_field,
            change_kind_column: naming.change_kind_field,
            fully_ignored: non_identifier > 0 && kept == 0,
        })
    }
}

/// `CREATE TABLE` for an entity's primary table.
///
/// A single integer identifier becomes the rowid alias so inserts without an
/// id get one assigned.
#[must_use]
pub fn primary_table_sql(meta: &EntityMetadata) -> String {
    let single_integer_id = meta.identifier.len() == 1
        && meta
            .identifier_fields()
            .all(|f| f.field_type == FieldType::Integer);

    let mut lines = Vec::with_capacity(meta.fields.len() + 1);
    for field in &meta.fields {
        let mut line = format!("    {}", quote_ident(&field.column));
        // Custom types get no declared type and keep whatever is bound.
        if let Some(sql_type) = field.field_type.sql_type() {
            line.push(' ');
            line.push_str(sql_type);
        }
        if single_integer_id && meta.is_identifier(&field.name) {
            line.push_str(" PRIMARY KEY");
        } else if !field.nullable {
            line.push_str(" NOT NULL");
        }
        lines.push(line);
    }
    if !single_integer_id {
        let key: Vec<String> = meta
            .identifier_fields()
            .map(|f| quote_ident(&f.column))
            .collect();
        lines.push(format!("    PRIMARY KEY ({})", key.join(", ")));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
        quote_ident(&meta.table),
        lines.join(",\n")
    )
}
