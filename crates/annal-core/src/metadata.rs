//! Entity metadata: fields, identifier and associations.
//!
//! This is the engine's view of the host mapper's metadata. It is built once
//! at configuration time and never mutated afterwards.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::enums::FieldType;
use crate::errors::CoreError;

/// A mapped field of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMetadata {
    pub name: String,
    pub column: String,
    pub field_type: FieldType,
    pub nullable: bool,
}

impl FieldMetadata {
    /// A non-nullable field whose column has the same name as the field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            field_type,
            nullable: false,
        }
    }

    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Cardinality of an association, from the declaring entity's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    ToOne,
    ToMany,
    ManyToMany,
}

/// How an association is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    /// Owning side: `field` on this entity holds the target's identifier.
    ToOne { field: String },
    /// Inverse side: `mapped_by` on the target holds this entity's identifier.
    ToMany { mapped_by: String },
    /// Join table association. Not audited.
    ManyToMany { join_table: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationMetadata {
    pub name: String,
    pub target: String,
    pub kind: AssociationKind,
}

impl AssociationMetadata {
    pub fn to_one(
        name: impl Into<String>,
        target: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind: AssociationKind::ToOne {
                field: field.into(),
            },
        }
    }

    pub fn to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        mapped_by: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind: AssociationKind::ToMany {
                mapped_by: mapped_by.into(),
            },
        }
    }

    pub fn many_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        join_table: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind: AssociationKind::ManyToMany {
                join_table: join_table.into(),
            },
        }
    }

    #[must_use]
    pub const fn cardinality(&self) -> Cardinality {
        match self.kind {
            AssociationKind::ToOne { .. } => Cardinality::ToOne,
            AssociationKind::ToMany { .. } => Cardinality::ToMany,
            AssociationKind::ManyToMany { .. } => Cardinality::ManyToMany,
        }
    }

    /// Whether this side stores the relationship.
    #[must_use]
    pub const fn is_owning_side(&self) -> bool {
        matches!(
            self.kind,
            AssociationKind::ToOne { .. } | AssociationKind::ManyToMany { .. }
        )
    }
}

/// Metadata of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub name: String,
    pub table: String,
    pub identifier: Vec<String>,
    pub fields: Vec<FieldMetadata>,
    pub associations: Vec<AssociationMetadata>,
}

impl EntityMetadata {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            identifier: Vec::new(),
            fields: Vec::new(),
            associations: Vec::new(),
        }
    }

    /// Add an identifier field. Call several times for a composite key.
    #[must_use]
    pub fn id(mut self, field: FieldMetadata) -> Self {
        self.identifier.push(field.name.clone());
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldMetadata) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn association(mut self, association: AssociationMetadata) -> Self {
        self.associations.push(association);
        self
    }

    #[must_use]
    pub fn field_named(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn association_named(&self, name: &str) -> Option<&AssociationMetadata> {
        self.associations.iter().find(|a| a.name == name)
    }

    #[must_use]
    pub fn is_identifier(&self, field: &str) -> bool {
        self.identifier.iter().any(|f| f == field)
    }

    /// Identifier fields in declaration order.
    pub fn identifier_fields(&self) -> impl Iterator<Item = &FieldMetadata> {
        self.identifier
            .iter()
            .filter_map(|name| self.field_named(name))
    }

    /// Check that the identifier and associations reference declared fields.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidMetadata` describing the first problem found.
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |reason: String| CoreError::InvalidMetadata {
            entity: self.name.clone(),
            reason,
        };

        if self.identifier.is_empty() {
            return Err(invalid("no identifier field".into()));
        }

        let mut seen = BTreeSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(invalid(format!("duplicate field '{}'", field.name)));
            }
        }

        for id in &self.identifier {
            let field = self
                .field_named(id)
                .ok_or_else(|| invalid(format!("identifier field '{id}' is not declared")))?;
            if field.nullable {
                return Err(invalid(format!("identifier field '{id}' is nullable")));
            }
        }

        for association in &self.associations {
            if let AssociationKind::ToOne { field } = &association.kind {
                if self.field_named(field).is_none() {
                    return Err(invalid(format!(
                        "association '{}' references undeclared field '{field}'",
                        association.name
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article() -> EntityMetadata {
        EntityMetadata::new("Article", "articles")
            .id(FieldMetadata::new("id", FieldType::Integer))
            .field(FieldMetadata::new("title", FieldType::Text))
            .field(FieldMetadata::new("author_id", FieldType::Integer).nullable())
            .association(AssociationMetadata::to_one("author", "Author", "author_id"))
    }

    #[test]
    fn valid_metadata_passes() {
        article().validate().unwrap();
    }

    #[test]
    fn missing_identifier_rejected() {
        let meta = EntityMetadata::new("X", "x").field(FieldMetadata::new("a", FieldType::Text));
        assert!(meta.validate().is_err());
    }

    #[test]
    fn undeclared_association_field_rejected() {
        let meta = article().association(AssociationMetadata::to_one("editor", "Author", "editor_id"));
        let err = meta.validate().unwrap_err();
        assert!(err.to_string().contains("editor_id"));
    }

    #[test]
    fn duplicate_field_rejected() {
        let meta = article().field(FieldMetadata::new("title", FieldType::Text));
        assert!(meta.validate().is_err());
    }

    #[test]
    fn owning_side_and_cardinality() {
        let one = AssociationMetadata::to_one("author", "Author", "author_id");
        let many = AssociationMetadata::to_many("articles", "Article", "author_id");
        assert!(one.is_owning_side());
        assert!(!many.is_owning_side());
        assert_eq!(many.cardinality(), Cardinality::ToMany);
    }

    #[test]
    fn identifier_fields_follow_declaration_order() {
        let meta = EntityMetadata::new("Pair", "pairs")
            .id(FieldMetadata::new("left", FieldType::Integer))
            .id(FieldMetadata::new("right", FieldType::Text));
        let names: Vec<_> = meta.identifier_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["left", "right"]);
    }
}
