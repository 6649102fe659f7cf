//! Entity metadata provider.
//!
//! The engine never inspects host types; it asks a `MetadataProvider` for an
//! entity's fields, identifier and associations. `MetadataRegistry` is the
//! in-process implementation used by the unit of work in this crate.

use std::collections::BTreeMap;

use annal_core::metadata::{AssociationMetadata, EntityMetadata, FieldMetadata};

use crate::error::AuditError;

/// Read-only access to entity metadata.
pub trait MetadataProvider: Send + Sync {
    /// Metadata of one entity type, if known.
    fn entity(&self, name: &str) -> Option<&EntityMetadata>;

    /// Every known entity type name.
    fn entity_names(&self) -> Vec<String>;

    fn fields(&self, name: &str) -> Option<&[FieldMetadata]> {
        self.entity(name).map(|meta| meta.fields.as_slice())
    }

    fn identifier(&self, name: &str) -> Option<&[String]> {
        self.entity(name).map(|meta| meta.identifier.as_slice())
    }

    fn associations(&self, name: &str) -> Option<&[AssociationMetadata]> {
        self.entity(name).map(|meta| meta.associations.as_slice())
    }

    /// Like [`Self::entity`] but fails with `UnknownEntity`.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::UnknownEntity` if the type is not known.
    fn require(&self, name: &str) -> Result<&EntityMetadata, AuditError> {
        self.entity(name).ok_or_else(|| AuditError::UnknownEntity {
            entity: name.to_string(),
        })
    }
}

/// Metadata registered up front, validated on registration.
#[derive(Debug, Default, Clone)]
pub struct MetadataRegistry {
    entities: BTreeMap<String, EntityMetadata>,
}

impl MetadataRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and add an entity type, replacing any previous definition.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Metadata` if the metadata is inconsistent.
    pub fn register(&mut self, meta: EntityMetadata) -> Result<(), AuditError> {
        meta.validate()?;
        self.entities.insert(meta.name.clone(), meta);
        Ok(())
    }

    /// Builder form of [`Self::register`].
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Metadata` if the metadata is inconsistent.
    pub fn with(mut self, meta: EntityMetadata) -> Result<Self, AuditError> {
        self.register(meta)?;
        Ok(self)
    }
}

impl MetadataProvider for MetadataRegistry {
    fn entity(&self, name: &str) -> Option<&EntityMetadata> {
        self.entities.get(name)
    }

    fn entity_names(&self) -> Vec<String> {
        self.entities.keys().cloned().collect()
    }
}
