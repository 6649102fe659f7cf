//! Audit policy settings.
//!
//! These are the file/env backed defaults. The engine turns them into its
//! runtime `AuditConfiguration`, where the actor resolver is attached.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

fn default_table_suffix() -> String {
    "_audit".to_string()
}

fn default_revision_table() -> String {
    "revisions".to_string()
}

fn default_revision_field() -> String {
    "rev".to_string()
}

fn default_change_kind_field() -> String {
    "change_kind".to_string()
}

const fn default_batch_size() -> usize {
    500
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditSettings {
    /// Entity type names to audit.
    #[serde(default)]
    pub audited_entities: Vec<String>,

    /// Column names never copied to any shadow table.
    #[serde(default)]
    pub global_ignore_columns: Vec<String>,

    /// Entity type name → property names not copied to its shadow table.
    #[serde(default)]
    pub entity_ignored_properties: BTreeMap<String, Vec<String>>,

    /// Host type name → base type name (e.g. `"money" = "integer"`).
    #[serde(default)]
    pub custom_types: BTreeMap<String, String>,

    #[serde(default)]
    pub table_prefix: String,

    #[serde(default = "default_table_suffix")]
    pub table_suffix: String,

    #[serde(default = "default_revision_table")]
    pub revision_table: String,

    #[serde(default = "default_revision_field")]
    pub revision_field: String,

    #[serde(default = "default_change_kind_field")]
    pub change_kind_field: String,

    /// Actor recorded when no resolver is attached. Empty means anonymous.
    #[serde(default)]
    pub default_actor: String,

    /// Maximum identifiers per query in batch reconstruction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            audited_entities: Vec::new(),
            global_ignore_columns: Vec::new(),
            entity_ignored_properties: BTreeMap::new(),
            custom_types: BTreeMap::new(),
            table_prefix: String::new(),
            table_suffix: default_table_suffix(),
            revision_table: default_revision_table(),
            revision_field: default_revision_field(),
            change_kind_field: default_change_kind_field(),
            default_actor: String::new(),
            batch_size: default_batch_size(),
        }
    }
}

impl AuditSettings {
    /// The default actor, or `None` when anonymous.
    #[must_use]
    pub fn default_actor(&self) -> Option<&str> {
        Some(self.default_actor.as_str()).filter(|a| !a.is_empty())
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, reason: &str| ConfigError::InvalidValue {
            field: format!("audit.{field}"),
            reason: reason.to_string(),
        };

        for (field, value) in [
            ("revision_table", &self.revision_table),
            ("revision_field", &self.revision_field),
            ("change_kind_field", &self.change_kind_field),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
        }
        if self.revision_field == self.change_kind_field {
            return Err(invalid(
                "change_kind_field",
                "must differ from revision_field",
            ));
        }
        if self.table_prefix.is_empty() && self.table_suffix.is_empty() {
            return Err(invalid(
                "table_suffix",
                "table_prefix and table_suffix cannot both be empty",
            ));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be greater than zero"));
        }
        Ok(())
    }
}
